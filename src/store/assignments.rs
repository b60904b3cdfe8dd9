/*
`Store` methods for the `assignments` table. Straight CRUD; no natural
key here, an assignment is its own thing.
*/
use time::Date;
use tokio_postgres::{types::ToSql, Row};

use super::{DbError, Store};
use crate::user::{Attribution, Department};

#[derive(Clone, Debug)]
pub struct Assignment {
    pub id: i64,
    pub department: Department,
    pub subject: String,
    pub questions: String,
    pub due_date: Date,
    pub marks: i32,
    pub created_by: Attribution,
    pub created_at: time::OffsetDateTime,
}

fn assignment_from_row(row: &Row) -> Result<Assignment, DbError> {
    let dept_str: &str = row.try_get("department")?;
    let created_by_str: &str = row.try_get("created_by")?;

    Ok(Assignment {
        id: row.try_get("id")?,
        department: dept_str.parse()?,
        subject: row.try_get("subject")?,
        questions: row.try_get("questions")?,
        due_date: row.try_get("due_date")?,
        marks: row.try_get("marks")?,
        created_by: created_by_str.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

impl Store {
    pub async fn insert_assignment(
        &self,
        department: Department,
        subject: &str,
        questions: &str,
        due_date: Date,
        marks: i32,
        created_by: &Attribution,
    ) -> Result<Assignment, DbError> {
        log::trace!(
            "Store::insert_assignment( {}, {:?} ) called.",
            &department, subject
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO assignments
                (department, subject, questions, due_date, marks, created_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *",
            &[
                &department.to_string(),
                &subject,
                &questions,
                &due_date,
                &marks,
                &created_by.to_string(),
            ]
        ).await?;

        assignment_from_row(&row)
    }

    pub async fn list_assignments(
        &self,
        department: Option<Department>,
        subject: Option<&str>,
    ) -> Result<Vec<Assignment>, DbError> {
        log::trace!(
            "Store::list_assignments( {:?}, {:?} ) called.",
            &department, &subject
        );

        let dept_s = department.map(|d| d.to_string());

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!("department = ${}", params.len()));
        }
        if let Some(ref subj) = subject {
            params.push(subj as &(dyn ToSql + Sync));
            conditions.push(format!("subject = ${}", params.len()));
        }

        let mut sql = String::from("SELECT * FROM assignments");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params).await?;

        let mut assignments: Vec<Assignment> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            assignments.push(assignment_from_row(row)?);
        }

        Ok(assignments)
    }

    pub async fn get_assignment(&self, id: i64) -> Result<Option<Assignment>, DbError> {
        log::trace!("Store::get_assignment( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM assignments WHERE id = $1",
            &[&id]
        ).await? {
            Some(row) => Ok(Some(assignment_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Partial update; any `None` leaves the stored value alone.
    pub async fn update_assignment(
        &self,
        id: i64,
        subject: Option<&str>,
        questions: Option<&str>,
        due_date: Option<Date>,
        marks: Option<i32>,
    ) -> Result<Option<Assignment>, DbError> {
        log::trace!("Store::update_assignment( {} ) called.", id);

        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref s) = subject {
            params.push(s as &(dyn ToSql + Sync));
            sets.push(format!("subject = ${}", params.len()));
        }
        if let Some(ref q) = questions {
            params.push(q as &(dyn ToSql + Sync));
            sets.push(format!("questions = ${}", params.len()));
        }
        if let Some(ref d) = due_date {
            params.push(d as &(dyn ToSql + Sync));
            sets.push(format!("due_date = ${}", params.len()));
        }
        if let Some(ref m) = marks {
            params.push(m as &(dyn ToSql + Sync));
            sets.push(format!("marks = ${}", params.len()));
        }

        if sets.is_empty() {
            return self.get_assignment(id).await;
        }

        params.push(&id as &(dyn ToSql + Sync));
        let sql = format!(
            "UPDATE assignments SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            params.len()
        );

        let client = self.connect().await?;
        match client.query_opt(sql.as_str(), &params).await? {
            Some(row) => Ok(Some(assignment_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_assignment(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_assignment( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM assignments WHERE id = $1",
            &[&id]
        ).await?;

        Ok(n > 0)
    }

    pub async fn count_assignments(
        &self,
        department: Option<Department>,
    ) -> Result<i64, DbError> {
        log::trace!("Store::count_assignments( {:?} ) called.", &department);

        let dept_s = department.map(|d| d.to_string());

        let mut sql = String::from("SELECT COUNT(*) AS n FROM assignments");
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            sql.push_str(" WHERE department = $1");
        }

        let client = self.connect().await?;
        let row = client.query_one(sql.as_str(), &params).await?;
        Ok(row.try_get("n")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::macros::date;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn assignment_crud() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let a = db.insert_assignment(
            Department::Ba,
            "History",
            "Describe the causes of the 1857 uprising.",
            date!(2024 - 08 - 30),
            20,
            &Attribution::User(1),
        ).await.unwrap();

        let listed = db.list_assignments(Some(Department::Ba), None).await.unwrap();
        assert_eq!(listed.len(), 1);

        let updated = db.update_assignment(
            a.id, None, None, None, Some(25)
        ).await.unwrap().unwrap();
        assert_eq!(updated.marks, 25);
        assert_eq!(&updated.subject, "History");

        assert_eq!(db.count_assignments(Some(Department::Ba)).await.unwrap(), 1);
        assert!(db.delete_assignment(a.id).await.unwrap());

        db.nuke_database().await.unwrap();
    }
}
