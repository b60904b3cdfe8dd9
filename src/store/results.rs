/*
`Store` methods for the `results` table.

A result is keyed by (student, exam, subject); re-submitting marks for
the same triple corrects the stored record. Listings join the student
and exam display fields the way responses want them.
*/
use tokio_postgres::{types::ToSql, Row};

use super::{DbError, Store};
use crate::user::{Attribution, Department, ResultStatus};

#[derive(Clone, Debug)]
pub struct ResultRecord {
    pub id: i64,
    pub student_id: i64,
    pub exam_id: i64,
    pub subject: String,
    pub marks: i32,
    pub status: ResultStatus,
    pub created_by: Attribution,
    pub created_at: time::OffsetDateTime,
}

/// A listed result, joined with student and exam display fields.
#[derive(Clone, Debug)]
pub struct ResultEntry {
    pub record: ResultRecord,
    pub student_full_name: String,
    pub student_email: String,
    pub student_department: Department,
    pub exam_name: String,
    pub exam_department: Department,
}

#[derive(Debug, Default)]
pub struct ResultQuery {
    pub student_id: Option<i64>,
    pub exam_id: Option<i64>,
    pub subject: Option<String>,
}

fn result_from_row(row: &Row) -> Result<ResultRecord, DbError> {
    let status_str: &str = row.try_get("status")?;
    let created_by_str: &str = row.try_get("created_by")?;

    Ok(ResultRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        exam_id: row.try_get("exam_id")?,
        subject: row.try_get("subject")?,
        marks: row.try_get("marks")?,
        status: status_str.parse()?,
        created_by: created_by_str.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &Row) -> Result<ResultEntry, DbError> {
    let student_dept_str: &str = row.try_get("student_department")?;
    let exam_dept_str: &str = row.try_get("exam_department")?;

    Ok(ResultEntry {
        record: result_from_row(row)?,
        student_full_name: row.try_get("student_full_name")?,
        student_email: row.try_get("student_email")?,
        student_department: student_dept_str.parse()?,
        exam_name: row.try_get("exam_name")?,
        exam_department: exam_dept_str.parse()?,
    })
}

const ENTRY_SELECT: &str =
    "SELECT r.*,
        u.full_name AS student_full_name,
        u.email AS student_email,
        u.department AS student_department,
        e.exam_name AS exam_name,
        e.department AS exam_department
        FROM results r
        JOIN users u ON u.id = r.student_id
        JOIN exams e ON e.id = r.exam_id";

impl Store {
    /// Create-or-correct a result by its (student, exam, subject)
    /// natural key. Returns the record and whether it was freshly
    /// created.
    pub async fn upsert_result(
        &self,
        student_id: i64,
        exam_id: i64,
        subject: &str,
        marks: i32,
        status: ResultStatus,
        created_by: &Attribution,
    ) -> Result<(ResultRecord, bool), DbError> {
        log::trace!(
            "Store::upsert_result( {}, {}, {:?}, {} ) called.",
            student_id, exam_id, subject, marks
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let existing = t.query_opt(
            "SELECT id FROM results
                WHERE student_id = $1 AND exam_id = $2 AND subject = $3",
            &[&student_id, &exam_id, &subject]
        ).await?;

        let (row, created) = match existing {
            Some(found) => {
                let id: i64 = found.try_get("id")?;
                let row = t.query_one(
                    "UPDATE results SET marks = $1, status = $2, created_by = $3
                        WHERE id = $4 RETURNING *",
                    &[&marks, &status.to_string(), &created_by.to_string(), &id]
                ).await?;
                (row, false)
            },
            None => {
                let row = t.query_one(
                    "INSERT INTO results
                        (student_id, exam_id, subject, marks, status, created_by)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        RETURNING *",
                    &[
                        &student_id,
                        &exam_id,
                        &subject,
                        &marks,
                        &status.to_string(),
                        &created_by.to_string(),
                    ]
                ).await?;
                (row, true)
            },
        };

        t.commit().await?;
        Ok((result_from_row(&row)?, created))
    }

    pub async fn list_results(
        &self,
        query: &ResultQuery,
    ) -> Result<Vec<ResultEntry>, DbError> {
        log::trace!("Store::list_results( {:?} ) called.", query);

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref sid) = query.student_id {
            params.push(sid as &(dyn ToSql + Sync));
            conditions.push(format!("r.student_id = ${}", params.len()));
        }
        if let Some(ref eid) = query.exam_id {
            params.push(eid as &(dyn ToSql + Sync));
            conditions.push(format!("r.exam_id = ${}", params.len()));
        }
        if let Some(ref subj) = query.subject {
            params.push(subj as &(dyn ToSql + Sync));
            conditions.push(format!("r.subject = ${}", params.len()));
        }

        let mut sql = String::from(ENTRY_SELECT);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY r.created_at DESC");

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params).await?;

        let mut entries: Vec<ResultEntry> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            entries.push(entry_from_row(row)?);
        }

        Ok(entries)
    }

    pub async fn get_result(&self, id: i64) -> Result<Option<ResultEntry>, DbError> {
        log::trace!("Store::get_result( {} ) called.", id);

        let sql = format!("{} WHERE r.id = $1", ENTRY_SELECT);

        let client = self.connect().await?;
        match client.query_opt(sql.as_str(), &[&id]).await? {
            Some(row) => Ok(Some(entry_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_result(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_result( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM results WHERE id = $1",
            &[&id]
        ).await?;

        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::macros::date;

    use crate::store::tests::TEST_CONNECTION;
    use crate::store::users::tests::sample_user;
    use crate::tests::ensure_logging;
    use crate::user::Role;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn result_upsert_corrects_marks() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let student = db.insert_user(
            &sample_user(20, Role::Student, Department::BCom)
        ).await.unwrap();
        let exam = db.insert_exam(
            Department::BCom,
            "Midterm",
            &[],
            date!(2024 - 09 - 02),
            date!(2024 - 09 - 06),
            &Attribution::Admin,
        ).await.unwrap();

        let (first, created) = db.upsert_result(
            student.id, exam.id, "Accountancy", 35, ResultStatus::Fail,
            &Attribution::Admin,
        ).await.unwrap();
        assert!(created);

        let (second, created) = db.upsert_result(
            student.id, exam.id, "Accountancy", 62, ResultStatus::Pass,
            &Attribution::Admin,
        ).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.marks, 62);
        assert_eq!(second.status, ResultStatus::Pass);

        let listed = db.list_results(&ResultQuery {
            student_id: Some(student.id),
            ..ResultQuery::default()
        }).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(&listed[0].exam_name, "Midterm");

        assert!(db.delete_result(first.id).await.unwrap());

        db.nuke_database().await.unwrap();
    }
}
