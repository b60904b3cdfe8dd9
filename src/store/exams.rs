/*
`Store` methods for the `exams` table.

An exam is a named schedule window plus a list of subject sessions.
The sessions are stored as a JSONB document; nothing queries inside
them, they only travel with the exam.
*/
use serde::{Deserialize, Serialize};
use time::Date;
use tokio_postgres::{types::ToSql, Row};

use super::{DbError, Store};
use crate::user::{Attribution, Department};

/// One sitting within an exam: a subject on a date at a time, maybe
/// with a venue.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSubject {
    pub subject_name: String,
    #[serde(with = "crate::date_fmt")]
    pub date: Date,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Exam {
    pub id: i64,
    pub department: Department,
    pub exam_name: String,
    pub subjects: Vec<ExamSubject>,
    pub start_date: Date,
    pub end_date: Date,
    pub created_by: Attribution,
    pub created_at: time::OffsetDateTime,
}

fn exam_from_row(row: &Row) -> Result<Exam, DbError> {
    let dept_str: &str = row.try_get("department")?;
    let created_by_str: &str = row.try_get("created_by")?;
    let subjects_json: serde_json::Value = row.try_get("subjects")?;
    let subjects: Vec<ExamSubject> = serde_json::from_value(subjects_json)
        .map_err(|e| DbError::from(format!(
            "Error deserializing exam subjects: {}", &e
        )))?;

    Ok(Exam {
        id: row.try_get("id")?,
        department: dept_str.parse()?,
        exam_name: row.try_get("exam_name")?,
        subjects,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        created_by: created_by_str.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn subjects_to_json(subjects: &[ExamSubject]) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(subjects)
        .map_err(|e| DbError::from(format!(
            "Error serializing exam subjects: {}", &e
        )))
}

impl Store {
    pub async fn insert_exam(
        &self,
        department: Department,
        exam_name: &str,
        subjects: &[ExamSubject],
        start_date: Date,
        end_date: Date,
        created_by: &Attribution,
    ) -> Result<Exam, DbError> {
        log::trace!(
            "Store::insert_exam( {}, {:?}, [ {} subjects ] ) called.",
            &department, exam_name, subjects.len()
        );

        let subjects_json = subjects_to_json(subjects)?;

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO exams
                (department, exam_name, subjects, start_date, end_date, created_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *",
            &[
                &department.to_string(),
                &exam_name,
                &subjects_json,
                &start_date,
                &end_date,
                &created_by.to_string(),
            ]
        ).await?;

        exam_from_row(&row)
    }

    pub async fn list_exams(
        &self,
        department: Option<Department>,
    ) -> Result<Vec<Exam>, DbError> {
        log::trace!("Store::list_exams( {:?} ) called.", &department);

        let dept_s = department.map(|d| d.to_string());

        let mut sql = String::from("SELECT * FROM exams");
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            sql.push_str(" WHERE department = $1");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params).await?;

        let mut exams: Vec<Exam> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            exams.push(exam_from_row(row)?);
        }

        Ok(exams)
    }

    pub async fn get_exam(&self, id: i64) -> Result<Option<Exam>, DbError> {
        log::trace!("Store::get_exam( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM exams WHERE id = $1",
            &[&id]
        ).await? {
            Some(row) => Ok(Some(exam_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Partial update; any `None` leaves the stored value alone.
    pub async fn update_exam(
        &self,
        id: i64,
        exam_name: Option<&str>,
        subjects: Option<&[ExamSubject]>,
        start_date: Option<Date>,
        end_date: Option<Date>,
    ) -> Result<Option<Exam>, DbError> {
        log::trace!("Store::update_exam( {} ) called.", id);

        let subjects_json = match subjects {
            Some(s) => Some(subjects_to_json(s)?),
            None => None,
        };

        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref name) = exam_name {
            params.push(name as &(dyn ToSql + Sync));
            sets.push(format!("exam_name = ${}", params.len()));
        }
        if let Some(ref json) = subjects_json {
            params.push(json as &(dyn ToSql + Sync));
            sets.push(format!("subjects = ${}", params.len()));
        }
        if let Some(ref d) = start_date {
            params.push(d as &(dyn ToSql + Sync));
            sets.push(format!("start_date = ${}", params.len()));
        }
        if let Some(ref d) = end_date {
            params.push(d as &(dyn ToSql + Sync));
            sets.push(format!("end_date = ${}", params.len()));
        }

        if sets.is_empty() {
            return self.get_exam(id).await;
        }

        params.push(&id as &(dyn ToSql + Sync));
        let sql = format!(
            "UPDATE exams SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            params.len()
        );

        let client = self.connect().await?;
        match client.query_opt(sql.as_str(), &params).await? {
            Some(row) => Ok(Some(exam_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_exam(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_exam( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM exams WHERE id = $1",
            &[&id]
        ).await?;

        Ok(n > 0)
    }

    pub async fn count_exams(
        &self,
        department: Option<Department>,
    ) -> Result<i64, DbError> {
        log::trace!("Store::count_exams( {:?} ) called.", &department);

        let dept_s = department.map(|d| d.to_string());

        let mut sql = String::from("SELECT COUNT(*) AS n FROM exams");
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

    fn sessions() -> Vec<ExamSubject> {
        vec![
            ExamSubject {
                subject_name: "Database Systems".to_owned(),
                date: date!(2024 - 11 - 04),
                time: "10:00".to_owned(),
                venue: Some("Hall A".to_owned()),
            },
            ExamSubject {
                subject_name: "Computer Networks".to_owned(),
                date: date!(2024 - 11 - 06),
                time: "10:00".to_owned(),
                venue: None,
            },
        ]
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn exam_crud() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let exam = db.insert_exam(
            Department::Bca,
            "Semester 3 Finals",
            &sessions(),
            date!(2024 - 11 - 04),
            date!(2024 - 11 - 10),
            &Attribution::Admin,
        ).await.unwrap();
        assert_eq!(exam.subjects.len(), 2);

        let fetched = db.get_exam(exam.id).await.unwrap().unwrap();
        assert_eq!(&fetched.exam_name, "Semester 3 Finals");
        assert_eq!(&fetched.subjects[0].subject_name, "Database Systems");

        let updated = db.update_exam(
            exam.id,
            Some("Semester 3 Finals (revised)"),
            None,
            None,
            Some(date!(2024 - 11 - 12)),
        ).await.unwrap().unwrap();
        assert_eq!(&updated.exam_name, "Semester 3 Finals (revised)");
        assert_eq!(updated.end_date, date!(2024 - 11 - 12));
        assert_eq!(updated.subjects.len(), 2);

        assert_eq!(db.count_exams(Some(Department::Bca)).await.unwrap(), 1);
        assert_eq!(db.count_exams(Some(Department::Ba)).await.unwrap(), 0);

        assert!(db.delete_exam(exam.id).await.unwrap());

        db.nuke_database().await.unwrap();
    }
}
