/*
`Store` methods for the `attendance` table.

The (user_id, date) pair is the natural key: marking the same user on
the same day again is a correction, not a new record. The UNIQUE
constraint backs that up against racing inserts.
*/
use time::Date;
use tokio_postgres::{types::ToSql, Row};

use super::{DbError, Store};
use crate::user::{AttendanceStatus, Attribution, Department, Role};

#[derive(Clone, Debug)]
pub struct AttendanceRecord {
    pub id: i64,
    pub user_id: i64,
    pub role: Role,
    pub date: Date,
    pub status: AttendanceStatus,
    pub marked_by: Attribution,
    pub department: Department,
    pub created_at: time::OffsetDateTime,
}

/// A listed record, joined with the subject user's display fields.
#[derive(Clone, Debug)]
pub struct AttendanceEntry {
    pub record: AttendanceRecord,
    pub user_full_name: String,
    pub user_email: String,
}

#[derive(Debug, Default)]
pub struct AttendanceQuery {
    pub user_id: Option<i64>,
    pub role: Option<Role>,
    pub department: Option<Department>,
    pub from: Option<Date>,
    pub to: Option<Date>,
}

fn attendance_from_row(row: &Row) -> Result<AttendanceRecord, DbError> {
    let role_str: &str = row.try_get("role")?;
    let status_str: &str = row.try_get("status")?;
    let marked_by_str: &str = row.try_get("marked_by")?;
    let dept_str: &str = row.try_get("department")?;

    Ok(AttendanceRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        role: role_str.parse()?,
        date: row.try_get("date")?,
        status: status_str.parse()?,
        marked_by: marked_by_str.parse()?,
        department: dept_str.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

impl Store {
    /// Create-or-correct an attendance record by its (user, date)
    /// natural key. Returns the record and whether it was freshly
    /// created (`true`) or an in-place correction (`false`).
    pub async fn upsert_attendance(
        &self,
        user_id: i64,
        role: Role,
        date: Date,
        status: AttendanceStatus,
        marked_by: &Attribution,
        department: Department,
    ) -> Result<(AttendanceRecord, bool), DbError> {
        log::trace!(
            "Store::upsert_attendance( {}, {}, {}, {} ) called.",
            user_id, &date, &status, marked_by
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let existing = t.query_opt(
            "SELECT id FROM attendance WHERE user_id = $1 AND date = $2",
            &[&user_id, &date]
        ).await?;

        let (row, created) = match existing {
            Some(found) => {
                let id: i64 = found.try_get("id")?;
                let row = t.query_one(
                    "UPDATE attendance SET status = $1, marked_by = $2
                        WHERE id = $3 RETURNING *",
                    &[&status.to_string(), &marked_by.to_string(), &id]
                ).await?;
                (row, false)
            },
            None => {
                let row = t.query_one(
                    "INSERT INTO attendance
                        (user_id, role, date, status, marked_by, department)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        RETURNING *",
                    &[
                        &user_id,
                        &role.to_string(),
                        &date,
                        &status.to_string(),
                        &marked_by.to_string(),
                        &department.to_string(),
                    ]
                ).await?;
                (row, true)
            },
        };

        t.commit().await?;
        Ok((attendance_from_row(&row)?, created))
    }

    pub async fn list_attendance(
        &self,
        query: &AttendanceQuery,
    ) -> Result<Vec<AttendanceEntry>, DbError> {
        log::trace!("Store::list_attendance( {:?} ) called.", query);

        let role_s = query.role.map(|r| r.to_string());
        let dept_s = query.department.map(|d| d.to_string());

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref uid) = query.user_id {
            params.push(uid as &(dyn ToSql + Sync));
            conditions.push(format!("a.user_id = ${}", params.len()));
        }
        if let Some(ref r) = role_s {
            params.push(r as &(dyn ToSql + Sync));
            conditions.push(format!("a.role = ${}", params.len()));
        }
        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!("a.department = ${}", params.len()));
        }
        if let Some(ref from) = query.from {
            params.push(from as &(dyn ToSql + Sync));
            conditions.push(format!("a.date >= ${}", params.len()));
        }
        if let Some(ref to) = query.to {
            params.push(to as &(dyn ToSql + Sync));
            conditions.push(format!("a.date <= ${}", params.len()));
        }

        let mut sql = String::from(
            "SELECT a.*, u.full_name AS user_full_name, u.email AS user_email
                FROM attendance a JOIN users u ON u.id = a.user_id"
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY a.date DESC");

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params).await?;

        let mut entries: Vec<AttendanceEntry> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            entries.push(AttendanceEntry {
                record: attendance_from_row(row)?,
                user_full_name: row.try_get("user_full_name")?,
                user_email: row.try_get("user_email")?,
            });
        }

        Ok(entries)
    }

    /// Present/absent/total counts for one user, optionally windowed
    /// and department-restricted. The caller applies scope; this just
    /// counts what the scope allows.
    pub async fn user_attendance_counts(
        &self,
        user_id: i64,
        from: Option<Date>,
        to: Option<Date>,
        department: Option<Department>,
    ) -> Result<(i64, i64, i64), DbError> {
        log::trace!(
            "Store::user_attendance_counts( {}, {:?}, {:?}, {:?} ) called.",
            user_id, &from, &to, &department
        );

        let dept_s = department.map(|d| d.to_string());

        let mut conditions: Vec<String> = vec!["user_id = $1".to_owned()];
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&user_id as &(dyn ToSql + Sync)];

        if let Some(ref from) = from {
            params.push(from as &(dyn ToSql + Sync));
            conditions.push(format!("date >= ${}", params.len()));
        }
        if let Some(ref to) = to {
            params.push(to as &(dyn ToSql + Sync));
            conditions.push(format!("date <= ${}", params.len()));
        }
        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!("department = ${}", params.len()));
        }

        let sql = format!(
            "SELECT status FROM attendance WHERE {}",
            conditions.join(" AND ")
        );

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params).await?;

        let total = rows.len() as i64;
        let mut present: i64 = 0;
        for row in rows.iter() {
            let status: &str = row.try_get("status")?;
            if status == "present" {
                present += 1;
            }
        }

        Ok((total, present, total - present))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::store::users::tests::sample_user;
    use crate::tests::ensure_logging;
    use crate::user::Role;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn marking_twice_corrects_in_place() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let student = db.insert_user(
            &sample_user(10, Role::Student, Department::Bca)
        ).await.unwrap();
        let teacher = db.insert_user(
            &sample_user(11, Role::Teacher, Department::Bca)
        ).await.unwrap();

        let date = time::macros::date!(2024 - 07 - 01);

        let (first, created) = db.upsert_attendance(
            student.id, Role::Student, date,
            AttendanceStatus::Absent,
            &Attribution::User(teacher.id),
            Department::Bca,
        ).await.unwrap();
        assert!(created);
        assert_eq!(first.status, AttendanceStatus::Absent);

        // Same (user, date): corrects rather than duplicates, and the
        // attribution follows the most recent marker.
        let (second, created) = db.upsert_attendance(
            student.id, Role::Student, date,
            AttendanceStatus::Present,
            &Attribution::Admin,
            Department::Bca,
        ).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, AttendanceStatus::Present);
        assert_eq!(second.marked_by, Attribution::Admin);

        let listed = db.list_attendance(&AttendanceQuery {
            user_id: Some(student.id),
            ..AttendanceQuery::default()
        }).await.unwrap();
        assert_eq!(listed.len(), 1);

        let (total, present, absent) =
            db.user_attendance_counts(student.id, None, None, None).await.unwrap();
        assert_eq!((total, present, absent), (1, 1, 0));

        db.nuke_database().await.unwrap();
    }
}
