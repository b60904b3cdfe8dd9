/*
`Store` methods for the `leave_requests` table.

Department is deliberately not denormalized onto the request; listings
join the requester so callers that scope by department (the HOD view)
can filter on the requester's department after the query.
*/
use time::OffsetDateTime;
use tokio_postgres::{types::ToSql, Row};

use super::{DbError, Store};
use crate::user::{ApprovalStatus, Attribution, Department, Role};

#[derive(Clone, Debug)]
pub struct LeaveRecord {
    pub id: i64,
    pub requested_by: i64,
    pub role: Role,
    pub reason: String,
    pub status: ApprovalStatus,
    pub reviewed_by: Option<Attribution>,
    pub reviewed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// A request joined with its requester's display fields.
#[derive(Clone, Debug)]
pub struct LeaveEntry {
    pub record: LeaveRecord,
    pub requester_full_name: String,
    pub requester_email: String,
    pub requester_department: Department,
    pub requester_role: Role,
}

#[derive(Debug, Default)]
pub struct LeaveQuery {
    pub requested_by: Option<i64>,
    pub role: Option<Role>,
    pub status: Option<ApprovalStatus>,
}

fn record_from_row(row: &Row) -> Result<LeaveRecord, DbError> {
    let role_str: &str = row.try_get("role")?;
    let status_str: &str = row.try_get("status")?;
    let reviewed_by_str: Option<&str> = row.try_get("reviewed_by")?;
    let reviewed_by = match reviewed_by_str {
        Some(s) => Some(s.parse()?),
        None => None,
    };

    Ok(LeaveRecord {
        id: row.try_get("id")?,
        requested_by: row.try_get("requested_by")?,
        role: role_str.parse()?,
        reason: row.try_get("reason")?,
        status: status_str.parse()?,
        reviewed_by,
        reviewed_at: row.try_get("reviewed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &Row) -> Result<LeaveEntry, DbError> {
    let dept_str: &str = row.try_get("requester_department")?;
    let role_str: &str = row.try_get("requester_role")?;

    Ok(LeaveEntry {
        record: record_from_row(row)?,
        requester_full_name: row.try_get("requester_full_name")?,
        requester_email: row.try_get("requester_email")?,
        requester_department: dept_str.parse()?,
        requester_role: role_str.parse()?,
    })
}

const ENTRY_SELECT: &str =
    "SELECT l.*,
        u.full_name AS requester_full_name,
        u.email AS requester_email,
        u.department AS requester_department,
        u.role AS requester_role
        FROM leave_requests l
        JOIN users u ON u.id = l.requested_by";

impl Store {
    pub async fn insert_leave_request(
        &self,
        requested_by: i64,
        role: Role,
        reason: &str,
    ) -> Result<LeaveEntry, DbError> {
        log::trace!(
            "Store::insert_leave_request( {}, {} ) called.",
            requested_by, &role
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO leave_requests (requested_by, role, reason)
                VALUES ($1, $2, $3)
                RETURNING id",
            &[&requested_by, &role.to_string(), &reason]
        ).await?;
        let id: i64 = row.try_get("id")?;

        // Re-read joined so the response carries the requester fields.
        let sql = format!("{} WHERE l.id = $1", ENTRY_SELECT);
        let row = client.query_one(sql.as_str(), &[&id]).await?;
        entry_from_row(&row)
    }

    pub async fn list_leave_requests(
        &self,
        query: &LeaveQuery,
    ) -> Result<Vec<LeaveEntry>, DbError> {
        log::trace!("Store::list_leave_requests( {:?} ) called.", query);

        let role_s = query.role.map(|r| r.to_string());
        let status_s = query.status.map(|s| s.to_string());

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref uid) = query.requested_by {
            params.push(uid as &(dyn ToSql + Sync));
            conditions.push(format!("l.requested_by = ${}", params.len()));
        }
        if let Some(ref r) = role_s {
            params.push(r as &(dyn ToSql + Sync));
            conditions.push(format!("l.role = ${}", params.len()));
        }
        if let Some(ref s) = status_s {
            params.push(s as &(dyn ToSql + Sync));
            conditions.push(format!("l.status = ${}", params.len()));
        }

        let mut sql = String::from(ENTRY_SELECT);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY l.created_at DESC");

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params).await?;

        let mut entries: Vec<LeaveEntry> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            entries.push(entry_from_row(row)?);
        }

        Ok(entries)
    }

    pub async fn get_leave_request(
        &self,
        id: i64,
    ) -> Result<Option<LeaveEntry>, DbError> {
        log::trace!("Store::get_leave_request( {} ) called.", id);

        let sql = format!("{} WHERE l.id = $1", ENTRY_SELECT);

        let client = self.connect().await?;
        match client.query_opt(sql.as_str(), &[&id]).await? {
            Some(row) => Ok(Some(entry_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Stamp the review verdict, reviewer, and review time.
    pub async fn review_leave_request(
        &self,
        id: i64,
        status: ApprovalStatus,
        reviewed_by: &Attribution,
        reviewed_at: OffsetDateTime,
    ) -> Result<Option<LeaveEntry>, DbError> {
        log::trace!(
            "Store::review_leave_request( {}, {}, {} ) called.",
            id, &status, reviewed_by
        );

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE leave_requests
                SET status = $1, reviewed_by = $2, reviewed_at = $3
                WHERE id = $4",
            &[
                &status.to_string(),
                &reviewed_by.to_string(),
                &reviewed_at,
                &id,
            ]
        ).await?;

        if n == 0 {
            return Ok(None);
        }

        let sql = format!("{} WHERE l.id = $1", ENTRY_SELECT);
        let row = client.query_one(sql.as_str(), &[&id]).await?;
        Ok(Some(entry_from_row(&row)?))
    }

    pub async fn delete_leave_request(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_leave_request( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM leave_requests WHERE id = $1",
            &[&id]
        ).await?;

        Ok(n > 0)
    }

    pub async fn count_leave_requests(
        &self,
        requested_by: Option<i64>,
        status: Option<ApprovalStatus>,
    ) -> Result<i64, DbError> {
        log::trace!(
            "Store::count_leave_requests( {:?}, {:?} ) called.",
            &requested_by, &status
        );

        let status_s = status.map(|s| s.to_string());

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref uid) = requested_by {
            params.push(uid as &(dyn ToSql + Sync));
            conditions.push(format!("requested_by = ${}", params.len()));
        }
        if let Some(ref s) = status_s {
            params.push(s as &(dyn ToSql + Sync));
            conditions.push(format!("status = ${}", params.len()));
        }

        let mut sql = String::from("SELECT COUNT(*) AS n FROM leave_requests");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
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

    use crate::store::tests::TEST_CONNECTION;
    use crate::store::users::tests::sample_user;
    use crate::tests::ensure_logging;
    use crate::user::Department;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn request_lifecycle() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let teacher = db.insert_user(
            &sample_user(30, Role::Teacher, Department::Bca)
        ).await.unwrap();
        let hod = db.insert_user(
            &sample_user(31, Role::Hod, Department::Bca)
        ).await.unwrap();

        let entry = db.insert_leave_request(
            teacher.id, Role::Teacher, "Family function."
        ).await.unwrap();
        assert_eq!(entry.record.status, ApprovalStatus::Pending);
        assert!(entry.record.reviewed_by.is_none());
        assert!(entry.record.reviewed_at.is_none());
        assert_eq!(entry.requester_department, Department::Bca);

        let reviewed = db.review_leave_request(
            entry.record.id,
            ApprovalStatus::Approved,
            &Attribution::User(hod.id),
            OffsetDateTime::now_utc(),
        ).await.unwrap().unwrap();
        assert_eq!(reviewed.record.status, ApprovalStatus::Approved);
        assert_eq!(reviewed.record.reviewed_by, Some(Attribution::User(hod.id)));
        assert!(reviewed.record.reviewed_at.is_some());

        let pending_teachers = db.list_leave_requests(&LeaveQuery {
            role: Some(Role::Teacher),
            status: Some(ApprovalStatus::Pending),
            ..LeaveQuery::default()
        }).await.unwrap();
        assert!(pending_teachers.is_empty());

        assert!(db.delete_leave_request(entry.record.id).await.unwrap());

        db.nuke_database().await.unwrap();
    }
}
