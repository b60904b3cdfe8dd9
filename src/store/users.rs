/*
`Store` methods for the `users` table, plus attribution resolution
(which is a user lookup wearing a different hat).
*/
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{types::{ToSql, Type}, Row};

use super::{DbError, Store};
use crate::user::{
    ApprovalStatus, Attribution, AttributionView, Department, Role, User,
};

fn user_from_row(row: &Row) -> Result<User, DbError> {
    let role_str: &str = row.try_get("role")?;
    let dept_str: &str = row.try_get("department")?;
    let status_str: &str = row.try_get("status")?;

    Ok(User {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        department: dept_str.parse()?,
        role: role_str.parse()?,
        password_hash: row.try_get("password_hash")?,
        status: status_str.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

/// Field bundle for a registration insert. The email must already be
/// lowercased and the password already hashed by the caller.
#[derive(Debug)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub department: Department,
    pub role: Role,
    pub password_hash: String,
}

/// Filters and paging for the admin user listing.
#[derive(Debug, Default)]
pub struct UserQuery {
    pub status: Option<ApprovalStatus>,
    pub role: Option<Role>,
    pub department: Option<Department>,
    pub limit: i64,
    pub offset: i64,
}

impl Store {
    pub async fn insert_user(&self, new: &NewUser) -> Result<User, DbError> {
        log::trace!(
            "Store::insert_user( {:?} <{}> ) called.",
            &new.full_name, &new.email
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO users
                (full_name, email, phone, department, role, password_hash, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *",
            &[
                &new.full_name,
                &new.email,
                &new.phone,
                &new.department.to_string(),
                &new.role.to_string(),
                &new.password_hash,
                &ApprovalStatus::Pending.to_string(),
            ]
        ).await?;

        user_from_row(&row)
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_id( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE id = $1",
            &[&id]
        ).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_email( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE email = $1",
            &[&email]
        ).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Update the caller-editable profile fields. Passing neither is a
    /// plain fetch.
    pub async fn update_profile(
        &self,
        id: i64,
        full_name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<User>, DbError> {
        log::trace!(
            "Store::update_profile( {}, {:?}, {:?} ) called.",
            id, full_name, phone
        );

        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref name) = full_name {
            params.push(name as &(dyn ToSql + Sync));
            sets.push(format!("full_name = ${}", params.len()));
        }
        if let Some(ref phone) = phone {
            params.push(phone as &(dyn ToSql + Sync));
            sets.push(format!("phone = ${}", params.len()));
        }

        if sets.is_empty() {
            return self.get_user_by_id(id).await;
        }

        params.push(&id as &(dyn ToSql + Sync));
        let sql = format!(
            "UPDATE users SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            params.len()
        );

        let client = self.connect().await?;
        match client.query_opt(sql.as_str(), &params).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn update_password(
        &self,
        id: i64,
        password_hash: &str,
    ) -> Result<bool, DbError> {
        log::trace!("Store::update_password( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE users SET password_hash = $1 WHERE id = $2",
            &[&password_hash, &id]
        ).await?;

        Ok(n > 0)
    }

    pub async fn update_status(
        &self,
        id: i64,
        status: ApprovalStatus,
    ) -> Result<Option<User>, DbError> {
        log::trace!("Store::update_status( {}, {} ) called.", id, &status);

        let client = self.connect().await?;
        match client.query_opt(
            "UPDATE users SET status = $1 WHERE id = $2 RETURNING *",
            &[&status.to_string(), &id]
        ).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Filtered, paginated listing for administration. Returns the
    /// page plus the total count under the same filters.
    pub async fn list_users(
        &self,
        query: &UserQuery,
    ) -> Result<(Vec<User>, i64), DbError> {
        log::trace!("Store::list_users( {:?} ) called.", query);

        let status_s = query.status.map(|s| s.to_string());
        let role_s = query.role.map(|r| r.to_string());
        let dept_s = query.department.map(|d| d.to_string());

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref s) = status_s {
            params.push(s as &(dyn ToSql + Sync));
            conditions.push(format!("status = ${}", params.len()));
        }
        if let Some(ref r) = role_s {
            params.push(r as &(dyn ToSql + Sync));
            conditions.push(format!("role = ${}", params.len()));
        }
        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!("department = ${}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let client = self.connect().await?;

        let count_sql = format!("SELECT COUNT(*) AS n FROM users{}", &where_clause);
        let count_row = client.query_one(count_sql.as_str(), &params).await?;
        let total: i64 = count_row.try_get("n")?;

        params.push(&query.limit as &(dyn ToSql + Sync));
        let limit_idx = params.len();
        params.push(&query.offset as &(dyn ToSql + Sync));
        let sql = format!(
            "SELECT * FROM users{} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            &where_clause, limit_idx, params.len()
        );

        let rows = client.query(sql.as_str(), &params).await?;
        let mut users: Vec<User> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            users.push(user_from_row(row)?);
        }

        Ok((users, total))
    }

    pub async fn list_pending_users(&self) -> Result<Vec<User>, DbError> {
        log::trace!("Store::list_pending_users() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM users WHERE status = 'pending' ORDER BY created_at DESC",
            &[]
        ).await?;

        let mut users: Vec<User> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            users.push(user_from_row(row)?);
        }

        Ok(users)
    }

    /// Approved users, optionally narrowed by role and department,
    /// alphabetical by name. This backs the directory-style listing.
    pub async fn list_users_by_role(
        &self,
        role: Option<Role>,
        department: Option<Department>,
    ) -> Result<Vec<User>, DbError> {
        log::trace!(
            "Store::list_users_by_role( {:?}, {:?} ) called.",
            &role, &department
        );

        let role_s = role.map(|r| r.to_string());
        let dept_s = department.map(|d| d.to_string());

        let mut conditions: Vec<String> = vec!["status = 'approved'".to_owned()];
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref r) = role_s {
            params.push(r as &(dyn ToSql + Sync));
            conditions.push(format!("role = ${}", params.len()));
        }
        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!("department = ${}", params.len()));
        }

        let sql = format!(
            "SELECT * FROM users WHERE {} ORDER BY full_name",
            conditions.join(" AND ")
        );

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params).await?;
        let mut users: Vec<User> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            users.push(user_from_row(row)?);
        }

        Ok(users)
    }

    pub async fn count_users(
        &self,
        role: Option<Role>,
        department: Option<Department>,
        status: Option<ApprovalStatus>,
    ) -> Result<i64, DbError> {
        log::trace!(
            "Store::count_users( {:?}, {:?}, {:?} ) called.",
            &role, &department, &status
        );

        let role_s = role.map(|r| r.to_string());
        let dept_s = department.map(|d| d.to_string());
        let status_s = status.map(|s| s.to_string());

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref r) = role_s {
            params.push(r as &(dyn ToSql + Sync));
            conditions.push(format!("role = ${}", params.len()));
        }
        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!("department = ${}", params.len()));
        }
        if let Some(ref s) = status_s {
            params.push(s as &(dyn ToSql + Sync));
            conditions.push(format!("status = ${}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!("SELECT COUNT(*) AS n FROM users{}", &where_clause);

        let client = self.connect().await?;
        let row = client.query_one(sql.as_str(), &params).await?;
        Ok(row.try_get("n")?)
    }

    /// Resolve one attribution reference for display. The admin
    /// sentinel resolves to its fixed pair without touching the
    /// database; a dangling user reference degrades to the raw id.
    pub async fn resolve_attribution(
        &self,
        reference: &Attribution,
    ) -> Result<AttributionView, DbError> {
        let id = match reference {
            Attribution::Admin => { return Ok(AttributionView::admin()); },
            Attribution::User(id) => *id,
        };

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT full_name FROM users WHERE id = $1",
            &[&id]
        ).await? {
            Some(row) => {
                let full_name: String = row.try_get("full_name")?;
                Ok(AttributionView::resolved(id, full_name))
            },
            None => Ok(AttributionView::unresolved(reference)),
        }
    }

    /// Resolve a whole list's worth of attribution references at once,
    /// order-preserving. One prepared statement, lookups pipelined on
    /// a single connection; sentinels never hit the wire.
    pub async fn resolve_attributions(
        &self,
        references: &[Attribution],
    ) -> Result<Vec<AttributionView>, DbError> {
        log::trace!(
            "Store::resolve_attributions( [ {} references ] ) called.",
            references.len()
        );

        let mut views: Vec<AttributionView> = references.iter()
            .map(AttributionView::unresolved)
            .collect();

        let needs_lookup: Vec<(usize, i64)> = references.iter()
            .enumerate()
            .filter_map(|(n, r)| match r {
                Attribution::Admin => {
                    views[n] = AttributionView::admin();
                    None
                },
                Attribution::User(id) => Some((n, *id)),
            })
            .collect();

        if needs_lookup.is_empty() {
            return Ok(views);
        }

        let client = self.connect().await?;
        let stmt = client.prepare_typed(
            "SELECT full_name FROM users WHERE id = $1",
            &[Type::INT8]
        ).await?;

        let client_ref = &client;
        let stmt_ref = &stmt;
        let mut lookups = FuturesUnordered::new();
        for (n, id) in needs_lookup.iter() {
            let (n, id) = (*n, *id);
            lookups.push(async move {
                let params: [&(dyn ToSql + Sync); 1] = [&id];
                (n, id, client_ref.query_opt(stmt_ref, &params[..]).await)
            });
        }

        while let Some((n, id, res)) = lookups.next().await {
            match res {
                Ok(Some(row)) => {
                    let full_name: String = row.try_get("full_name")?;
                    views[n] = AttributionView::resolved(id, full_name);
                },
                // A deleted user: leave the raw reference in place.
                Ok(None) => {},
                Err(e) => { return Err(DbError::from(e)); },
            }
        }

        Ok(views)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    pub fn sample_user(n: u32, role: Role, department: Department) -> NewUser {
        NewUser {
            full_name: format!("Sample User {}", n),
            email: format!("sample{}@example.edu", n),
            phone: format!("98000000{:02}", n),
            department,
            role,
            password_hash: "$2b$12$not.a.real.hash".to_owned(),
        }
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_and_fetch_users() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let t = db.insert_user(&sample_user(1, Role::Teacher, Department::Bca)).await.unwrap();
        let s = db.insert_user(&sample_user(2, Role::Student, Department::Bca)).await.unwrap();

        assert_eq!(t.status, ApprovalStatus::Pending);

        let fetched = db.get_user_by_email("sample1@example.edu").await.unwrap().unwrap();
        assert_eq!(fetched.id, t.id);
        assert_eq!(fetched.role, Role::Teacher);

        let approved = db.update_status(s.id, ApprovalStatus::Approved).await.unwrap().unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);

        let listed = db.list_users_by_role(Some(Role::Student), Some(Department::Bca)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, s.id);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn duplicate_email_is_a_unique_violation() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.insert_user(&sample_user(3, Role::Student, Department::Ba)).await.unwrap();
        let err = db.insert_user(&sample_user(3, Role::Student, Department::Ba)).await.unwrap_err();
        assert!(err.is_unique_violation());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn attribution_resolution() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let u = db.insert_user(&sample_user(4, Role::Hod, Department::BCom)).await.unwrap();

        let views = db.resolve_attributions(&[
            Attribution::Admin,
            Attribution::User(u.id),
            Attribution::User(999_999),
        ]).await.unwrap();

        assert_eq!(views[0], AttributionView::admin());
        assert_eq!(
            views[1],
            AttributionView::resolved(u.id, "Sample User 4".to_owned())
        );
        assert_eq!(views[2], AttributionView::Unresolved("999999".to_owned()));

        db.nuke_database().await.unwrap();
    }
}
