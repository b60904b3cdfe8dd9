/*
`Store` methods for the `notifications` table.

Visibility is two-axis: a notification targets a role (or `all`) and a
department (or `all`), and a reader must match on both axes. The admin
caller skips the department axis entirely.
*/
use tokio_postgres::{types::ToSql, Row};

use super::{DbError, Store};
use crate::{
    policy::NotificationScope,
    user::{Attribution, Audience, Department},
};

#[derive(Clone, Debug)]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub media: Option<String>,
    pub target_role: Audience,
    pub department: Department,
    pub created_by: Attribution,
    pub created_at: time::OffsetDateTime,
}

fn notification_from_row(row: &Row) -> Result<Notification, DbError> {
    let target_role_str: &str = row.try_get("target_role")?;
    let dept_str: &str = row.try_get("department")?;
    let created_by_str: &str = row.try_get("created_by")?;

    Ok(Notification {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        media: row.try_get("media")?,
        target_role: target_role_str.parse()?,
        department: dept_str.parse()?,
        created_by: created_by_str.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

impl Store {
    pub async fn insert_notification(
        &self,
        title: &str,
        description: &str,
        media: Option<&str>,
        target_role: Audience,
        department: Department,
        created_by: &Attribution,
    ) -> Result<Notification, DbError> {
        log::trace!(
            "Store::insert_notification( {:?}, {}, {} ) called.",
            title, &target_role, &department
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO notifications
                (title, description, media, target_role, department, created_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *",
            &[
                &title,
                &description,
                &media,
                &target_role.to_string(),
                &department.to_string(),
                &created_by.to_string(),
            ]
        ).await?;

        notification_from_row(&row)
    }

    /// Listing under a derived scope: the role axis always constrains
    /// (`role OR all`), the department axis only when the scope names
    /// a department.
    pub async fn list_notifications(
        &self,
        scope: &NotificationScope,
    ) -> Result<Vec<Notification>, DbError> {
        log::trace!("Store::list_notifications( {:?} ) called.", scope);

        let dept_s = scope.department.map(|d| d.to_string());

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        params.push(&scope.role_key as &(dyn ToSql + Sync));
        conditions.push(format!(
            "(target_role = ${} OR target_role = 'all')",
            params.len()
        ));

        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!(
                "(department = ${} OR department = 'all')",
                params.len()
            ));
        }

        let sql = format!(
            "SELECT * FROM notifications WHERE {} ORDER BY created_at DESC",
            conditions.join(" AND ")
        );

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params).await?;

        let mut notifications: Vec<Notification> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            notifications.push(notification_from_row(row)?);
        }

        Ok(notifications)
    }

    pub async fn get_notification(
        &self,
        id: i64,
    ) -> Result<Option<Notification>, DbError> {
        log::trace!("Store::get_notification( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM notifications WHERE id = $1",
            &[&id]
        ).await? {
            Some(row) => Ok(Some(notification_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Partial update; `media` distinguishes "leave alone" (`None`)
    /// from "clear it" (`Some(None)`).
    pub async fn update_notification(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
        media: Option<Option<&str>>,
        target_role: Option<Audience>,
        department: Option<Department>,
    ) -> Result<Option<Notification>, DbError> {
        log::trace!("Store::update_notification( {} ) called.", id);

        let target_role_s = target_role.map(|a| a.to_string());
        let dept_s = department.map(|d| d.to_string());

        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref t) = title {
            params.push(t as &(dyn ToSql + Sync));
            sets.push(format!("title = ${}", params.len()));
        }
        if let Some(ref d) = description {
            params.push(d as &(dyn ToSql + Sync));
            sets.push(format!("description = ${}", params.len()));
        }
        if let Some(ref m) = media {
            params.push(m as &(dyn ToSql + Sync));
            sets.push(format!("media = ${}", params.len()));
        }
        if let Some(ref t) = target_role_s {
            params.push(t as &(dyn ToSql + Sync));
            sets.push(format!("target_role = ${}", params.len()));
        }
        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            sets.push(format!("department = ${}", params.len()));
        }

        if sets.is_empty() {
            return self.get_notification(id).await;
        }

        params.push(&id as &(dyn ToSql + Sync));
        let sql = format!(
            "UPDATE notifications SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            params.len()
        );

        let client = self.connect().await?;
        match client.query_opt(sql.as_str(), &params).await? {
            Some(row) => Ok(Some(notification_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_notification(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_notification( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM notifications WHERE id = $1",
            &[&id]
        ).await?;

        Ok(n > 0)
    }

    /// Counting for the dashboards. Either axis may be absent; a
    /// present axis matches `value OR all` like the listing does.
    pub async fn count_notifications(
        &self,
        role_key: Option<&str>,
        department: Option<Department>,
    ) -> Result<i64, DbError> {
        log::trace!(
            "Store::count_notifications( {:?}, {:?} ) called.",
            &role_key, &department
        );

        let dept_s = department.map(|d| d.to_string());

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref r) = role_key {
            params.push(r as &(dyn ToSql + Sync));
            conditions.push(format!(
                "(target_role = ${} OR target_role = 'all')",
                params.len()
            ));
        }
        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!(
                "(department = ${} OR department = 'all')",
                params.len()
            ));
        }

        let mut sql = String::from("SELECT COUNT(*) AS n FROM notifications");
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
    use crate::tests::ensure_logging;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn two_axis_scoping() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.insert_notification(
            "Exam schedule", "Finals begin Nov 4.",
            None, Audience::Student, Department::Bca, &Attribution::Admin,
        ).await.unwrap();
        db.insert_notification(
            "Staff meeting", "Friday, 3 PM.",
            None, Audience::Teacher, Department::Bca, &Attribution::Admin,
        ).await.unwrap();
        db.insert_notification(
            "Holiday", "Campus closed Monday.",
            None, Audience::All, Department::All, &Attribution::Admin,
        ).await.unwrap();

        // A BCA student: own-role + campus-wide, not the staff notice.
        let listed = db.list_notifications(&NotificationScope {
            role_key: "student".to_owned(),
            department: Some(Department::Bca),
        }).await.unwrap();
        assert_eq!(listed.len(), 2);

        // A BCom student only matches the campus-wide one.
        let listed = db.list_notifications(&NotificationScope {
            role_key: "student".to_owned(),
            department: Some(Department::BCom),
        }).await.unwrap();
        assert_eq!(listed.len(), 1);

        assert_eq!(db.count_notifications(None, None).await.unwrap(), 3);
        assert_eq!(
            db.count_notifications(Some("teacher"), Some(Department::Bca)).await.unwrap(),
            2
        );

        db.nuke_database().await.unwrap();
    }
}
