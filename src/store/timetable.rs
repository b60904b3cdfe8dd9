/*
`Store` methods for the `timetable` table.

A slot is keyed by (department, role, day, time_slot); writing the same
slot again replaces the subject. The UNIQUE constraint carries the
natural key.
*/
use tokio_postgres::{types::ToSql, Row};

use super::{DbError, Store};
use crate::user::{Attribution, Day, Department, Role};

#[derive(Clone, Debug)]
pub struct TimetableEntry {
    pub id: i64,
    pub department: Department,
    pub role: Role,
    pub day: Day,
    pub subject: String,
    pub time_slot: String,
    pub created_by: Attribution,
}

#[derive(Debug, Default)]
pub struct TimetableQuery {
    pub department: Option<Department>,
    pub role: Option<Role>,
    pub day: Option<Day>,
}

fn entry_from_row(row: &Row) -> Result<TimetableEntry, DbError> {
    let dept_str: &str = row.try_get("department")?;
    let role_str: &str = row.try_get("role")?;
    let day_str: &str = row.try_get("day")?;
    let created_by_str: &str = row.try_get("created_by")?;

    Ok(TimetableEntry {
        id: row.try_get("id")?,
        department: dept_str.parse()?,
        role: role_str.parse()?,
        day: day_str.parse()?,
        subject: row.try_get("subject")?,
        time_slot: row.try_get("time_slot")?,
        created_by: created_by_str.parse()?,
    })
}

impl Store {
    /// Create-or-replace the slot named by the natural key. Returns
    /// the entry and whether it was freshly created.
    pub async fn upsert_timetable_slot(
        &self,
        department: Department,
        role: Role,
        day: Day,
        time_slot: &str,
        subject: &str,
        created_by: &Attribution,
    ) -> Result<(TimetableEntry, bool), DbError> {
        log::trace!(
            "Store::upsert_timetable_slot( {}, {}, {}, {:?} ) called.",
            &department, &role, &day, time_slot
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let existing = t.query_opt(
            "SELECT id FROM timetable
                WHERE department = $1 AND role = $2 AND day = $3 AND time_slot = $4",
            &[
                &department.to_string(),
                &role.to_string(),
                &day.to_string(),
                &time_slot,
            ]
        ).await?;

        let (row, created) = match existing {
            Some(found) => {
                let id: i64 = found.try_get("id")?;
                let row = t.query_one(
                    "UPDATE timetable SET subject = $1, created_by = $2
                        WHERE id = $3 RETURNING *",
                    &[&subject, &created_by.to_string(), &id]
                ).await?;
                (row, false)
            },
            None => {
                let row = t.query_one(
                    "INSERT INTO timetable
                        (department, role, day, subject, time_slot, created_by)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        RETURNING *",
                    &[
                        &department.to_string(),
                        &role.to_string(),
                        &day.to_string(),
                        &subject,
                        &time_slot,
                        &created_by.to_string(),
                    ]
                ).await?;
                (row, true)
            },
        };

        t.commit().await?;
        Ok((entry_from_row(&row)?, created))
    }

    pub async fn list_timetable(
        &self,
        query: &TimetableQuery,
    ) -> Result<Vec<TimetableEntry>, DbError> {
        log::trace!("Store::list_timetable( {:?} ) called.", query);

        let dept_s = query.department.map(|d| d.to_string());
        let role_s = query.role.map(|r| r.to_string());
        let day_s = query.day.map(|d| d.to_string());

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref d) = dept_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!("department = ${}", params.len()));
        }
        if let Some(ref r) = role_s {
            params.push(r as &(dyn ToSql + Sync));
            conditions.push(format!("role = ${}", params.len()));
        }
        if let Some(ref d) = day_s {
            params.push(d as &(dyn ToSql + Sync));
            conditions.push(format!("day = ${}", params.len()));
        }

        let mut sql = String::from("SELECT * FROM timetable");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY day, time_slot");

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params).await?;

        let mut entries: Vec<TimetableEntry> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            entries.push(entry_from_row(row)?);
        }

        Ok(entries)
    }

    pub async fn get_timetable_entry(
        &self,
        id: i64,
    ) -> Result<Option<TimetableEntry>, DbError> {
        log::trace!("Store::get_timetable_entry( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM timetable WHERE id = $1",
            &[&id]
        ).await? {
            Some(row) => Ok(Some(entry_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_timetable_entry(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_timetable_entry( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM timetable WHERE id = $1",
            &[&id]
        ).await?;

        Ok(n > 0)
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
    async fn slot_upsert_replaces_subject() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let (first, created) = db.upsert_timetable_slot(
            Department::Bca, Role::Student, Day::Monday,
            "09:00-10:00", "Data Structures",
            &Attribution::Admin,
        ).await.unwrap();
        assert!(created);

        let (second, created) = db.upsert_timetable_slot(
            Department::Bca, Role::Student, Day::Monday,
            "09:00-10:00", "Operating Systems",
            &Attribution::Admin,
        ).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(&second.subject, "Operating Systems");

        let listed = db.list_timetable(&TimetableQuery {
            department: Some(Department::Bca),
            ..TimetableQuery::default()
        }).await.unwrap();
        assert_eq!(listed.len(), 1);

        assert!(db.delete_timetable_entry(first.id).await.unwrap());
        assert!(db.get_timetable_entry(first.id).await.unwrap().is_none());

        db.nuke_database().await.unwrap();
    }
}
