/*!
Database interaction module.

The Postgres database this connects to holds one table per entity.
The two compound UNIQUE constraints matter: they are the authoritative
defense for the natural-key upserts. Two concurrent "mark attendance"
calls for the same (user, date) can both observe "no existing record";
the constraint makes the loser fail with a conflict instead of leaving
a duplicate behind.

```sql
CREATE TABLE users (
    id            BIGSERIAL PRIMARY KEY,
    full_name     TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,   /* stored lowercased */
    phone         TEXT NOT NULL,
    department    TEXT NOT NULL,          /* 'BCA' | 'BCom' | 'BA' */
    role          TEXT NOT NULL,          /* 'student' | 'teacher' | 'hod' */
    password_hash TEXT NOT NULL,
    status        TEXT NOT NULL,          /* 'pending' | 'approved' | 'rejected' */
    created_at    TIMESTAMPTZ NOT NULL
);

CREATE TABLE attendance (
    /* UNIQUE (user_id, date) */
);

/* ... and so on; see SCHEMA below for the full DDL. */
```

Attribution columns (`marked_by`, `created_by`, `reviewed_by`) are TEXT
holding either a decimal user id or the literal `admin`, preserving the
polymorphic stored form; the Rust side parses them into
`user::Attribution`.
*/
use std::fmt::Write;

use tokio_postgres::{error::SqlState, Client, NoTls};

pub mod assignments;
pub mod attendance;
pub mod exams;
pub mod leave;
pub mod notifications;
pub mod results;
pub mod timetable;
pub mod users;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            id            BIGSERIAL PRIMARY KEY,
            full_name     TEXT NOT NULL,
            email         TEXT NOT NULL UNIQUE,
            phone         TEXT NOT NULL,
            department    TEXT NOT NULL,
            role          TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending',
            created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'attendance'",
        "CREATE TABLE attendance (
            id         BIGSERIAL PRIMARY KEY,
            user_id    BIGINT NOT NULL REFERENCES users(id),
            role       TEXT NOT NULL,
            date       DATE NOT NULL,
            status     TEXT NOT NULL,
            marked_by  TEXT NOT NULL,
            department TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (user_id, date)
        )",
        "DROP TABLE attendance",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'timetable'",
        "CREATE TABLE timetable (
            id         BIGSERIAL PRIMARY KEY,
            department TEXT NOT NULL,
            role       TEXT NOT NULL,
            day        TEXT NOT NULL,
            subject    TEXT NOT NULL,
            time_slot  TEXT NOT NULL,
            created_by TEXT NOT NULL,
            UNIQUE (department, role, day, time_slot)
        )",
        "DROP TABLE timetable",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'exams'",
        "CREATE TABLE exams (
            id         BIGSERIAL PRIMARY KEY,
            department TEXT NOT NULL,
            exam_name  TEXT NOT NULL,
            subjects   JSONB NOT NULL,
            start_date DATE NOT NULL,
            end_date   DATE NOT NULL,
            created_by TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE exams",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'results'",
        "CREATE TABLE results (
            id         BIGSERIAL PRIMARY KEY,
            student_id BIGINT NOT NULL REFERENCES users(id),
            exam_id    BIGINT NOT NULL REFERENCES exams(id),
            subject    TEXT NOT NULL,
            marks      INTEGER NOT NULL,
            status     TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (student_id, exam_id, subject)
        )",
        "DROP TABLE results",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'assignments'",
        "CREATE TABLE assignments (
            id         BIGSERIAL PRIMARY KEY,
            department TEXT NOT NULL,
            subject    TEXT NOT NULL,
            questions  TEXT NOT NULL,
            due_date   DATE NOT NULL,
            marks      INTEGER NOT NULL,
            created_by TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE assignments",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'notifications'",
        "CREATE TABLE notifications (
            id          BIGSERIAL PRIMARY KEY,
            title       TEXT NOT NULL,
            description TEXT NOT NULL,
            media       TEXT,
            target_role TEXT NOT NULL,
            department  TEXT NOT NULL,
            created_by  TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE notifications",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'leave_requests'",
        "CREATE TABLE leave_requests (
            id           BIGSERIAL PRIMARY KEY,
            requested_by BIGINT NOT NULL REFERENCES users(id),
            role         TEXT NOT NULL,
            reason       TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'pending',
            reviewed_by  TEXT,
            reviewed_at  TIMESTAMPTZ,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE leave_requests",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError {
    message: String,
    unique_violation: bool,
}

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let message = format!("{}: {}", annotation, &self.message);
        Self { message, ..self }
    }

    pub fn display(&self) -> &str { &self.message }

    /// Did a UNIQUE constraint fire? The natural-key upserts care: the
    /// loser of an insert race should surface a conflict, not a 500.
    pub fn is_unique_violation(&self) -> bool { self.unique_violation }

    #[cfg(test)]
    pub fn unique_violation_for_test() -> Self {
        DbError {
            message: "duplicate key value violates unique constraint".to_owned(),
            unique_violation: true,
        }
    }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let unique_violation = e.code() == Some(&SqlState::UNIQUE_VIOLATION);
        let mut message = format!("DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut message, "; {}", dbe).unwrap();
        }
        DbError { message, unique_violation }
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError {
        DbError { message: s, unique_violation: false }
    }
}

#[derive(Debug)]
pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!("Store::connect() called.");

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to create table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to
    look at the ERROR level log output when testing to ensure this
    method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ...nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    /*!
    The `#[ignore]`d tests in this module and its siblings assume a
    Postgres instance on the local machine with resources named
    according to `TEST_CONNECTION`:

    ```text
    user: campus_test
    password: campus_test

    with write access to:

    database: campus_store_test
    ```

    Run them with `cargo test -- --ignored` once that exists.
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str =
        "host=localhost user=campus_test password='campus_test' dbname=campus_store_test";

    /**
    This function is for getting the database back in a blank-slate
    state if a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }
}
