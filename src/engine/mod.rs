//! Seminar lifecycle rules.
//!
//! The pure pieces (`eligibility`, `period`, the arithmetic in `ledger`) take
//! everything they need as arguments, including "today". The workflow
//! functions in `makeup`, `attendance` and `certificates` run their
//! read-then-write sequences inside a single SQLite transaction and lean on
//! the schema's unique indexes for the invariants that must hold under
//! concurrent requests.

pub mod attendance;
pub mod certificates;
pub mod eligibility;
pub mod ledger;
pub mod makeup;
pub mod period;

use chrono::NaiveDate;
use sqlx::{Sqlite, Transaction};

use crate::db::DbPool;

/// Errors raised by seminar workflows
#[derive(Debug, thiserror::Error)]
pub enum SeminarError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotEligible(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for SeminarError {
    fn from(err: sqlx::Error) -> Self {
        if is_busy(&err) {
            tracing::debug!(error = %err, "Write lock contention");
            return Self::Conflict(
                "The record is being changed by another request, please retry".to_string(),
            );
        }
        Self::Database(err)
    }
}

impl SeminarError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type SeminarResult<T> = Result<T, SeminarError>;

/// Current calendar date in the server's local time zone
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Open a transaction that takes the write lock up front.
///
/// Read-then-write workflows must start here: a deferred transaction that
/// upgrades to a writer after another commit fails with SQLITE_BUSY instead
/// of waiting.
pub(crate) async fn begin_write(db: &DbPool) -> SeminarResult<Transaction<'static, Sqlite>> {
    Ok(db.begin_with("BEGIN IMMEDIATE").await?)
}

/// SQLITE_BUSY, SQLITE_LOCKED and their extended codes
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false),
        _ => false,
    }
}

/// Whether a database error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Seed helpers shared by the workflow tests.

    use crate::db::DbPool;

    pub async fn user(db: &DbPool, id: &str, role: &str) {
        sqlx::query("INSERT INTO users (id, email, name, role) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(format!("{}@example.org", id))
            .bind(format!("User {}", id))
            .bind(role)
            .execute(db)
            .await
            .unwrap();
    }

    pub async fn seminar(db: &DbPool, id: &str, total_sessions: i64) {
        sqlx::query(
            "INSERT INTO seminars (id, title, program_year, total_sessions) VALUES (?, ?, 2025, ?)",
        )
        .bind(id)
        .bind(format!("Seminar {}", id))
        .bind(total_sessions)
        .execute(db)
        .await
        .unwrap();
    }

    pub async fn session(db: &DbPool, id: &str, seminar_id: &str, number: i64, date: &str) {
        sqlx::query(
            r#"
            INSERT INTO seminar_sessions (id, seminar_id, session_number, session_date, time_start, time_end, topic)
            VALUES (?, ?, ?, ?, '09:00', '17:00', ?)
            "#,
        )
        .bind(id)
        .bind(seminar_id)
        .bind(number)
        .bind(date)
        .bind(format!("Topic {}", number))
        .execute(db)
        .await
        .unwrap();
    }

    pub async fn registration(db: &DbPool, id: &str, user_id: &str, seminar_id: &str, total: i64) {
        sqlx::query(
            r#"
            INSERT INTO seminar_registrations (id, user_id, seminar_id, sessions_remaining, qr_code)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(seminar_id)
        .bind(total)
        .bind(format!("qr-{}", id))
        .execute(db)
        .await
        .unwrap();
    }

    pub async fn attend(db: &DbPool, registration_id: &str, session_id: &str) {
        sqlx::query(
            "INSERT INTO seminar_attendance (id, registration_id, session_id) VALUES (?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(registration_id)
        .bind(session_id)
        .execute(db)
        .await
        .unwrap();
    }
}
