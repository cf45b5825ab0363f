//! Seminar programs and their dated sessions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Calendar dates are stored as `YYYY-MM-DD`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Seminar {
    pub id: String,
    pub title: String,
    pub program_year: i64,
    pub total_sessions: i64,
    /// CE credits earned per attended session
    pub credits_per_session: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SeminarSession {
    pub id: String,
    pub seminar_id: String,
    pub session_number: i64,
    pub session_date: String,
    pub time_start: String,
    pub time_end: String,
    pub topic: String,
    pub description: Option<String>,
}

impl SeminarSession {
    /// Parsed session date, `None` if the stored value is malformed
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.session_date, DATE_FORMAT).ok()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSeminarRequest {
    pub title: String,
    pub program_year: i64,
    /// Defaults to the configured program length
    pub total_sessions: Option<i64>,
    /// Defaults to the configured credits per session
    pub credits_per_session: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub session_number: i64,
    pub session_date: String,
    pub time_start: String,
    pub time_end: String,
    pub topic: String,
    pub description: Option<String>,
}
