//! Seminar registrations and attendance.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Active,
    Completed,
    OnHold,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::OnHold => "on_hold",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "on_hold" => Ok(Self::OnHold),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown registration status: {}", s)),
        }
    }
}

/// A user's enrollment in a seminar program.
///
/// `sessions_completed + sessions_remaining` always equals the seminar's
/// `total_sessions`; both counters are rewritten together from the
/// attendance count.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: String,
    pub user_id: String,
    pub seminar_id: String,
    pub status: String,
    pub sessions_completed: i64,
    pub sessions_remaining: i64,
    pub makeup_used: bool,
    pub qr_code: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Registration {
    pub fn status_enum(&self) -> Option<RegistrationStatus> {
        self.status.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attendance {
    pub id: String,
    pub registration_id: String,
    pub session_id: String,
    /// Set when the session was attended as an approved makeup
    pub makeup_request_id: Option<String>,
    pub checked_in_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRegistrationRequest {
    pub user_id: String,
    pub seminar_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRegistrationRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordAttendanceRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RegistrationQuery {
    pub seminar_id: Option<String>,
    pub status: Option<String>,
}
