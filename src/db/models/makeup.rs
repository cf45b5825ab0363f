//! Makeup session requests.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MakeupStatus {
    Pending,
    Approved,
    Denied,
}

impl MakeupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }

    /// Pending and approved requests block a new submission
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl std::fmt::Display for MakeupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MakeupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            _ => Err(format!("Unknown makeup request status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MakeupRequest {
    pub id: String,
    pub registration_id: String,
    pub missed_session_id: String,
    pub requested_session_id: Option<String>,
    pub reason: Option<String>,
    pub status: String,
    pub denial_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

impl MakeupRequest {
    pub fn status_enum(&self) -> Option<MakeupStatus> {
        self.status.parse().ok()
    }

    pub fn is_open(&self) -> bool {
        self.status_enum().map(|s| s.is_open()).unwrap_or(false)
    }
}

/// Body of `POST /api/seminars/makeup-request`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMakeupRequest {
    pub registration_id: String,
    #[serde(default)]
    pub missed_session_id: Option<String>,
    pub requested_session_id: Option<String>,
    pub reason: Option<String>,
    /// Accepted for compatibility; the caller's identity comes from the token
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MakeupRequestQuery {
    pub registration_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct MakeupReviewQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DenyMakeupRequest {
    pub denial_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MakeupRequestCreated {
    pub request_id: String,
}
