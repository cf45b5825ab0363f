//! CE credit ledger entries.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditSource {
    CourseAttendance,
    SeminarSession,
    Manual,
}

impl CreditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CourseAttendance => "course_attendance",
            Self::SeminarSession => "seminar_session",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for CreditSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course_attendance" => Ok(Self::CourseAttendance),
            "seminar_session" => Ok(Self::SeminarSession),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown credit source: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Earned,
    Revoked,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earned => "earned",
            Self::Revoked => "revoked",
            Self::Adjustment => "adjustment",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned" => Ok(Self::Earned),
            "revoked" => Ok(Self::Revoked),
            "adjustment" => Ok(Self::Adjustment),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

/// One append-only ledger row.
///
/// `credits` is a positive magnitude for earned and revoked entries; only
/// adjustments carry their own sign.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditEntry {
    pub id: String,
    pub user_id: String,
    pub registration_id: Option<String>,
    pub session_id: Option<String>,
    pub credits: f64,
    pub source: String,
    pub transaction_type: String,
    pub event_title: String,
    pub event_date: String,
    pub notes: Option<String>,
    pub awarded_at: String,
}

/// Ledger row as returned to clients, with the sign already applied
#[derive(Debug, Clone, Serialize)]
pub struct CreditEntryResponse {
    #[serde(flatten)]
    pub entry: CreditEntry,
    pub signed_credits: f64,
}

/// Body of `GET /api/user/credits`
#[derive(Debug, Serialize)]
pub struct UserCreditsResponse {
    #[serde(rename = "totalCredits")]
    pub total_credits: f64,
    pub ledger: Vec<CreditEntryResponse>,
}

#[derive(Debug, Deserialize)]
pub struct CreditsQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCreditEntryRequest {
    pub user_id: String,
    pub credits: f64,
    pub source: Option<String>,
    pub transaction_type: String,
    pub event_title: String,
    pub event_date: String,
    pub notes: Option<String>,
    pub registration_id: Option<String>,
}
