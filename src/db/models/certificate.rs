//! Bi-annual seminar certificates.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Certificate {
    pub id: String,
    pub registration_id: String,
    pub period: String,
    pub period_year: i64,
    pub certificate_url: String,
    pub generated_at: String,
    pub sent_at: Option<String>,
}

/// Where a registration stands for one certificate period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateState {
    /// Eligible, nothing generated yet
    Pending,
    Generated,
    Sent,
}

impl CertificateState {
    pub fn of(certificate: Option<&Certificate>) -> Self {
        match certificate {
            None => Self::Pending,
            Some(c) if c.sent_at.is_some() => Self::Sent,
            Some(_) => Self::Generated,
        }
    }
}

/// Body of the generate/send endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateActionRequest {
    pub registration_id: String,
    pub period: String,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkCertificateRequest {
    pub registration_ids: Vec<String>,
    pub period: String,
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CertificateListQuery {
    pub seminar_id: String,
    pub period: String,
    pub year: Option<i32>,
}

/// One row of the admin certificate table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateCandidate {
    pub registration_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub credits_in_period: f64,
    pub state: CertificateState,
    pub certificate: Option<Certificate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemError {
    pub registration_id: String,
    pub error: String,
}

/// Outcome of a bulk generate/send run. Items are independent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BulkItemError>,
}
