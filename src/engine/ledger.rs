//! CE credit ledger.
//!
//! Earned and revoked rows store a positive magnitude and take their sign
//! from the transaction type; adjustments store a signed value. Every total
//! in the service goes through [`signed_credits`].

use chrono::NaiveDate;
use sqlx::SqliteConnection;

use crate::db::{
    CreditEntry, CreditEntryResponse, CreditSource, DbPool, TransactionType, UserCreditsResponse,
    DATE_FORMAT,
};

use super::period::CertificatePeriod;
use super::{SeminarError, SeminarResult};

/// Signed contribution of one entry to a total
pub fn signed_credits(entry: &CreditEntry) -> f64 {
    match entry.transaction_type.parse::<TransactionType>() {
        Ok(TransactionType::Earned) => entry.credits,
        Ok(TransactionType::Revoked) => -entry.credits,
        Ok(TransactionType::Adjustment) => entry.credits,
        Err(_) => {
            tracing::warn!(
                entry_id = %entry.id,
                transaction_type = %entry.transaction_type,
                "Ignoring ledger entry with unknown transaction type"
            );
            0.0
        }
    }
}

/// Round to hundredths so float noise never reaches a certificate
pub fn round_credits(value: f64) -> f64 {
    // Adding 0.0 folds -0.0 (the sum of nothing) into 0.0
    (value * 100.0).round() / 100.0 + 0.0
}

pub fn total<'a>(entries: impl IntoIterator<Item = &'a CreditEntry>) -> f64 {
    round_credits(entries.into_iter().map(signed_credits).sum())
}

/// A ledger row about to be appended
#[derive(Debug, Clone)]
pub struct NewCreditEntry {
    pub user_id: String,
    pub registration_id: Option<String>,
    pub session_id: Option<String>,
    pub credits: f64,
    pub source: CreditSource,
    pub transaction_type: TransactionType,
    pub event_title: String,
    pub event_date: String,
    pub notes: Option<String>,
}

impl NewCreditEntry {
    pub fn validate(&self) -> SeminarResult<()> {
        if !self.credits.is_finite() {
            return Err(SeminarError::validation("credits", "Credits must be a number"));
        }
        match self.transaction_type {
            TransactionType::Earned | TransactionType::Revoked if self.credits <= 0.0 => {
                return Err(SeminarError::validation(
                    "credits",
                    "Earned and revoked credits must be a positive amount",
                ));
            }
            TransactionType::Adjustment if self.credits == 0.0 => {
                return Err(SeminarError::validation(
                    "credits",
                    "An adjustment must change the balance",
                ));
            }
            _ => {}
        }
        if self.event_title.trim().is_empty() {
            return Err(SeminarError::validation("event_title", "Event title is required"));
        }
        if NaiveDate::parse_from_str(&self.event_date, DATE_FORMAT).is_err() {
            return Err(SeminarError::validation(
                "event_date",
                "Event date must be formatted as YYYY-MM-DD",
            ));
        }
        Ok(())
    }
}

/// Append an entry on an open connection or transaction
pub async fn append(conn: &mut SqliteConnection, new: &NewCreditEntry) -> SeminarResult<CreditEntry> {
    new.validate()?;

    if let Some(registration_id) = new.registration_id.as_deref() {
        let owner: Option<(String,)> =
            sqlx::query_as("SELECT user_id FROM seminar_registrations WHERE id = ?")
                .bind(registration_id)
                .fetch_optional(&mut *conn)
                .await?;
        match owner {
            None => return Err(SeminarError::NotFound("Registration")),
            Some((owner,)) if owner != new.user_id => {
                return Err(SeminarError::validation(
                    "registration_id",
                    "Registration belongs to a different user",
                ));
            }
            Some(_) => {}
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO ce_credit_ledger
            (id, user_id, registration_id, session_id, credits, source, transaction_type, event_title, event_date, notes, awarded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.user_id)
    .bind(&new.registration_id)
    .bind(&new.session_id)
    .bind(new.credits)
    .bind(new.source.as_str())
    .bind(new.transaction_type.as_str())
    .bind(new.event_title.trim())
    .bind(&new.event_date)
    .bind(&new.notes)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    let entry = sqlx::query_as::<_, CreditEntry>("SELECT * FROM ce_credit_ledger WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *conn)
        .await?;

    tracing::info!(
        user_id = %entry.user_id,
        credits = entry.credits,
        transaction_type = %entry.transaction_type,
        source = %entry.source,
        "Ledger entry appended"
    );

    Ok(entry)
}

/// Full history and total for one user, oldest event first
pub async fn user_credits(db: &DbPool, user_id: &str) -> SeminarResult<UserCreditsResponse> {
    let entries = sqlx::query_as::<_, CreditEntry>(
        "SELECT * FROM ce_credit_ledger WHERE user_id = ? ORDER BY event_date ASC, awarded_at ASC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let total_credits = total(&entries);
    let ledger = entries
        .into_iter()
        .map(|entry| CreditEntryResponse {
            signed_credits: signed_credits(&entry),
            entry,
        })
        .collect();

    Ok(UserCreditsResponse {
        total_credits,
        ledger,
    })
}

/// Seminar credits a registration earned inside a certificate period
pub async fn registration_credits_in_period(
    conn: &mut SqliteConnection,
    registration_id: &str,
    period: &CertificatePeriod,
) -> SeminarResult<f64> {
    let entries = sqlx::query_as::<_, CreditEntry>(
        r#"
        SELECT l.* FROM ce_credit_ledger l
        JOIN seminar_registrations r ON r.id = l.registration_id AND r.user_id = l.user_id
        WHERE l.registration_id = ? AND l.source = ? AND l.event_date >= ? AND l.event_date <= ?
        "#,
    )
    .bind(registration_id)
    .bind(CreditSource::SeminarSession.as_str())
    .bind(period.start().format(DATE_FORMAT).to_string())
    .bind(period.end().format(DATE_FORMAT).to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(total(&entries))
}
