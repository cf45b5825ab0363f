//! Bi-annual certificate issuance.
//!
//! A registration is eligible for a period when its seminar credits inside
//! the period's window are positive. Per registration and period the state
//! moves pending -> generated -> sent; regenerating replaces the URL and
//! keeps `sent_at`.

use sqlx::SqliteConnection;
use std::future::Future;

use crate::config::CertificateConfig;
use crate::db::{
    BulkItemError, BulkReport, Certificate, CertificateCandidate, CertificateState, DbPool, User,
};
use crate::notifications::{CertificateEmail, CertificateMailer};

use super::ledger::registration_credits_in_period;
use super::makeup::fetch_registration;
use super::period::CertificatePeriod;
use super::{begin_write, SeminarError, SeminarResult};

async fn fetch_certificate(
    conn: &mut SqliteConnection,
    registration_id: &str,
    period: &CertificatePeriod,
) -> SeminarResult<Option<Certificate>> {
    let certificate = sqlx::query_as::<_, Certificate>(
        "SELECT * FROM seminar_certificates WHERE registration_id = ? AND period = ? AND period_year = ?",
    )
    .bind(registration_id)
    .bind(period.half.as_str())
    .bind(period.year)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(certificate)
}

/// Each generation gets a fresh document name so stale links are never reused
fn certificate_url(base_url: &str, registration_id: &str, period: &CertificatePeriod) -> String {
    let version = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}/{}-{}.pdf",
        base_url.trim_end_matches('/'),
        registration_id,
        period.slug(),
        &version[..12]
    )
}

#[derive(sqlx::FromRow)]
struct RegistrationContact {
    registration_id: String,
    user_id: String,
    user_name: String,
    user_email: String,
}

/// Eligible registrations of a seminar for one period, with their state
pub async fn candidates(
    db: &DbPool,
    seminar_id: &str,
    period: &CertificatePeriod,
) -> SeminarResult<Vec<CertificateCandidate>> {
    let mut conn = db.acquire().await?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM seminars WHERE id = ?")
        .bind(seminar_id)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_none() {
        return Err(SeminarError::NotFound("Seminar"));
    }

    let contacts = sqlx::query_as::<_, RegistrationContact>(
        r#"
        SELECT r.id AS registration_id, r.user_id, u.name AS user_name, u.email AS user_email
        FROM seminar_registrations r
        JOIN users u ON u.id = r.user_id
        WHERE r.seminar_id = ?
        ORDER BY u.name, r.id
        "#,
    )
    .bind(seminar_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut candidates = Vec::new();
    for contact in contacts {
        let credits = registration_credits_in_period(&mut conn, &contact.registration_id, period).await?;
        if credits <= 0.0 {
            continue;
        }
        let certificate = fetch_certificate(&mut conn, &contact.registration_id, period).await?;
        candidates.push(CertificateCandidate {
            registration_id: contact.registration_id,
            user_id: contact.user_id,
            user_name: contact.user_name,
            user_email: contact.user_email,
            credits_in_period: credits,
            state: CertificateState::of(certificate.as_ref()),
            certificate,
        });
    }

    Ok(candidates)
}

/// Create or regenerate the certificate for a registration and period
pub async fn generate(
    db: &DbPool,
    config: &CertificateConfig,
    registration_id: &str,
    period: CertificatePeriod,
) -> SeminarResult<Certificate> {
    let mut tx = begin_write(db).await?;

    let registration = fetch_registration(&mut tx, registration_id).await?;
    let credits = registration_credits_in_period(&mut tx, &registration.id, &period).await?;
    if credits <= 0.0 {
        return Err(SeminarError::NotEligible(format!(
            "No seminar credits were earned in {}",
            period.label()
        )));
    }

    let url = certificate_url(&config.base_url, &registration.id, &period);
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO seminar_certificates (id, registration_id, period, period_year, certificate_url, generated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (registration_id, period, period_year)
        DO UPDATE SET certificate_url = excluded.certificate_url, generated_at = excluded.generated_at
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&registration.id)
    .bind(period.half.as_str())
    .bind(period.year)
    .bind(&url)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let certificate = fetch_certificate(&mut tx, &registration.id, &period)
        .await?
        .ok_or(SeminarError::NotFound("Certificate"))?;
    tx.commit().await?;

    tracing::info!(
        registration_id = %registration.id,
        period = %period.slug(),
        credits,
        "Certificate generated"
    );

    Ok(certificate)
}

/// Email a generated certificate and stamp `sent_at` once delivery succeeds
pub async fn send(
    db: &DbPool,
    mailer: &dyn CertificateMailer,
    config: &CertificateConfig,
    registration_id: &str,
    period: CertificatePeriod,
) -> SeminarResult<Certificate> {
    let (certificate, user, credits) = {
        let mut conn = db.acquire().await?;
        let registration = fetch_registration(&mut conn, registration_id).await?;
        let certificate = fetch_certificate(&mut conn, &registration.id, &period)
            .await?
            .ok_or_else(|| {
                SeminarError::Conflict(format!(
                    "No certificate has been generated for {}",
                    period.label()
                ))
            })?;
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(&registration.user_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(SeminarError::NotFound("User"))?;
        let credits = registration_credits_in_period(&mut conn, &registration.id, &period).await?;
        (certificate, user, credits)
    };

    let email = CertificateEmail {
        to_email: user.email.clone(),
        to_name: user.name.clone(),
        period_label: period.label(),
        credits,
        certificate_url: certificate.certificate_url.clone(),
        issuer_name: config.issuer_name.clone(),
    };
    mailer
        .send_certificate(&email)
        .await
        .map_err(|e| SeminarError::Delivery(e.to_string()))?;

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query("UPDATE seminar_certificates SET sent_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&certificate.id)
        .execute(db)
        .await?;

    let certificate = sqlx::query_as::<_, Certificate>("SELECT * FROM seminar_certificates WHERE id = ?")
        .bind(&certificate.id)
        .fetch_one(db)
        .await?;

    tracing::info!(
        registration_id = %certificate.registration_id,
        period = %period.slug(),
        to = %user.email,
        "Certificate sent"
    );

    Ok(certificate)
}

/// Run one operation per registration in order. A failure is recorded and
/// the loop moves on; nothing is rolled back.
async fn run_bulk<F, Fut>(action: &str, registration_ids: &[String], mut op: F) -> BulkReport
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = SeminarResult<Certificate>>,
{
    let mut report = BulkReport::default();

    for registration_id in registration_ids {
        match op(registration_id.clone()).await {
            Ok(_) => report.succeeded += 1,
            Err(e) => {
                tracing::warn!(
                    action,
                    registration_id = %registration_id,
                    error = %e,
                    "Bulk certificate item failed"
                );
                report.failed += 1;
                report.errors.push(BulkItemError {
                    registration_id: registration_id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        action,
        succeeded = report.succeeded,
        failed = report.failed,
        "Bulk certificate run finished"
    );
    report
}

pub async fn bulk_generate(
    db: &DbPool,
    config: &CertificateConfig,
    registration_ids: &[String],
    period: CertificatePeriod,
) -> BulkReport {
    run_bulk("generate", registration_ids, |id| async move {
        generate(db, config, &id, period).await
    })
    .await
}

pub async fn bulk_send(
    db: &DbPool,
    mailer: &dyn CertificateMailer,
    config: &CertificateConfig,
    registration_ids: &[String],
    period: CertificatePeriod,
) -> BulkReport {
    run_bulk("send", registration_ids, |id| async move {
        send(db, mailer, config, &id, period).await
    })
    .await
}
