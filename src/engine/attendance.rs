//! Attendance check-in.
//!
//! Recording a session updates the registration's counters and appends the
//! session's CE credits to the ledger in the same transaction.

use serde::Serialize;

use crate::db::{
    Attendance, CreditEntry, CreditSource, DbPool, MakeupRequest, MakeupStatus, Registration,
    RegistrationStatus, Seminar, SeminarSession, TransactionType,
};

use super::ledger::{self, NewCreditEntry};
use super::makeup::fetch_registration;
use super::{begin_write, is_unique_violation, SeminarError, SeminarResult};

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceOutcome {
    pub attendance: Attendance,
    pub registration: Registration,
    pub credit: CreditEntry,
}

pub async fn record(
    db: &DbPool,
    registration_id: &str,
    session_id: &str,
) -> SeminarResult<AttendanceOutcome> {
    let mut tx = begin_write(db).await?;

    let registration = fetch_registration(&mut tx, registration_id).await?;
    if registration.status_enum() != Some(RegistrationStatus::Active) {
        return Err(SeminarError::Conflict(format!(
            "Attendance can only be recorded for active registrations (this one is {})",
            registration.status
        )));
    }

    let session = sqlx::query_as::<_, SeminarSession>("SELECT * FROM seminar_sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(SeminarError::NotFound("Session"))?;
    if session.seminar_id != registration.seminar_id {
        return Err(SeminarError::validation(
            "session_id",
            "The session belongs to a different seminar",
        ));
    }

    // Attending the session an approved makeup pointed at fulfils that makeup
    let makeup: Option<MakeupRequest> = sqlx::query_as(
        "SELECT * FROM makeup_requests WHERE registration_id = ? AND status = ? AND requested_session_id = ?",
    )
    .bind(&registration.id)
    .bind(MakeupStatus::Approved.as_str())
    .bind(&session.id)
    .fetch_optional(&mut *tx)
    .await?;

    let attendance_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let inserted = sqlx::query(
        r#"
        INSERT INTO seminar_attendance (id, registration_id, session_id, makeup_request_id, checked_in_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&attendance_id)
    .bind(&registration.id)
    .bind(&session.id)
    .bind(makeup.as_ref().map(|m| m.id.as_str()))
    .bind(&now)
    .execute(&mut *tx)
    .await;
    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return Err(SeminarError::Conflict(format!(
                "Attendance for session {} is already recorded",
                session.session_number
            )));
        }
        return Err(e.into());
    }

    let seminar = sqlx::query_as::<_, Seminar>("SELECT * FROM seminars WHERE id = ?")
        .bind(&registration.seminar_id)
        .fetch_one(&mut *tx)
        .await?;
    let total_sessions = seminar.total_sessions;
    let (attended,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM seminar_attendance WHERE registration_id = ?")
            .bind(&registration.id)
            .fetch_one(&mut *tx)
            .await?;

    let completed = attended.min(total_sessions);
    let remaining = total_sessions - completed;
    let status = if remaining == 0 {
        RegistrationStatus::Completed
    } else {
        RegistrationStatus::Active
    };

    sqlx::query(
        r#"
        UPDATE seminar_registrations
        SET sessions_completed = ?, sessions_remaining = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(completed)
    .bind(remaining)
    .bind(status.as_str())
    .bind(&now)
    .bind(&registration.id)
    .execute(&mut *tx)
    .await?;

    let credit = ledger::append(
        &mut tx,
        &NewCreditEntry {
            user_id: registration.user_id.clone(),
            registration_id: Some(registration.id.clone()),
            session_id: Some(session.id.clone()),
            credits: seminar.credits_per_session,
            source: CreditSource::SeminarSession,
            transaction_type: TransactionType::Earned,
            event_title: session.topic.clone(),
            event_date: session.session_date.clone(),
            notes: makeup
                .as_ref()
                .map(|m| format!("Makeup for missed session {}", m.missed_session_id)),
        },
    )
    .await?;

    let attendance = sqlx::query_as::<_, Attendance>("SELECT * FROM seminar_attendance WHERE id = ?")
        .bind(&attendance_id)
        .fetch_one(&mut *tx)
        .await?;
    let registration = fetch_registration(&mut tx, &registration.id).await?;

    tx.commit().await?;

    tracing::info!(
        registration_id = %registration.id,
        session_id = %session.id,
        session_number = session.session_number,
        sessions_completed = registration.sessions_completed,
        makeup = makeup.is_some(),
        "Attendance recorded"
    );

    Ok(AttendanceOutcome {
        attendance,
        registration,
        credit,
    })
}
