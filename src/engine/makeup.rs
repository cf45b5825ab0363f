//! Makeup request workflow: submission by the participant, review by staff.

use chrono::NaiveDate;
use sqlx::SqliteConnection;
use std::collections::HashSet;

use crate::db::{CreateMakeupRequest, DbPool, MakeupRequest, MakeupStatus, Registration, SeminarSession};

use super::eligibility::{self, MakeupEligibility};
use super::{begin_write, is_unique_violation, SeminarError, SeminarResult};

pub(crate) async fn fetch_registration(
    conn: &mut SqliteConnection,
    registration_id: &str,
) -> SeminarResult<Registration> {
    sqlx::query_as::<_, Registration>("SELECT * FROM seminar_registrations WHERE id = ?")
        .bind(registration_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(SeminarError::NotFound("Registration"))
}

pub(crate) async fn seminar_sessions(
    conn: &mut SqliteConnection,
    seminar_id: &str,
) -> SeminarResult<Vec<SeminarSession>> {
    let sessions = sqlx::query_as::<_, SeminarSession>(
        "SELECT * FROM seminar_sessions WHERE seminar_id = ? ORDER BY session_number",
    )
    .bind(seminar_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(sessions)
}

pub(crate) async fn attended_session_ids(
    conn: &mut SqliteConnection,
    registration_id: &str,
) -> SeminarResult<HashSet<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT session_id FROM seminar_attendance WHERE registration_id = ?")
            .bind(registration_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn requests_for(
    conn: &mut SqliteConnection,
    registration_id: &str,
) -> SeminarResult<Vec<MakeupRequest>> {
    let requests = sqlx::query_as::<_, MakeupRequest>(
        "SELECT * FROM makeup_requests WHERE registration_id = ? ORDER BY created_at DESC",
    )
    .bind(registration_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(requests)
}

async fn fetch_request(conn: &mut SqliteConnection, request_id: &str) -> SeminarResult<MakeupRequest> {
    sqlx::query_as::<_, MakeupRequest>("SELECT * FROM makeup_requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(SeminarError::NotFound("Makeup request"))
}

async fn assess_on(
    conn: &mut SqliteConnection,
    registration: &Registration,
    today: NaiveDate,
) -> SeminarResult<MakeupEligibility> {
    let sessions = seminar_sessions(conn, &registration.seminar_id).await?;
    let attended = attended_session_ids(conn, &registration.id).await?;
    let requests = requests_for(conn, &registration.id).await?;

    Ok(eligibility::assess(
        &sessions,
        &attended,
        registration.makeup_used,
        &requests,
        today,
    ))
}

/// Current makeup situation of a registration
pub async fn eligibility_for(
    db: &DbPool,
    registration_id: &str,
    today: NaiveDate,
) -> SeminarResult<(Registration, MakeupEligibility)> {
    let mut conn = db.acquire().await?;
    let registration = fetch_registration(&mut conn, registration_id).await?;
    let eligibility = assess_on(&mut conn, &registration, today).await?;
    Ok((registration, eligibility))
}

pub async fn list_for_registration(
    db: &DbPool,
    registration_id: &str,
) -> SeminarResult<Vec<MakeupRequest>> {
    let mut conn = db.acquire().await?;
    requests_for(&mut conn, registration_id).await
}

pub async fn list_for_review(db: &DbPool, status: Option<MakeupStatus>) -> SeminarResult<Vec<MakeupRequest>> {
    let requests = match status {
        Some(status) => {
            sqlx::query_as::<_, MakeupRequest>(
                "SELECT * FROM makeup_requests WHERE status = ? ORDER BY created_at ASC",
            )
            .bind(status.as_str())
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, MakeupRequest>("SELECT * FROM makeup_requests ORDER BY created_at DESC")
                .fetch_all(db)
                .await?
        }
    };
    Ok(requests)
}

/// Create a pending makeup request.
///
/// The eligibility rules are re-evaluated inside the inserting transaction;
/// the partial unique index on open requests rejects whichever of two racing
/// submissions commits second.
pub async fn submit(
    db: &DbPool,
    req: &CreateMakeupRequest,
    today: NaiveDate,
) -> SeminarResult<MakeupRequest> {
    eligibility::require_missed_session(req)?;

    let mut tx = begin_write(db).await?;

    let registration = fetch_registration(&mut tx, &req.registration_id).await?;
    let eligibility = assess_on(&mut tx, &registration, today).await?;
    let submission = eligibility::validate_submission(&eligibility, req)?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let inserted = sqlx::query(
        r#"
        INSERT INTO makeup_requests (id, registration_id, missed_session_id, requested_session_id, reason, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&registration.id)
    .bind(&submission.missed_session_id)
    .bind(&submission.requested_session_id)
    .bind(&submission.reason)
    .bind(MakeupStatus::Pending.as_str())
    .bind(&now)
    .execute(&mut *tx)
    .await;

    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return Err(SeminarError::Conflict(
                "A makeup request for this registration is already in progress".to_string(),
            ));
        }
        return Err(e.into());
    }

    let request = fetch_request(&mut tx, &id).await?;
    tx.commit().await?;

    tracing::info!(
        request_id = %request.id,
        registration_id = %request.registration_id,
        missed_session_id = %request.missed_session_id,
        requested_session_id = ?request.requested_session_id,
        "Makeup request submitted"
    );

    Ok(request)
}

/// Approve a pending request and consume the registration's makeup
pub async fn approve(db: &DbPool, request_id: &str, reviewer_id: &str) -> SeminarResult<MakeupRequest> {
    let mut tx = begin_write(db).await?;

    let request = fetch_request(&mut tx, request_id).await?;
    ensure_pending(&request)?;

    let registration = fetch_registration(&mut tx, &request.registration_id).await?;
    if registration.makeup_used {
        return Err(SeminarError::Conflict(
            "The makeup session for this registration has already been used".to_string(),
        ));
    }

    let now = chrono::Utc::now().to_rfc3339();

    let updated = sqlx::query(
        r#"
        UPDATE makeup_requests SET status = ?, reviewed_by = ?, reviewed_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(MakeupStatus::Approved.as_str())
    .bind(reviewer_id)
    .bind(&now)
    .bind(request_id)
    .bind(MakeupStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() != 1 {
        return Err(SeminarError::Conflict(
            "Makeup request was reviewed concurrently".to_string(),
        ));
    }

    let flagged = sqlx::query(
        "UPDATE seminar_registrations SET makeup_used = 1, updated_at = ? WHERE id = ? AND makeup_used = 0",
    )
    .bind(&now)
    .bind(&registration.id)
    .execute(&mut *tx)
    .await?;
    if flagged.rows_affected() != 1 {
        return Err(SeminarError::Conflict(
            "The makeup session for this registration has already been used".to_string(),
        ));
    }

    let request = fetch_request(&mut tx, request_id).await?;
    tx.commit().await?;

    tracing::info!(
        request_id = %request.id,
        registration_id = %request.registration_id,
        reviewer_id = %reviewer_id,
        "Makeup request approved"
    );

    Ok(request)
}

pub async fn deny(
    db: &DbPool,
    request_id: &str,
    reviewer_id: &str,
    denial_reason: Option<&str>,
) -> SeminarResult<MakeupRequest> {
    let denial_reason = denial_reason.map(str::trim).filter(|r| !r.is_empty());

    let mut tx = begin_write(db).await?;

    let request = fetch_request(&mut tx, request_id).await?;
    ensure_pending(&request)?;

    let now = chrono::Utc::now().to_rfc3339();
    let updated = sqlx::query(
        r#"
        UPDATE makeup_requests SET status = ?, denial_reason = ?, reviewed_by = ?, reviewed_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(MakeupStatus::Denied.as_str())
    .bind(denial_reason)
    .bind(reviewer_id)
    .bind(&now)
    .bind(request_id)
    .bind(MakeupStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() != 1 {
        return Err(SeminarError::Conflict(
            "Makeup request was reviewed concurrently".to_string(),
        ));
    }

    let request = fetch_request(&mut tx, request_id).await?;
    tx.commit().await?;

    tracing::info!(
        request_id = %request.id,
        registration_id = %request.registration_id,
        reviewer_id = %reviewer_id,
        "Makeup request denied"
    );

    Ok(request)
}

fn ensure_pending(request: &MakeupRequest) -> SeminarResult<()> {
    if request.status_enum() != Some(MakeupStatus::Pending) {
        return Err(SeminarError::Conflict(format!(
            "Makeup request is already {}",
            request.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::eligibility::MakeupState;
    use crate::engine::fixtures;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn setup() -> DbPool {
        let db = crate::db::init_in_memory().await.unwrap();
        seed(&db).await;
        db
    }

    async fn seed(db: &DbPool) {
        fixtures::user(db, "u1", "member").await;
        fixtures::seminar(db, "sem", 3).await;
        fixtures::session(db, "s1", "sem", 1, "2025-01-10").await;
        fixtures::session(db, "s2", "sem", 2, "2025-02-10").await;
        fixtures::session(db, "s3", "sem", 3, "2025-06-10").await;
        fixtures::registration(db, "reg", "u1", "sem", 3).await;
        fixtures::attend(db, "reg", "s1").await;
    }

    fn submission(missed: Option<&str>, requested: Option<&str>) -> CreateMakeupRequest {
        CreateMakeupRequest {
            registration_id: "reg".to_string(),
            missed_session_id: missed.map(String::from),
            requested_session_id: requested.map(String::from),
            reason: None,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn test_submit_creates_pending_request() {
        let db = setup().await;
        let today = date("2025-03-01");

        let (_, before) = eligibility_for(&db, "reg", today).await.unwrap();
        assert!(matches!(before.state, MakeupState::Eligible));
        assert_eq!(before.missed_sessions.len(), 1);
        assert_eq!(before.missed_sessions[0].id, "s2");

        let request = submit(&db, &submission(Some("s2"), Some("s3")), today)
            .await
            .unwrap();
        assert_eq!(request.status, "pending");
        assert_eq!(request.requested_session_id.as_deref(), Some("s3"));
        assert!(request.denial_reason.is_none());

        let (_, after) = eligibility_for(&db, "reg", today).await.unwrap();
        match after.state {
            MakeupState::RequestInFlight { request: open } => assert_eq!(open.id, request.id),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_submission_conflicts() {
        let db = setup().await;
        let today = date("2025-03-01");

        submit(&db, &submission(Some("s2"), None), today).await.unwrap();
        let err = submit(&db, &submission(Some("s2"), None), today).await.unwrap_err();
        assert!(matches!(err, SeminarError::Conflict(_)));
        assert_eq!(list_for_registration(&db, "reg").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_rejects_second_open_request() {
        let db = setup().await;
        for id in ["a", "b"] {
            let result = sqlx::query(
                "INSERT INTO makeup_requests (id, registration_id, missed_session_id) VALUES (?, 'reg', 's2')",
            )
            .bind(id)
            .execute(&db)
            .await;
            if id == "b" {
                assert!(is_unique_violation(&result.unwrap_err()));
            } else {
                result.unwrap();
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_resolve_to_one_winner() {
        let dir = std::env::temp_dir().join(format!("cetrack-{}", uuid::Uuid::new_v4()));
        let db = crate::db::init(&dir).await.unwrap();
        seed(&db).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let req = submission(Some("s2"), None);
                tokio::spawn(async move { submit(&db, &req, date("2025-03-01")).await })
            })
            .collect();

        let (mut accepted, mut conflicts) = (0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(SeminarError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!((accepted, conflicts), (1, 7));
        assert_eq!(list_for_registration(&db, "reg").await.unwrap().len(), 1);

        db.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_missing_session_rejected_before_lookup() {
        let db = setup().await;
        let mut req = submission(None, None);
        req.registration_id = "does-not-exist".to_string();

        let err = submit(&db, &req, date("2025-03-01")).await.unwrap_err();
        assert!(matches!(
            err,
            SeminarError::Validation { field: "missed_session_id", .. }
        ));
    }

    #[tokio::test]
    async fn test_approve_consumes_makeup() {
        let db = setup().await;
        let today = date("2025-03-01");
        let request = submit(&db, &submission(Some("s2"), Some("s3")), today)
            .await
            .unwrap();

        let approved = approve(&db, &request.id, "staff-1").await.unwrap();
        assert_eq!(approved.status, "approved");
        assert_eq!(approved.reviewed_by.as_deref(), Some("staff-1"));

        let (registration, e) = eligibility_for(&db, "reg", today).await.unwrap();
        assert!(registration.makeup_used);
        assert!(matches!(e.state, MakeupState::AlreadyUsed));

        let err = approve(&db, &request.id, "staff-1").await.unwrap_err();
        assert!(matches!(err, SeminarError::Conflict(_)));
        let err = submit(&db, &submission(Some("s2"), None), today).await.unwrap_err();
        assert!(matches!(err, SeminarError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_deny_reopens_submission() {
        let db = setup().await;
        let today = date("2025-03-01");
        let request = submit(&db, &submission(Some("s2"), None), today).await.unwrap();

        let denied = deny(&db, &request.id, "staff-1", Some("  No seats left ")).await.unwrap();
        assert_eq!(denied.status, "denied");
        assert_eq!(denied.denial_reason.as_deref(), Some("No seats left"));

        let (registration, e) = eligibility_for(&db, "reg", today).await.unwrap();
        assert!(!registration.makeup_used);
        assert!(matches!(e.state, MakeupState::Eligible));

        assert!(deny(&db, &request.id, "staff-1", None).await.is_err());
        submit(&db, &submission(Some("s2"), None), today).await.unwrap();
    }

    #[tokio::test]
    async fn test_review_queue_filter() {
        let db = setup().await;
        let today = date("2025-03-01");
        let request = submit(&db, &submission(Some("s2"), None), today).await.unwrap();

        let pending = list_for_review(&db, Some(MakeupStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        deny(&db, &request.id, "staff-1", None).await.unwrap();
        assert!(list_for_review(&db, Some(MakeupStatus::Pending)).await.unwrap().is_empty());
        assert_eq!(list_for_review(&db, None).await.unwrap().len(), 1);
    }
}
