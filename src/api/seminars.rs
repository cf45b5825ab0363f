//! Seminar catalog endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, resource_types, AuditEvent, Capability, CreateSeminarRequest, CreateSessionRequest,
    Seminar, SeminarSession,
};
use crate::engine::is_unique_violation;
use crate::AppState;

use super::audit::{audit_log, ClientIp};
use super::auth::Principal;
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::validation::{
    validate_credits_per_session, validate_date, validate_program_year, validate_session_number,
    validate_time_range, validate_title, validate_total_sessions,
};
use super::{ok, ApiResponse};

/// GET /api/admin/seminars
pub async fn list_seminars(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<Vec<Seminar>>>, ApiError> {
    principal.require(Capability::ManageSeminars)?;

    let seminars = sqlx::query_as::<_, Seminar>(
        "SELECT * FROM seminars ORDER BY program_year DESC, title ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(ok(seminars))
}

/// POST /api/admin/seminars
pub async fn create_seminar(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CreateSeminarRequest>,
) -> Result<Json<ApiResponse<Seminar>>, ApiError> {
    principal.require(Capability::ManageSeminars)?;

    let total_sessions = req
        .total_sessions
        .unwrap_or(state.config.seminars.total_sessions);
    let credits_per_session = req
        .credits_per_session
        .unwrap_or(state.config.seminars.credits_per_session);

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("title", validate_title(&req.title, "Title"))
        .check("program_year", validate_program_year(req.program_year))
        .check("total_sessions", validate_total_sessions(total_sessions))
        .check(
            "credits_per_session",
            validate_credits_per_session(credits_per_session),
        );
    errors.finish()?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO seminars (id, title, program_year, total_sessions, credits_per_session, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(req.title.trim())
    .bind(req.program_year)
    .bind(total_sessions)
    .bind(credits_per_session)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let seminar = sqlx::query_as::<_, Seminar>("SELECT * FROM seminars WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(seminar_id = %seminar.id, title = %seminar.title, "Seminar created");

    audit_log(
        &state,
        AuditEvent {
            action: actions::SEMINAR_CREATE,
            resource_type: resource_types::SEMINAR,
            resource_id: Some(&seminar.id),
            resource_name: Some(&seminar.title),
            user_id: Some(&principal.user_id),
            ip_address: ip.as_deref(),
            ..Default::default()
        },
    )
    .await;

    Ok(ok(seminar))
}

/// GET /api/seminars/:id/sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(seminar_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<SeminarSession>>>, ApiError> {
    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM seminars WHERE id = ?")
        .bind(&seminar_id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Seminar not found"));
    }

    let sessions = sqlx::query_as::<_, SeminarSession>(
        "SELECT * FROM seminar_sessions WHERE seminar_id = ? ORDER BY session_number",
    )
    .bind(&seminar_id)
    .fetch_all(&state.db)
    .await?;

    Ok(ok(sessions))
}

/// POST /api/admin/seminars/:id/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Path(seminar_id): Path<String>,
    ApiJson(req): ApiJson<CreateSessionRequest>,
) -> Result<Json<ApiResponse<SeminarSession>>, ApiError> {
    principal.require(Capability::ManageSeminars)?;

    let seminar = sqlx::query_as::<_, Seminar>("SELECT * FROM seminars WHERE id = ?")
        .bind(&seminar_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Seminar not found"))?;

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check(
            "session_number",
            validate_session_number(req.session_number, seminar.total_sessions),
        )
        .check("session_date", validate_date(&req.session_date))
        .check("time_end", validate_time_range(&req.time_start, &req.time_end))
        .check("topic", validate_title(&req.topic, "Topic"));
    errors.finish()?;

    let id = uuid::Uuid::new_v4().to_string();
    let description = req
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let inserted = sqlx::query(
        r#"
        INSERT INTO seminar_sessions (id, seminar_id, session_number, session_date, time_start, time_end, topic, description)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&seminar.id)
    .bind(req.session_number)
    .bind(&req.session_date)
    .bind(&req.time_start)
    .bind(&req.time_end)
    .bind(req.topic.trim())
    .bind(description)
    .execute(&state.db)
    .await;

    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return Err(ApiError::conflict(format!(
                "Session {} already exists for this seminar",
                req.session_number
            )));
        }
        return Err(e.into());
    }

    let session = sqlx::query_as::<_, SeminarSession>("SELECT * FROM seminar_sessions WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    audit_log(
        &state,
        AuditEvent {
            action: actions::SESSION_CREATE,
            resource_type: resource_types::SESSION,
            resource_id: Some(&session.id),
            resource_name: Some(&session.topic),
            user_id: Some(&principal.user_id),
            ip_address: ip.as_deref(),
            details: Some(serde_json::json!({
                "seminar_id": seminar.id,
                "session_number": session.session_number,
                "session_date": session.session_date,
            })),
        },
    )
    .await;

    Ok(ok(session))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::*;
    use crate::engine::fixtures;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_seminar_and_sessions() {
        let app = app().await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/admin/seminars",
            Some(ADMIN_TOKEN),
            Some(json!({ "title": "Advanced Endodontics", "program_year": 2025 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_sessions"], 10);
        let seminar_id = body["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/admin/seminars/{}/sessions", seminar_id);
        let session = json!({
            "session_number": 1,
            "session_date": "2025-02-08",
            "time_start": "09:00",
            "time_end": "16:30",
            "topic": "Access cavity design",
        });
        let (status, body) = call(&app, "POST", &uri, Some(ADMIN_TOKEN), Some(session.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["session_number"], 1);

        let (status, _) = call(&app, "POST", &uri, Some(ADMIN_TOKEN), Some(session)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Any authenticated caller can read the schedule
        fixtures::user(&app.db, "m1", "member").await;
        let member = token_for(&app.db, "m1").await;
        let uri = format!("/api/seminars/{}/sessions", seminar_id);
        let (status, body) = call(&app, "GET", &uri, Some(&member), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["topic"], "Access cavity design");
    }

    #[tokio::test]
    async fn test_attendance_awards_the_seminars_own_credits() {
        let app = app().await;
        fixtures::user(&app.db, "m1", "member").await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/admin/seminars",
            Some(ADMIN_TOKEN),
            Some(json!({
                "title": "Periodontal Surgery",
                "program_year": 2025,
                "total_sessions": 4,
                "credits_per_session": 3.0,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["credits_per_session"], 3.0);
        let seminar_id = body["data"]["id"].as_str().unwrap().to_string();

        fixtures::session(&app.db, "s1", &seminar_id, 1, "2025-02-08").await;
        fixtures::registration(&app.db, "r1", "m1", &seminar_id, 4).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/admin/seminar-registrations/r1/attendance",
            Some(ADMIN_TOKEN),
            Some(json!({ "session_id": "s1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["credit"]["credits"], 3.0);

        let (status, body) = call(
            &app,
            "POST",
            "/api/admin/seminars",
            Some(ADMIN_TOKEN),
            Some(json!({ "title": "Zero", "program_year": 2025, "credits_per_session": 0.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"]["credits_per_session"].is_array());
    }

    #[tokio::test]
    async fn test_session_validation_collects_fields() {
        let app = app().await;
        fixtures::seminar(&app.db, "sem", 10).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/admin/seminars/sem/sessions",
            Some(ADMIN_TOKEN),
            Some(json!({
                "session_number": 11,
                "session_date": "2025-13-01",
                "time_start": "10:00",
                "time_end": "09:00",
                "topic": "",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let details = body["details"].as_object().unwrap();
        for field in ["session_number", "session_date", "time_end", "topic"] {
            assert!(details.contains_key(field), "missing {}", field);
        }
    }

    #[tokio::test]
    async fn test_staff_manage_catalog_members_do_not() {
        let app = app().await;
        fixtures::user(&app.db, "m1", "member").await;
        let member = token_for(&app.db, "m1").await;

        let (status, _) = call(
            &app,
            "POST",
            "/api/admin/seminars",
            Some(&member),
            Some(json!({ "title": "Perio", "program_year": 2025 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
