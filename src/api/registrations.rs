//! Registration management and attendance check-in.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, resource_types, AuditEvent, Capability, CreateRegistrationRequest, DbPool,
    RecordAttendanceRequest, Registration, RegistrationQuery, RegistrationStatus, Seminar,
    UpdateRegistrationRequest,
};
use crate::engine::attendance::{self, AttendanceOutcome};
use crate::engine::is_unique_violation;
use crate::AppState;

use super::audit::{audit_log, ClientIp};
use super::auth::Principal;
use super::error::{ApiError, ApiJson, ApiQuery};
use super::metrics::count_attendance;
use super::{ok, ApiResponse};

pub(super) async fn load_registration(db: &DbPool, id: &str) -> Result<Registration, ApiError> {
    sqlx::query_as::<_, Registration>("SELECT * FROM seminar_registrations WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Registration not found"))
}

fn parse_status(value: &str) -> Result<RegistrationStatus, ApiError> {
    value
        .parse()
        .map_err(|e: String| ApiError::validation_field("status", e))
}

/// GET /api/admin/seminar-registrations?seminar_id=&status=
pub async fn list_registrations(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiQuery(query): ApiQuery<RegistrationQuery>,
) -> Result<Json<ApiResponse<Vec<Registration>>>, ApiError> {
    principal.require(Capability::ManageRegistrations)?;

    let status = query.status.as_deref().map(parse_status).transpose()?;

    let registrations = sqlx::query_as::<_, Registration>(
        r#"
        SELECT * FROM seminar_registrations
        WHERE (?1 IS NULL OR seminar_id = ?1) AND (?2 IS NULL OR status = ?2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(query.seminar_id.as_deref())
    .bind(status.map(|s| s.as_str()))
    .fetch_all(&state.db)
    .await?;

    Ok(ok(registrations))
}

/// POST /api/admin/seminar-registrations
pub async fn create_registration(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CreateRegistrationRequest>,
) -> Result<Json<ApiResponse<Registration>>, ApiError> {
    principal.require(Capability::ManageRegistrations)?;

    let user_exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
        .bind(&req.user_id)
        .fetch_optional(&state.db)
        .await?;
    if user_exists.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let seminar = sqlx::query_as::<_, Seminar>("SELECT * FROM seminars WHERE id = ?")
        .bind(&req.seminar_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Seminar not found"))?;

    let id = uuid::Uuid::new_v4().to_string();
    let qr_code = uuid::Uuid::new_v4().simple().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let inserted = sqlx::query(
        r#"
        INSERT INTO seminar_registrations
            (id, user_id, seminar_id, status, sessions_completed, sessions_remaining, makeup_used, qr_code, created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.user_id)
    .bind(&seminar.id)
    .bind(RegistrationStatus::Active.as_str())
    .bind(seminar.total_sessions)
    .bind(&qr_code)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return Err(ApiError::conflict("User is already registered for this seminar"));
        }
        return Err(e.into());
    }

    let registration = load_registration(&state.db, &id).await?;

    tracing::info!(
        registration_id = %registration.id,
        user_id = %registration.user_id,
        seminar_id = %registration.seminar_id,
        "Registration created"
    );

    audit_log(
        &state,
        AuditEvent {
            action: actions::REGISTRATION_CREATE,
            resource_type: resource_types::REGISTRATION,
            resource_id: Some(&registration.id),
            resource_name: Some(&seminar.title),
            user_id: Some(&principal.user_id),
            ip_address: ip.as_deref(),
            details: Some(serde_json::json!({ "user_id": registration.user_id })),
        },
    )
    .await;

    Ok(ok(registration))
}

/// PUT /api/admin/seminar-registrations/:id
pub async fn update_registration(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateRegistrationRequest>,
) -> Result<Json<ApiResponse<Registration>>, ApiError> {
    principal.require(Capability::ManageRegistrations)?;

    let status = parse_status(&req.status)?;
    let previous = load_registration(&state.db, &id).await?;

    sqlx::query("UPDATE seminar_registrations SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    let registration = load_registration(&state.db, &id).await?;

    tracing::info!(
        registration_id = %registration.id,
        from = %previous.status,
        to = %registration.status,
        "Registration status updated"
    );

    audit_log(
        &state,
        AuditEvent {
            action: actions::REGISTRATION_STATUS,
            resource_type: resource_types::REGISTRATION,
            resource_id: Some(&registration.id),
            user_id: Some(&principal.user_id),
            ip_address: ip.as_deref(),
            details: Some(serde_json::json!({
                "from": previous.status,
                "to": registration.status,
            })),
            ..Default::default()
        },
    )
    .await;

    Ok(ok(registration))
}

/// POST /api/admin/seminar-registrations/:id/attendance
pub async fn record_attendance(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<RecordAttendanceRequest>,
) -> Result<Json<ApiResponse<AttendanceOutcome>>, ApiError> {
    principal.require(Capability::RecordAttendance)?;

    let outcome = attendance::record(&state.db, &id, &req.session_id).await?;
    count_attendance();

    audit_log(
        &state,
        AuditEvent {
            action: actions::ATTENDANCE_RECORD,
            resource_type: resource_types::REGISTRATION,
            resource_id: Some(&outcome.registration.id),
            user_id: Some(&principal.user_id),
            ip_address: ip.as_deref(),
            details: Some(serde_json::json!({
                "session_id": outcome.attendance.session_id,
                "makeup_request_id": outcome.attendance.makeup_request_id,
                "credits": outcome.credit.credits,
            })),
            ..Default::default()
        },
    )
    .await;

    Ok(ok(outcome))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::*;
    use crate::engine::fixtures;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_attend_and_update_status() {
        let app = app().await;
        fixtures::user(&app.db, "m1", "member").await;
        fixtures::user(&app.db, "st", "staff").await;
        fixtures::seminar(&app.db, "sem", 2).await;
        fixtures::session(&app.db, "s1", "sem", 1, "2025-01-10").await;
        let staff = token_for(&app.db, "st").await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/admin/seminar-registrations",
            Some(&staff),
            Some(json!({ "user_id": "m1", "seminar_id": "sem" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["sessions_remaining"], 2);
        assert_eq!(body["data"]["makeup_used"], false);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            "/api/admin/seminar-registrations",
            Some(&staff),
            Some(json!({ "user_id": "m1", "seminar_id": "sem" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/api/admin/seminar-registrations/{}/attendance", id);
        let (status, body) = call(&app, "POST", &uri, Some(&staff), Some(json!({ "session_id": "s1" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["registration"]["sessions_completed"], 1);
        assert_eq!(body["data"]["credit"]["credits"], 2.0);

        let (status, _) = call(&app, "POST", &uri, Some(&staff), Some(json!({ "session_id": "s1" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/api/admin/seminar-registrations/{}", id);
        let (status, body) = call(&app, "PUT", &uri, Some(&staff), Some(json!({ "status": "on_hold" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "on_hold");

        let (status, body) = call(&app, "PUT", &uri, Some(&staff), Some(json!({ "status": "paused" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");

        let (status, body) = call(
            &app,
            "GET",
            "/api/admin/seminar-registrations?status=on_hold",
            Some(&staff),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_registration_is_not_found() {
        let app = app().await;
        let (status, body) = call(
            &app,
            "PUT",
            "/api/admin/seminar-registrations/missing",
            Some(ADMIN_TOKEN),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Registration not found");
    }
}
