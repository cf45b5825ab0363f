//! Makeup request endpoints: participant submission and staff review.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, resource_types, AuditEvent, Capability, CreateMakeupRequest, DenyMakeupRequest,
    MakeupRequest, MakeupRequestCreated, MakeupRequestQuery, MakeupReviewQuery, MakeupStatus,
};
use crate::engine::eligibility::{self, MakeupEligibility};
use crate::engine::{self, makeup};
use crate::AppState;

use super::audit::{audit_log, ClientIp};
use super::auth::Principal;
use super::error::{ApiError, ApiJson, ApiQuery};
use super::metrics::record_makeup_event;
use super::registrations::load_registration;
use super::{ok, ApiResponse};

/// GET /api/seminars/makeup-request?registration_id=
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiQuery(query): ApiQuery<MakeupRequestQuery>,
) -> Result<Json<ApiResponse<Vec<MakeupRequest>>>, ApiError> {
    let registration = load_registration(&state.db, &query.registration_id).await?;
    principal.require_owner_or(&registration.user_id, Capability::ViewAnyRecords)?;

    let requests = makeup::list_for_registration(&state.db, &registration.id).await?;
    Ok(ok(requests))
}

/// GET /api/seminars/registrations/:id/makeup-eligibility
pub async fn get_eligibility(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(registration_id): Path<String>,
) -> Result<Json<ApiResponse<MakeupEligibility>>, ApiError> {
    let (registration, eligibility) =
        makeup::eligibility_for(&state.db, &registration_id, engine::today()).await?;
    principal.require_owner_or(&registration.user_id, Capability::ViewAnyRecords)?;
    Ok(ok(eligibility))
}

/// POST /api/seminars/makeup-request
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CreateMakeupRequest>,
) -> Result<Json<ApiResponse<MakeupRequestCreated>>, ApiError> {
    // Required fields are checked before any lookup
    eligibility::require_missed_session(&req)?;

    let registration = load_registration(&state.db, &req.registration_id).await?;
    principal.require_owner_or(&registration.user_id, Capability::ReviewMakeupRequests)?;

    if let Some(claimed) = req.user_id.as_deref() {
        if claimed != registration.user_id {
            tracing::debug!(
                claimed_user_id = %claimed,
                registration_id = %registration.id,
                "Ignoring user_id that does not own the registration"
            );
        }
    }

    let request = makeup::submit(&state.db, &req, engine::today()).await?;
    record_makeup_event("submitted");

    audit_log(
        &state,
        AuditEvent {
            action: actions::MAKEUP_SUBMIT,
            resource_type: resource_types::MAKEUP_REQUEST,
            resource_id: Some(&request.id),
            user_id: Some(&principal.user_id),
            ip_address: ip.as_deref(),
            details: Some(serde_json::json!({
                "registration_id": request.registration_id,
                "missed_session_id": request.missed_session_id,
                "requested_session_id": request.requested_session_id,
            })),
            ..Default::default()
        },
    )
    .await;

    Ok(ok(MakeupRequestCreated {
        request_id: request.id,
    }))
}

/// GET /api/admin/makeup-requests?status=
pub async fn list_for_review(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiQuery(query): ApiQuery<MakeupReviewQuery>,
) -> Result<Json<ApiResponse<Vec<MakeupRequest>>>, ApiError> {
    principal.require(Capability::ReviewMakeupRequests)?;

    let status = match query.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(s) => Some(
            s.parse::<MakeupStatus>()
                .map_err(|e| ApiError::validation_field("status", e))?,
        ),
    };

    let requests = makeup::list_for_review(&state.db, status).await?;
    Ok(ok(requests))
}

/// POST /api/admin/makeup-requests/:id/approve
pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Path(request_id): Path<String>,
) -> Result<Json<ApiResponse<MakeupRequest>>, ApiError> {
    principal.require(Capability::ReviewMakeupRequests)?;

    let request = makeup::approve(&state.db, &request_id, &principal.user_id).await?;
    record_makeup_event("approved");

    audit_log(
        &state,
        AuditEvent {
            action: actions::MAKEUP_APPROVE,
            resource_type: resource_types::MAKEUP_REQUEST,
            resource_id: Some(&request.id),
            user_id: Some(&principal.user_id),
            ip_address: ip.as_deref(),
            details: Some(serde_json::json!({ "registration_id": request.registration_id })),
            ..Default::default()
        },
    )
    .await;

    Ok(ok(request))
}

/// POST /api/admin/makeup-requests/:id/deny
pub async fn deny_request(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Path(request_id): Path<String>,
    body: Option<Json<DenyMakeupRequest>>,
) -> Result<Json<ApiResponse<MakeupRequest>>, ApiError> {
    principal.require(Capability::ReviewMakeupRequests)?;

    let Json(body) = body.unwrap_or_default();
    let request = makeup::deny(
        &state.db,
        &request_id,
        &principal.user_id,
        body.denial_reason.as_deref(),
    )
    .await?;
    record_makeup_event("denied");

    audit_log(
        &state,
        AuditEvent {
            action: actions::MAKEUP_DENY,
            resource_type: resource_types::MAKEUP_REQUEST,
            resource_id: Some(&request.id),
            user_id: Some(&principal.user_id),
            ip_address: ip.as_deref(),
            details: Some(serde_json::json!({
                "registration_id": request.registration_id,
                "denial_reason": request.denial_reason,
            })),
            ..Default::default()
        },
    )
    .await;

    Ok(ok(request))
}
