//! Certificate issuance endpoints.

use axum::{
    extract::State,
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, resource_types, AuditEvent, BulkCertificateRequest, BulkReport, Capability,
    Certificate, CertificateActionRequest, CertificateCandidate, CertificateListQuery,
};
use crate::engine::certificates;
use crate::engine::period::CertificatePeriod;
use crate::engine::{self, SeminarError};
use crate::AppState;

use super::audit::{audit_log, ClientIp};
use super::auth::Principal;
use super::error::{ApiError, ApiJson, ApiQuery};
use super::metrics::{record_certificate, record_certificate_bulk};
use super::{ok, ApiResponse};

/// Upper bound on registrations handled by one bulk call
const MAX_BULK_ITEMS: usize = 500;

fn parse_period(period: &str, year: Option<i32>) -> Result<CertificatePeriod, ApiError> {
    Ok(CertificatePeriod::from_request(period, year, engine::today())?)
}

fn validate_bulk(req: &BulkCertificateRequest) -> Result<(), ApiError> {
    if req.registration_ids.is_empty() {
        return Err(ApiError::validation_field(
            "registration_ids",
            "At least one registration is required",
        ));
    }
    if req.registration_ids.len() > MAX_BULK_ITEMS {
        return Err(ApiError::validation_field(
            "registration_ids",
            format!("At most {} registrations per request", MAX_BULK_ITEMS),
        ));
    }
    Ok(())
}

async fn audit_certificate(
    state: &AppState,
    action: &str,
    principal: &Principal,
    ip: Option<&str>,
    certificate: &Certificate,
) {
    audit_log(
        state,
        AuditEvent {
            action,
            resource_type: resource_types::CERTIFICATE,
            resource_id: Some(&certificate.id),
            user_id: Some(&principal.user_id),
            ip_address: ip,
            details: Some(serde_json::json!({
                "registration_id": certificate.registration_id,
                "period": certificate.period,
                "year": certificate.period_year,
            })),
            ..Default::default()
        },
    )
    .await;
}

async fn audit_bulk(
    state: &AppState,
    action: &str,
    principal: &Principal,
    ip: Option<&str>,
    period: &CertificatePeriod,
    report: &BulkReport,
) {
    audit_log(
        state,
        AuditEvent {
            action,
            resource_type: resource_types::CERTIFICATE,
            resource_name: Some(&period.slug()),
            user_id: Some(&principal.user_id),
            ip_address: ip,
            details: Some(serde_json::json!({
                "bulk": true,
                "succeeded": report.succeeded,
                "failed": report.failed,
            })),
            ..Default::default()
        },
    )
    .await;
}

/// GET /api/admin/seminars/certificates?seminar_id=&period=&year=
pub async fn list_candidates(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiQuery(query): ApiQuery<CertificateListQuery>,
) -> Result<Json<ApiResponse<Vec<CertificateCandidate>>>, ApiError> {
    principal.require(Capability::ManageCertificates)?;
    let period = parse_period(&query.period, query.year)?;
    let candidates = certificates::candidates(&state.db, &query.seminar_id, &period).await?;
    Ok(ok(candidates))
}

/// POST /api/admin/seminars/certificates/generate
pub async fn generate_certificate(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CertificateActionRequest>,
) -> Result<Json<ApiResponse<Certificate>>, ApiError> {
    principal.require(Capability::ManageCertificates)?;
    let period = parse_period(&req.period, req.year)?;

    let result = certificates::generate(
        &state.db,
        &state.config.certificates,
        &req.registration_id,
        period,
    )
    .await;
    record_certificate("generate", result.is_ok());
    let certificate = result?;

    audit_certificate(&state, actions::CERTIFICATE_GENERATE, &principal, ip.as_deref(), &certificate).await;
    Ok(ok(certificate))
}

/// POST /api/admin/seminars/certificates/send
pub async fn send_certificate(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CertificateActionRequest>,
) -> Result<Json<ApiResponse<Certificate>>, ApiError> {
    principal.require(Capability::ManageCertificates)?;
    let period = parse_period(&req.period, req.year)?;

    let result: Result<Certificate, SeminarError> = certificates::send(
        &state.db,
        state.mailer.as_ref(),
        &state.config.certificates,
        &req.registration_id,
        period,
    )
    .await;
    record_certificate("send", result.is_ok());
    let certificate = result?;

    audit_certificate(&state, actions::CERTIFICATE_SEND, &principal, ip.as_deref(), &certificate).await;
    Ok(ok(certificate))
}

/// POST /api/admin/seminars/certificates/bulk-generate
pub async fn bulk_generate(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<BulkCertificateRequest>,
) -> Result<Json<ApiResponse<BulkReport>>, ApiError> {
    principal.require(Capability::ManageCertificates)?;
    validate_bulk(&req)?;
    let period = parse_period(&req.period, req.year)?;

    let report = certificates::bulk_generate(
        &state.db,
        &state.config.certificates,
        &req.registration_ids,
        period,
    )
    .await;
    record_certificate_bulk("generate", &report);

    audit_bulk(&state, actions::CERTIFICATE_GENERATE, &principal, ip.as_deref(), &period, &report).await;
    Ok(ok(report))
}

/// POST /api/admin/seminars/certificates/bulk-send
pub async fn bulk_send(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<BulkCertificateRequest>,
) -> Result<Json<ApiResponse<BulkReport>>, ApiError> {
    principal.require(Capability::ManageCertificates)?;
    validate_bulk(&req)?;
    let period = parse_period(&req.period, req.year)?;

    let report = certificates::bulk_send(
        &state.db,
        state.mailer.as_ref(),
        &state.config.certificates,
        &req.registration_ids,
        period,
    )
    .await;
    record_certificate_bulk("send", &report);

    audit_bulk(&state, actions::CERTIFICATE_SEND, &principal, ip.as_deref(), &period, &report).await;
    Ok(ok(report))
}
