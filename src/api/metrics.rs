//! Prometheus metrics endpoint and HTTP request tracking middleware.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::db::BulkReport;
use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const MAKEUP_REQUESTS_TOTAL: &str = "makeup_requests_total";
pub const ATTENDANCE_RECORDED_TOTAL: &str = "attendance_recorded_total";
pub const CERTIFICATES_TOTAL: &str = "certificates_total";
pub const REGISTRATIONS_ACTIVE: &str = "registrations_active";
pub const MAKEUP_REQUESTS_PENDING: &str = "makeup_requests_pending";

/// Install the Prometheus recorder. Call once during startup.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(
        MAKEUP_REQUESTS_TOTAL,
        "Makeup request workflow events by outcome (submitted/approved/denied)"
    );
    describe_counter!(ATTENDANCE_RECORDED_TOTAL, "Session check-ins recorded");
    describe_counter!(
        CERTIFICATES_TOTAL,
        "Certificate operations by action (generate/send) and result"
    );
    describe_gauge!(REGISTRATIONS_ACTIVE, "Registrations currently active");
    describe_gauge!(MAKEUP_REQUESTS_PENDING, "Makeup requests awaiting review");

    Ok(handle)
}

/// GET /metrics - Prometheus text format, no authentication
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seminar_registrations WHERE status = 'active'")
            .fetch_one(&state.db)
            .await
    {
        gauge!(REGISTRATIONS_ACTIVE).set(count as f64);
    }

    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM makeup_requests WHERE status = 'pending'")
            .fetch_one(&state.db)
            .await
    {
        gauge!(MAKEUP_REQUESTS_PENDING).set(count as f64);
    }
}

/// Records `http_requests_total` and `http_request_duration_seconds`
/// labelled by method and route template.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_makeup_event(outcome: &'static str) {
    counter!(MAKEUP_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn count_attendance() {
    counter!(ATTENDANCE_RECORDED_TOTAL).increment(1);
}

pub fn record_certificate(action: &'static str, success: bool) {
    let result = if success { "success" } else { "failed" };
    counter!(CERTIFICATES_TOTAL, "action" => action, "result" => result).increment(1);
}

pub fn record_certificate_bulk(action: &'static str, report: &BulkReport) {
    counter!(CERTIFICATES_TOTAL, "action" => action, "result" => "success")
        .increment(report.succeeded as u64);
    counter!(CERTIFICATES_TOTAL, "action" => action, "result" => "failed")
        .increment(report.failed as u64);
}
