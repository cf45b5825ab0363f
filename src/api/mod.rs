pub mod audit;
pub mod auth;
mod certificates;
mod credits;
pub mod error;
mod makeup;
pub mod metrics;
mod registrations;
mod seminars;
pub mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Success envelope shared by the seminar endpoints
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(allowed)
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Participant-facing routes; handlers enforce ownership
    let member_routes = Router::new()
        .route(
            "/seminars/makeup-request",
            get(makeup::list_requests).post(makeup::create_request),
        )
        .route(
            "/seminars/registrations/:id/makeup-eligibility",
            get(makeup::get_eligibility),
        )
        .route("/seminars/:id/sessions", get(seminars::list_sessions))
        .route("/user/credits", get(credits::get_user_credits));

    // Back-office routes; handlers check capabilities
    let admin_routes = Router::new()
        // Catalog
        .route(
            "/seminars",
            get(seminars::list_seminars).post(seminars::create_seminar),
        )
        .route("/seminars/:id/sessions", post(seminars::create_session))
        // Registrations and attendance
        .route(
            "/seminar-registrations",
            get(registrations::list_registrations).post(registrations::create_registration),
        )
        .route(
            "/seminar-registrations/:id",
            put(registrations::update_registration),
        )
        .route(
            "/seminar-registrations/:id/attendance",
            post(registrations::record_attendance),
        )
        // Makeup review
        .route("/makeup-requests", get(makeup::list_for_review))
        .route("/makeup-requests/:id/approve", post(makeup::approve_request))
        .route("/makeup-requests/:id/deny", post(makeup::deny_request))
        // Ledger
        .route("/credits", post(credits::create_entry))
        // Certificates
        .route("/seminars/certificates", get(certificates::list_candidates))
        .route(
            "/seminars/certificates/generate",
            post(certificates::generate_certificate),
        )
        .route("/seminars/certificates/send", post(certificates::send_certificate))
        .route(
            "/seminars/certificates/bulk-generate",
            post(certificates::bulk_generate),
        )
        .route("/seminars/certificates/bulk-send", post(certificates::bulk_send))
        // Audit
        .route("/audit-logs", get(audit::list_logs));

    let api_routes = Router::new()
        .merge(member_routes)
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api", api_routes)
        .route_layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_is_public() {
        let app = app().await;
        let (status, _) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let app = app().await;

        let (status, body) = call(&app, "GET", "/api/admin/seminars", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "unauthorized");

        let (status, _) = call(&app, "GET", "/api/admin/seminars", Some("wrong"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, "GET", "/api/admin/seminars", Some(ADMIN_TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_member_cannot_reach_admin_routes() {
        let app = app().await;
        crate::engine::fixtures::user(&app.db, "m1", "member").await;
        let token = token_for(&app.db, "m1").await;

        let (status, body) = call(&app, "GET", "/api/admin/makeup-requests", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");
    }
}
