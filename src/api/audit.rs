//! Audit log API endpoints and helpers.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, HeaderMap},
    Json,
};
use std::convert::Infallible;
use std::{net::SocketAddr, sync::Arc};

use crate::db::{list_audit_logs, log_audit, AuditEvent, AuditLogListResponse, AuditLogQuery, Capability};
use crate::AppState;

use super::auth::Principal;
use super::error::{ApiError, ApiQuery};
use super::{ok, ApiResponse};

/// Extract client IP address from request headers or connection info.
/// Proxy headers win over the socket address.
pub fn extract_client_ip(headers: &HeaderMap, conn_info: Option<&SocketAddr>) -> Option<String> {
    // X-Forwarded-For is a comma-separated list; the first entry is the client
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first_ip) = forwarded.split(',').next() {
            let ip = first_ip.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        let ip = real_ip.trim();
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    conn_info.map(|addr| addr.ip().to_string())
}

/// Caller IP for audit records
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let conn_info = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr);
        Ok(ClientIp(extract_client_ip(&parts.headers, conn_info)))
    }
}

/// Record an audit event. Failures are logged and never fail the request.
pub async fn audit_log(state: &AppState, event: AuditEvent<'_>) {
    let action = event.action;
    let resource_type = event.resource_type;
    if let Err(e) = log_audit(&state.db, event).await {
        tracing::warn!(
            action = action,
            resource_type = resource_type,
            error = %e,
            "Failed to create audit log entry"
        );
    }
}

/// List audit logs with filtering and pagination
///
/// Query parameters:
/// - action: Filter by action type (e.g., "makeup.approve")
/// - resource_type: Filter by resource type (e.g., "registration")
/// - resource_id: Filter by specific resource ID
/// - user_id: Filter by acting user
/// - page: Page number (1-indexed, defaults to 1)
/// - per_page: Items per page (defaults to 50, max 100)
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiQuery(query): ApiQuery<AuditLogQuery>,
) -> Result<Json<ApiResponse<AuditLogListResponse>>, ApiError> {
    principal.require(Capability::ViewAuditLog)?;
    let result = list_audit_logs(&state.db, &query).await?;
    Ok(ok(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_client_ip_prefers_proxy_headers() {
        let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers, Some(&addr)).as_deref(), Some("10.0.0.1"));

        headers.insert("x-real-ip", "192.168.1.5".parse().unwrap());
        assert_eq!(extract_client_ip(&headers, Some(&addr)).as_deref(), Some("192.168.1.5"));

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.2".parse().unwrap());
        assert_eq!(extract_client_ip(&headers, None).as_deref(), Some("203.0.113.7"));
    }
}
