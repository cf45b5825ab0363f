//! Request authentication and role-based authorization.
//!
//! `auth_middleware` resolves the caller once per request and stores a
//! [`Principal`] in the request extensions; handlers extract it and check
//! capabilities instead of comparing role strings.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::db::{Capability, DbPool, Role, User};
use crate::AppState;

use super::error::ApiError;

/// User id recorded for actions taken with the configured admin token
pub const SYSTEM_USER_ID: &str = "system";

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn system() -> Self {
        Self {
            user_id: SYSTEM_USER_ID.to_string(),
            role: Role::Admin,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.role.has(capability)
    }

    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.has(capability) {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.user_id, role = %self.role, ?capability, "Capability denied");
            Err(ApiError::forbidden("You do not have permission to perform this action"))
        }
    }

    /// Allow the owner of a record, or anyone holding `capability`
    pub fn require_owner_or(&self, owner_id: &str, capability: Capability) -> Result<(), ApiError> {
        if self.user_id == owner_id {
            return Ok(());
        }
        self.require(capability)
    }

    /// Read access to another user's records
    pub fn ensure_can_access_user(&self, user_id: &str) -> Result<(), ApiError> {
        self.require_owner_or(user_id, Capability::ViewAnyRecords)
    }
}

/// Generate a random API token
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Issue a new API token for a user. Only the hash is stored; the plaintext
/// is returned once.
pub async fn create_api_token(db: &DbPool, user_id: &str, name: &str) -> Result<String, sqlx::Error> {
    let token = generate_token();
    sqlx::query("INSERT INTO api_tokens (id, user_id, name, token_hash) VALUES (?, ?, ?, ?)")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(name)
        .bind(hash_token(&token))
        .execute(db)
        .await?;
    Ok(token)
}

/// Extract the token from request headers
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(auth_header) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.trim());
        }
    }

    headers.get("X-API-Key").and_then(|h| h.to_str().ok())
}

fn is_admin_token(configured: &str, provided: &str) -> bool {
    let configured = configured.as_bytes();
    let provided = provided.as_bytes();
    configured.len() == provided.len() && configured.ct_eq(provided).into()
}

/// Resolve a token to the principal it authenticates
pub async fn resolve_principal(
    db: &DbPool,
    admin_token: &str,
    token: &str,
) -> Result<Option<Principal>, sqlx::Error> {
    if is_admin_token(admin_token, token) {
        return Ok(Some(Principal::system()));
    }

    let token_hash = hash_token(token);
    let user: Option<User> = sqlx::query_as(
        r#"
        SELECT u.* FROM users u
        JOIN api_tokens t ON t.user_id = u.id
        WHERE t.token_hash = ?
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(db)
    .await?;

    let Some(user) = user else {
        return Ok(None);
    };

    if let Err(e) = sqlx::query("UPDATE api_tokens SET last_used_at = datetime('now') WHERE token_hash = ?")
        .bind(&token_hash)
        .execute(db)
        .await
    {
        tracing::warn!(error = %e, "Failed to update token last_used_at");
    }

    Ok(Some(Principal {
        role: user.role_enum(),
        user_id: user.id,
    }))
}

/// Auth middleware that validates tokens and attaches the principal
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let principal = resolve_principal(&state.db, &state.config.auth.admin_token, token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid authentication token"))?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}
