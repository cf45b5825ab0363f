//! CE credit ledger endpoints.

use axum::{
    extract::State,
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, resource_types, AuditEvent, Capability, CreateCreditEntryRequest,
    CreditEntryResponse, CreditSource, CreditsQuery, TransactionType, UserCreditsResponse,
};
use crate::engine::ledger::{self, NewCreditEntry};
use crate::AppState;

use super::audit::{audit_log, ClientIp};
use super::auth::Principal;
use super::error::{ApiError, ApiJson, ApiQuery};
use super::{ok, ApiResponse};

/// GET /api/user/credits?userId=
///
/// Returns the bare `{totalCredits, ledger}` document the dashboard reads.
pub async fn get_user_credits(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiQuery(query): ApiQuery<CreditsQuery>,
) -> Result<Json<UserCreditsResponse>, ApiError> {
    principal.ensure_can_access_user(&query.user_id)?;
    let credits = ledger::user_credits(&state.db, &query.user_id).await?;
    Ok(Json(credits))
}

/// POST /api/admin/credits
pub async fn create_entry(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CreateCreditEntryRequest>,
) -> Result<Json<ApiResponse<CreditEntryResponse>>, ApiError> {
    principal.require(Capability::ManageCredits)?;

    let transaction_type: TransactionType = req
        .transaction_type
        .parse()
        .map_err(|e: String| ApiError::validation_field("transaction_type", e))?;
    let source = match req.source.as_deref() {
        None => CreditSource::Manual,
        Some(s) => s
            .parse()
            .map_err(|e: String| ApiError::validation_field("source", e))?,
    };

    let user_exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
        .bind(&req.user_id)
        .fetch_optional(&state.db)
        .await?;
    if user_exists.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let new = NewCreditEntry {
        user_id: req.user_id,
        registration_id: req.registration_id,
        session_id: None,
        credits: req.credits,
        source,
        transaction_type,
        event_title: req.event_title,
        event_date: req.event_date,
        notes: req.notes,
    };

    let mut conn = state.db.acquire().await?;
    let entry = ledger::append(&mut conn, &new).await?;
    drop(conn);

    audit_log(
        &state,
        AuditEvent {
            action: actions::CREDIT_ENTRY,
            resource_type: resource_types::CREDIT,
            resource_id: Some(&entry.id),
            resource_name: Some(&entry.event_title),
            user_id: Some(&principal.user_id),
            ip_address: ip.as_deref(),
            details: Some(serde_json::json!({
                "user_id": entry.user_id,
                "credits": entry.credits,
                "transaction_type": entry.transaction_type,
            })),
        },
    )
    .await;

    let signed_credits = ledger::signed_credits(&entry);
    Ok(ok(CreditEntryResponse {
        entry,
        signed_credits,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::*;
    use crate::engine::fixtures;
    use axum::http::StatusCode;
    use serde_json::json;

    fn entry(credits: f64, transaction_type: &str, date: &str) -> serde_json::Value {
        json!({
            "user_id": "m1",
            "credits": credits,
            "transaction_type": transaction_type,
            "event_title": "Implant workshop",
            "event_date": date,
        })
    }

    #[tokio::test]
    async fn test_manual_entries_and_signed_total() {
        let app = app().await;
        fixtures::user(&app.db, "m1", "member").await;

        for body in [
            entry(6.0, "earned", "2025-02-01"),
            entry(1.5, "revoked", "2025-03-01"),
            entry(-0.25, "adjustment", "2025-01-15"),
        ] {
            let (status, _) = call(&app, "POST", "/api/admin/credits", Some(ADMIN_TOKEN), Some(body)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let member = token_for(&app.db, "m1").await;
        let (status, body) = call(&app, "GET", "/api/user/credits?userId=m1", Some(&member), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalCredits"], 4.25);
        let ledger = body["ledger"].as_array().unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger[0]["event_date"], "2025-01-15");
        assert_eq!(ledger[2]["signed_credits"], -1.5);
    }

    #[tokio::test]
    async fn test_entry_validation_and_permissions() {
        let app = app().await;
        fixtures::user(&app.db, "m1", "member").await;
        fixtures::user(&app.db, "st", "staff").await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/admin/credits",
            Some(ADMIN_TOKEN),
            Some(entry(-2.0, "earned", "2025-02-01")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"]["credits"].is_array());

        let (status, _) = call(
            &app,
            "POST",
            "/api/admin/credits",
            Some(ADMIN_TOKEN),
            Some(entry(2.0, "bonus", "2025-02-01")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Staff run seminars but do not edit the ledger
        let staff = token_for(&app.db, "st").await;
        let (status, _) = call(
            &app,
            "POST",
            "/api/admin/credits",
            Some(&staff),
            Some(entry(2.0, "earned", "2025-02-01")),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&app, "GET", "/api/user/credits?userId=m1", Some(&staff), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_entry_must_use_the_users_own_registration() {
        let app = app().await;
        fixtures::user(&app.db, "m1", "member").await;
        fixtures::user(&app.db, "m2", "member").await;
        fixtures::seminar(&app.db, "sem", 10).await;
        fixtures::registration(&app.db, "r2", "m2", "sem", 10).await;

        let mut body = entry(4.0, "earned", "2025-02-01");
        body["registration_id"] = json!("r2");
        body["source"] = json!("seminar_session");
        let (status, resp) = call(&app, "POST", "/api/admin/credits", Some(ADMIN_TOKEN), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(resp["details"]["registration_id"].is_array());

        // r2 stays ineligible and m2's balance is an honest zero
        let (status, _) = call(
            &app,
            "POST",
            "/api/admin/seminars/certificates/generate",
            Some(ADMIN_TOKEN),
            Some(json!({ "registration_id": "r2", "period": "first_half", "year": 2025 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, resp) = call(&app, "GET", "/api/user/credits?userId=m2", Some(ADMIN_TOKEN), None).await;
        assert_eq!(resp["totalCredits"], 0.0);
        assert!(resp["totalCredits"].as_f64().unwrap().is_sign_positive());
    }

    #[tokio::test]
    async fn test_members_only_read_their_own_credits() {
        let app = app().await;
        fixtures::user(&app.db, "m1", "member").await;
        fixtures::user(&app.db, "m2", "member").await;
        let other = token_for(&app.db, "m2").await;

        let (status, _) = call(&app, "GET", "/api/user/credits?userId=m1", Some(&other), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
