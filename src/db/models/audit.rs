//! Audit trail of back-office actions.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

/// An audit record about to be written
#[derive(Debug, Clone, Default)]
pub struct AuditEvent<'a> {
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<&'a str>,
    pub resource_name: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogListResponse {
    pub items: Vec<AuditLog>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 50, max 100)
    pub per_page: Option<i64>,
}

pub mod actions {
    pub const SEMINAR_CREATE: &str = "seminar.create";
    pub const SESSION_CREATE: &str = "seminar.session.create";

    pub const REGISTRATION_CREATE: &str = "registration.create";
    pub const REGISTRATION_STATUS: &str = "registration.status";
    pub const ATTENDANCE_RECORD: &str = "registration.attendance";

    pub const MAKEUP_SUBMIT: &str = "makeup.submit";
    pub const MAKEUP_APPROVE: &str = "makeup.approve";
    pub const MAKEUP_DENY: &str = "makeup.deny";

    pub const CREDIT_ENTRY: &str = "credit.entry";

    pub const CERTIFICATE_GENERATE: &str = "certificate.generate";
    pub const CERTIFICATE_SEND: &str = "certificate.send";
}

pub mod resource_types {
    pub const SEMINAR: &str = "seminar";
    pub const SESSION: &str = "session";
    pub const REGISTRATION: &str = "registration";
    pub const MAKEUP_REQUEST: &str = "makeup_request";
    pub const CREDIT: &str = "credit";
    pub const CERTIFICATE: &str = "certificate";
}

pub async fn log_audit(db: &SqlitePool, event: AuditEvent<'_>) -> Result<(), sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let details_json = event.details.map(|d| d.to_string());

    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, action, resource_type, resource_id, resource_name, user_id, ip_address, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(event.action)
    .bind(event.resource_type)
    .bind(event.resource_id)
    .bind(event.resource_name)
    .bind(event.user_id)
    .bind(event.ip_address)
    .bind(&details_json)
    .bind(&now)
    .execute(db)
    .await?;

    tracing::debug!(
        action = event.action,
        resource_type = event.resource_type,
        resource_id = event.resource_id,
        user_id = event.user_id,
        "Audit log recorded"
    );

    Ok(())
}

pub async fn list_audit_logs(
    db: &SqlitePool,
    query: &AuditLogQuery,
) -> Result<AuditLogListResponse, sqlx::Error> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(50).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let mut conditions = Vec::new();
    let mut bindings: Vec<&str> = Vec::new();

    let filters = [
        ("action", &query.action),
        ("resource_type", &query.resource_type),
        ("resource_id", &query.resource_id),
        ("user_id", &query.user_id),
    ];
    for (column, value) in filters {
        if let Some(value) = value {
            conditions.push(format!("{} = ?", column));
            bindings.push(value.as_str());
        }
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM audit_logs {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for binding in &bindings {
        count_query = count_query.bind(*binding);
    }
    let total = count_query.fetch_one(db).await?;

    let sql = format!(
        "SELECT * FROM audit_logs {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        where_clause
    );
    let mut query_builder = sqlx::query_as::<_, AuditLog>(&sql);
    for binding in &bindings {
        query_builder = query_builder.bind(*binding);
    }
    let items = query_builder
        .bind(per_page)
        .bind(offset)
        .fetch_all(db)
        .await?;

    let total_pages = (total + per_page - 1) / per_page;

    Ok(AuditLogListResponse {
        items,
        total,
        page,
        per_page,
        total_pages,
    })
}
