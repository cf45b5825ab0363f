//! Users, roles and API tokens.
//!
//! Identity lives with the external provider; this table mirrors the subset
//! the service needs (contact details for certificates and the role that
//! decides what a caller may do).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Platform role. Parsed once per request and turned into capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including the credit ledger and the audit log
    Admin,
    /// Back-office staff running seminars day to day
    Staff,
    /// Seminar participant; sees only their own records
    Member,
}

/// Something a caller is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Read another user's registrations, requests and credits
    ViewAnyRecords,
    ReviewMakeupRequests,
    RecordAttendance,
    ManageRegistrations,
    ManageSeminars,
    ManageCredits,
    ManageCertificates,
    ViewAuditLog,
}

impl Role {
    pub fn has(&self, capability: Capability) -> bool {
        match self {
            Role::Admin => true,
            Role::Staff => !matches!(
                capability,
                Capability::ManageCredits | Capability::ViewAuditLog
            ),
            Role::Member => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Member => "member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "member" => Ok(Role::Member),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Unknown role strings degrade to the least privileged role.
    pub fn role_enum(&self) -> Role {
        self.role.parse().unwrap_or(Role::Member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_has_every_capability() {
        for cap in [
            Capability::ViewAnyRecords,
            Capability::ReviewMakeupRequests,
            Capability::RecordAttendance,
            Capability::ManageRegistrations,
            Capability::ManageSeminars,
            Capability::ManageCredits,
            Capability::ManageCertificates,
            Capability::ViewAuditLog,
        ] {
            assert!(Role::Admin.has(cap));
            assert!(!Role::Member.has(cap));
        }
    }

    #[test]
    fn test_staff_cannot_touch_ledger_or_audit() {
        assert!(Role::Staff.has(Capability::ReviewMakeupRequests));
        assert!(Role::Staff.has(Capability::ManageCertificates));
        assert!(!Role::Staff.has(Capability::ManageCredits));
        assert!(!Role::Staff.has(Capability::ViewAuditLog));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" staff ".parse::<Role>(), Ok(Role::Staff));
        assert!("superuser".parse::<Role>().is_err());

        let user = User {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            name: "A".to_string(),
            role: "owner".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(user.role_enum(), Role::Member);
    }
}
