//! Outbound participant notifications.

pub mod email;

use anyhow::Result;
use async_trait::async_trait;

pub use email::SmtpMailer;

/// Content of a certificate delivery
#[derive(Debug, Clone)]
pub struct CertificateEmail {
    pub to_email: String,
    pub to_name: String,
    pub period_label: String,
    pub credits: f64,
    pub certificate_url: String,
    pub issuer_name: String,
}

/// Transport for certificate emails
#[async_trait]
pub trait CertificateMailer: Send + Sync {
    async fn send_certificate(&self, email: &CertificateEmail) -> Result<()>;
}
