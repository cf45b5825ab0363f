//! SMTP delivery of certificate emails.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

use super::{CertificateEmail, CertificateMailer};

/// Sends certificate emails through the configured SMTP relay
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl CertificateMailer for SmtpMailer {
    async fn send_certificate(&self, email: &CertificateEmail) -> Result<()> {
        if !self.config.is_configured() {
            anyhow::bail!("Email delivery is not configured");
        }

        let subject = format!("Your CE certificate for {}", email.period_label);
        self.send_email(
            &email.to_email,
            &subject,
            &render_certificate_html(email),
            &render_certificate_text(email),
        )
        .await
    }
}

fn render_certificate_text(email: &CertificateEmail) -> String {
    format!(
        "Hello {name},\n\n\
         Your continuing education certificate for {period} is ready.\n\
         Credits earned: {credits:.2}\n\n\
         Download it here: {url}\n\n\
         {issuer}\n",
        name = email.to_name,
        period = email.period_label,
        credits = email.credits,
        url = email.certificate_url,
        issuer = email.issuer_name,
    )
}

fn render_certificate_html(email: &CertificateEmail) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #1f2937;">
    <p>Hello {name},</p>
    <p>Your continuing education certificate for <strong>{period}</strong> is ready.</p>
    <p>Credits earned: <strong>{credits:.2}</strong></p>
    <p><a href="{url}">Download your certificate</a></p>
    <p>{issuer}</p>
</body>
</html>"#,
        name = html_escape(&email.to_name),
        period = html_escape(&email.period_label),
        credits = email.credits,
        url = html_escape(&email.certificate_url),
        issuer = html_escape(&email.issuer_name),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
