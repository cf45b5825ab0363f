use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub seminars: SeminarConfig,
    #[serde(default)]
    pub certificates: CertificateConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Origins allowed to call the API from a browser (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Static token granting full admin access (for cron jobs and bootstrap)
    #[serde(default = "default_admin_token")]
    pub admin_token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_token: default_admin_token(),
        }
    }
}

fn default_admin_token() -> String {
    // Generate a random token if not provided
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeminarConfig {
    /// Program length used when a seminar is created without one
    #[serde(default = "default_total_sessions")]
    pub total_sessions: i64,
    /// CE credit hours per session used when a seminar is created without one
    #[serde(default = "default_credits_per_session")]
    pub credits_per_session: f64,
}

impl Default for SeminarConfig {
    fn default() -> Self {
        Self {
            total_sessions: default_total_sessions(),
            credits_per_session: default_credits_per_session(),
        }
    }
}

fn default_total_sessions() -> i64 {
    10
}

fn default_credits_per_session() -> f64 {
    2.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertificateConfig {
    /// Public base URL certificate documents are served from
    #[serde(default = "default_certificate_base_url")]
    pub base_url: String,
    /// Organization name printed in certificate emails
    #[serde(default = "default_issuer_name")]
    pub issuer_name: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            base_url: default_certificate_base_url(),
            issuer_name: default_issuer_name(),
        }
    }
}

fn default_certificate_base_url() -> String {
    "http://localhost:8080/certificates".to_string()
}

fn default_issuer_name() -> String {
    "Continuing Education Office".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    /// Use implicit TLS/STARTTLS relay (disable only for local test servers)
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: default_smtp_tls(),
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "CE Certificates".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.seminars.total_sessions < 1 {
            anyhow::bail!("seminars.total_sessions must be at least 1");
        }
        if !self.seminars.credits_per_session.is_finite() || self.seminars.credits_per_session <= 0.0 {
            anyhow::bail!("seminars.credits_per_session must be a positive number");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.api_port, 8080);
        assert_eq!(config.seminars.total_sessions, 10);
        assert!((config.seminars.credits_per_session - 2.0).abs() < f64::EPSILON);
        assert!(!config.email.is_configured());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [server]
            api_port = 9000

            [seminars]
            credits_per_session = 1.5

            [email]
            smtp_host = "smtp.example.org"
            from_address = "ce@example.org"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.api_port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.seminars.total_sessions, 10);
        assert!((config.seminars.credits_per_session - 1.5).abs() < f64::EPSILON);
        assert!(config.email.is_configured());
        assert_eq!(config.email.smtp_port, 587);
    }

    #[test]
    fn test_rejects_invalid_seminar_settings() {
        assert!(Config::parse("[seminars]\ntotal_sessions = 0").is_err());
        assert!(Config::parse("[seminars]\ncredits_per_session = -1.0").is_err());
    }
}
