//! Command-line interface.
//!
//! With no subcommand the binary starts the server. Subcommands:
//! - `status` - Check a running server and show the review queue
//! - `config check` - Validate the configuration file
//! - `users add` / `users token` - Manage users and API tokens in the local database
//! - `certificates issue` - Generate (and optionally send) certificates for a seminar,
//!   meant to be run from cron at the end of each half-year

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::db::{BulkReport, CertificateCandidate, CertificateState, MakeupRequest, Role};
use crate::engine::period::{CertificatePeriod, Half};

#[derive(Parser, Debug)]
#[command(name = "cetrack")]
#[command(author, version, about = "Seminar attendance, makeup sessions and CE certificates", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "cetrack.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// API URL of a running server
    #[arg(long, env = "CETRACK_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Authentication token (can also be set via CETRACK_TOKEN env var)
    #[arg(long, env = "CETRACK_TOKEN")]
    pub token: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check server health and pending makeup requests
    Status,

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// User and token management (works on the local database)
    #[command(subcommand)]
    Users(UsersCommands),

    /// Certificate issuance against a running server
    #[command(subcommand)]
    Certificates(CertificateCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

#[derive(Subcommand, Debug)]
pub enum UsersCommands {
    /// Create a user
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// admin, staff or member
        #[arg(long, default_value = "member")]
        role: String,
    },
    /// Issue an API token for a user (printed once)
    Token {
        /// Email of the user
        #[arg(long)]
        email: String,
        /// Label to remember the token by
        #[arg(long, default_value = "cli")]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CertificateCommands {
    /// Generate certificates for every eligible registration of a seminar
    Issue {
        #[arg(long)]
        seminar_id: String,
        /// first_half or second_half (default: the last completed half-year)
        #[arg(long)]
        period: Option<String>,
        /// Calendar year (default: year of the last completed half-year)
        #[arg(long)]
        year: Option<i32>,
        /// Also email certificates that have not been sent yet
        #[arg(long)]
        send: bool,
        /// Regenerate certificates that already exist
        #[arg(long)]
        regenerate: bool,
    },
}

/// Error body returned by the API
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Create an HTTP client with the given token
fn create_client(token: Option<&str>) -> Result<Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", token)
                .parse()
                .context("Invalid token format")?,
        );
    }

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to create HTTP client")
}

/// Turn an API response into its `data` payload or a readable error
async fn read_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        anyhow::bail!("Authentication required. Use --token or set CETRACK_TOKEN.");
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(err) => anyhow::bail!(
                "Server returned {} ({}): {}",
                status,
                err.code.unwrap_or_default(),
                err.error
            ),
            Err(_) => anyhow::bail!("Server returned error {}: {}", status, body),
        }
    }

    let envelope: Envelope<T> = response
        .json()
        .await
        .context("Failed to parse server response")?;
    Ok(envelope.data)
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Status) => cmd_status(cli).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::Users(UsersCommands::Add { email, name, role })) => {
            cmd_users_add(cli, email, name, role).await
        }
        Some(Commands::Users(UsersCommands::Token { email, name })) => {
            cmd_users_token(cli, email, name).await
        }
        Some(Commands::Certificates(CertificateCommands::Issue {
            seminar_id,
            period,
            year,
            send,
            regenerate,
        })) => {
            cmd_certificates_issue(cli, seminar_id, period.as_deref(), *year, *send, *regenerate).await
        }
        // Starting the server is handled in main.rs
        None => Ok(()),
    }
}

async fn cmd_status(cli: &Cli) -> Result<()> {
    let client = create_client(cli.token.as_deref())?;
    let base_url = cli.api_url.trim_end_matches('/');

    println!("Connecting to {}...", base_url);

    let health = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .context("Failed to connect to server. Is cetrack running?")?;
    let healthy = health.status().is_success();

    println!();
    println!("=== cetrack Server Status ===");
    println!();
    println!(
        "Status:     {} {}",
        if healthy { "[OK]" } else { "[!!]" },
        if healthy { "Healthy" } else { "Unhealthy" }
    );

    if cli.token.is_none() {
        println!();
        println!("Pass --token to see the makeup review queue.");
        return Ok(());
    }

    let response = client
        .get(format!("{}/api/admin/makeup-requests?status=pending", base_url))
        .send()
        .await
        .context("Failed to fetch makeup requests")?;
    let pending: Vec<MakeupRequest> = read_data(response).await?;

    println!("Pending makeup requests: {}", pending.len());
    for request in pending.iter().take(10) {
        println!(
            "  {}  registration {}  submitted {}",
            request.id, request.registration_id, request.created_at
        );
    }
    println!();
    Ok(())
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("[!!] Configuration file not found: {}", config_path.display());
        println!();
        println!("A default configuration will be used when starting the server.");
        println!("To create a custom configuration, copy cetrack.example.toml to cetrack.toml");
        return Ok(());
    }

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            anyhow::bail!("Invalid configuration file");
        }
    };

    println!("[OK] Configuration file is valid!");
    println!();
    println!("Server:");
    println!("  Host:         {}", config.server.host);
    println!("  API Port:     {}", config.server.api_port);
    println!("  Data Dir:     {}", config.server.data_dir.display());
    println!();
    println!("Seminars:");
    println!("  Sessions:     {}", config.seminars.total_sessions);
    println!("  Default credits/session: {}", config.seminars.credits_per_session);
    println!();
    println!("Certificates:");
    println!("  Base URL:     {}", config.certificates.base_url);
    println!("  Issuer:       {}", config.certificates.issuer_name);
    println!(
        "  Email:        {}",
        if config.email.is_configured() {
            "Configured"
        } else {
            "Not configured"
        }
    );
    println!();

    let mut warnings = Vec::new();
    if !config.email.is_configured() {
        warnings.push("No SMTP relay configured - certificate sends will fail");
    }
    if config.server.cors_origins.is_empty() {
        warnings.push("No CORS origins configured - any origin may call the API");
    }
    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in warnings {
            println!("  [!] {}", warning);
        }
        println!();
    }

    Ok(())
}

async fn open_local_db(cli: &Cli) -> Result<crate::DbPool> {
    let config = Config::load(&cli.config)?;
    crate::db::init(&config.server.data_dir).await
}

async fn cmd_users_add(cli: &Cli, email: &str, name: &str, role: &str) -> Result<()> {
    let role: Role = role.parse().map_err(anyhow::Error::msg)?;
    crate::api::validation::validate_email(email).map_err(anyhow::Error::msg)?;
    crate::api::validation::validate_title(name, "Name").map_err(anyhow::Error::msg)?;

    let db = open_local_db(cli).await?;
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO users (id, email, name, role) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(email)
        .bind(name.trim())
        .bind(role.as_str())
        .execute(&db)
        .await
        .with_context(|| format!("Failed to create user {}", email))?;

    println!("Created {} {} ({})", role, email, id);
    Ok(())
}

async fn cmd_users_token(cli: &Cli, email: &str, name: &str) -> Result<()> {
    let db = open_local_db(cli).await?;
    let user: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&db)
        .await?;
    let (user_id,) = user.with_context(|| format!("No user with email {}", email))?;

    let token = crate::api::auth::create_api_token(&db, &user_id, name).await?;

    println!("Token for {} (shown once, store it safely):", email);
    println!();
    println!("{}", token);
    Ok(())
}

/// Period to issue for. Without arguments this is the most recently
/// completed half-year, so a run on Jul 1 issues January - June.
fn resolve_period(period: Option<&str>, year: Option<i32>, today: NaiveDate) -> Result<CertificatePeriod> {
    let last = CertificatePeriod::last_completed(today);
    let half = match period {
        Some(p) => p.parse::<Half>().map_err(anyhow::Error::msg)?,
        None => last.half,
    };
    Ok(CertificatePeriod::new(half, year.unwrap_or(last.year)))
}

/// Registrations to generate for, given the current candidate states
fn generation_targets(candidates: &[CertificateCandidate], regenerate: bool) -> Vec<String> {
    candidates
        .iter()
        .filter(|c| regenerate || c.state == CertificateState::Pending)
        .map(|c| c.registration_id.clone())
        .collect()
}

fn print_report(label: &str, report: &BulkReport) {
    println!("{}: {} succeeded, {} failed", label, report.succeeded, report.failed);
    for error in &report.errors {
        println!("  [!!] {}: {}", error.registration_id, error.error);
    }
}

async fn cmd_certificates_issue(
    cli: &Cli,
    seminar_id: &str,
    period: Option<&str>,
    year: Option<i32>,
    send: bool,
    regenerate: bool,
) -> Result<()> {
    let target = resolve_period(period, year, crate::engine::today())?;
    let period = target.half.as_str();
    let year = target.year;

    let client = create_client(cli.token.as_deref())?;
    let base_url = cli.api_url.trim_end_matches('/');

    let response = client
        .get(format!("{}/api/admin/seminars/certificates", base_url))
        .query(&[
            ("seminar_id", seminar_id.to_string()),
            ("period", period.to_string()),
            ("year", year.to_string()),
        ])
        .send()
        .await
        .context("Failed to connect to server. Is cetrack running?")?;
    let candidates: Vec<CertificateCandidate> = read_data(response).await?;

    println!(
        "{} eligible registration(s) for {} {}",
        candidates.len(),
        period,
        year
    );

    let targets = generation_targets(&candidates, regenerate);
    let mut failed = 0;

    if !targets.is_empty() {
        let response = client
            .post(format!("{}/api/admin/seminars/certificates/bulk-generate", base_url))
            .json(&json!({ "registration_ids": targets, "period": period, "year": year }))
            .send()
            .await
            .context("Bulk generate request failed")?;
        let report: BulkReport = read_data(response).await?;
        print_report("Generated", &report);
        failed += report.failed;
    }

    if send {
        // Re-read so freshly generated certificates are included
        let response = client
            .get(format!("{}/api/admin/seminars/certificates", base_url))
            .query(&[
                ("seminar_id", seminar_id.to_string()),
                ("period", period.to_string()),
                ("year", year.to_string()),
            ])
            .send()
            .await?;
        let candidates: Vec<CertificateCandidate> = read_data(response).await?;
        let unsent: Vec<String> = candidates
            .iter()
            .filter(|c| c.state == CertificateState::Generated)
            .map(|c| c.registration_id.clone())
            .collect();

        if !unsent.is_empty() {
            let response = client
                .post(format!("{}/api/admin/seminars/certificates/bulk-send", base_url))
                .json(&json!({ "registration_ids": unsent, "period": period, "year": year }))
                .send()
                .await
                .context("Bulk send request failed")?;
            let report: BulkReport = read_data(response).await?;
            print_report("Sent", &report);
            failed += report.failed;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} certificate operation(s) failed", failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, state: CertificateState) -> CertificateCandidate {
        CertificateCandidate {
            registration_id: id.to_string(),
            user_id: format!("u-{}", id),
            user_name: "Dr. Lee".to_string(),
            user_email: "lee@example.org".to_string(),
            credits_in_period: 4.0,
            state,
            certificate: None,
        }
    }

    #[test]
    fn test_generation_targets() {
        let candidates = vec![
            candidate("r1", CertificateState::Pending),
            candidate("r2", CertificateState::Generated),
            candidate("r3", CertificateState::Sent),
        ];
        assert_eq!(generation_targets(&candidates, false), vec!["r1"]);
        assert_eq!(generation_targets(&candidates, true).len(), 3);
    }

    #[test]
    fn test_default_period_is_last_completed_half() {
        let day = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();

        let p = resolve_period(None, None, day("2025-07-01")).unwrap();
        assert_eq!((p.half.as_str(), p.year), ("first_half", 2025));

        let p = resolve_period(None, None, day("2026-01-01")).unwrap();
        assert_eq!((p.half.as_str(), p.year), ("second_half", 2025));

        let p = resolve_period(Some("first_half"), Some(2024), day("2026-01-01")).unwrap();
        assert_eq!((p.half.as_str(), p.year), ("first_half", 2024));

        assert!(resolve_period(Some("summer"), None, day("2026-01-01")).is_err());
    }

    #[test]
    fn test_cli_parses_issue_command() {
        let cli = Cli::parse_from([
            "cetrack",
            "certificates",
            "issue",
            "--seminar-id",
            "sem",
            "--period",
            "second_half",
            "--send",
        ]);
        match cli.command {
            Some(Commands::Certificates(CertificateCommands::Issue {
                seminar_id,
                period,
                send,
                regenerate,
                ..
            })) => {
                assert_eq!(seminar_id, "sem");
                assert_eq!(period.as_deref(), Some("second_half"));
                assert!(send);
                assert!(!regenerate);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
