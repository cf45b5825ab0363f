pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod notifications;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::notifications::CertificateMailer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub mailer: Arc<dyn CertificateMailer>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, mailer: Arc<dyn CertificateMailer>) -> Self {
        Self {
            config,
            db,
            mailer,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
