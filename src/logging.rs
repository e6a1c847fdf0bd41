//! Logging Module
//!
//! Installs the global tracing subscriber: a compact console layer and, when an
//! application log directory is configured, a daily rolling file per host.

use crate::config::LoggingConfig;
use crate::{ProxyError, Result};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logger manager for application logging
pub struct LoggerManager {
    pub config: LoggingConfig,
    hostname: String,
}

impl LoggerManager {
    pub fn new(config: LoggingConfig, hostname: String) -> Self {
        Self { config, hostname }
    }

    /// Logger for this host, named from the system hostname
    pub fn for_local_host(config: LoggingConfig) -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        Self::new(config, hostname)
    }

    /// Directory the rolling log files go to, if file logging is enabled
    pub fn host_log_dir(&self) -> Option<PathBuf> {
        self.config
            .app_log_dir
            .as_ref()
            .map(|dir| dir.join(&self.hostname))
    }

    /// Install the subscriber. Logs to `<app_log_dir>/<hostname>/<file_name>.<date>`
    /// when a directory is configured. Succeeds if a subscriber is already set.
    pub fn initialize(&self, file_name: &str) -> Result<()> {
        let host_log_dir = self.host_log_dir();

        let file_layer = match &host_log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    ProxyError::IoError(format!("Failed to create app log directory: {}", e))
                })?;
                let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, file_name);

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(file_appender)
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_level(true)
                        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                        .compact(),
                )
            }
            None => None,
        };

        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false)
            .with_level(true)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
            .compact();

        // RUST_LOG overrides the configured level
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.log_level));

        let result = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .try_init();

        match result {
            Ok(_) => {
                info!("Application logging initialized for host: {}", self.hostname);
                if let Some(dir) = host_log_dir {
                    info!("Application logs will be written to: {:?}", dir);
                }
            }
            Err(_) => {
                debug!("Tracing subscriber already initialized, skipping");
            }
        }

        Ok(())
    }
}
