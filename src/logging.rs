//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and
//! files for debugging long-running reconciliation and workflow execution.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Repeated calls are no-ops. Console output honors `STEWARD_LOG` (falling
/// back to `info`); a JSON file layer is written under `log/` for post-hoc
/// inspection of async workflows.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level =
            std::env::var("STEWARD_LOG").unwrap_or_else(|_| default_log_level(&environment));

        let log_dir = PathBuf::from("log");
        if !log_dir.exists() && fs::create_dir_all(&log_dir).is_err() {
            // Fall back to console-only logging when the directory is unavailable
            let _ = tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_filter(EnvFilter::new(log_level)),
                )
                .try_init();
            return;
        }

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let file_appender = tracing_appender::rolling::never(
            &log_dir,
            format!("{environment}.{pid}.{timestamp}.log"),
        );

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(EnvFilter::new(log_level.clone())),
            )
            .with(
                fmt::layer()
                    .with_writer(file_appender)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level)),
            )
            .try_init();
    });
}

fn get_environment() -> String {
    std::env::var("STEWARD_ENV").unwrap_or_else(|_| "development".to_string())
}

fn default_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}
