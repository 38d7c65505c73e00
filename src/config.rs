//! # Orchestration Configuration
//!
//! Layered configuration for the orchestration core: built-in defaults,
//! an optional TOML file, and `STEWARD_`-prefixed environment variables,
//! merged in that order. Validation runs after the merge so a partially
//! overridden configuration is still checked as a whole.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StewardError, StewardResult};

/// Top-level configuration for the orchestration core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Interval between health/metrics polls in milliseconds
    pub poll_interval_ms: u64,
    /// Transport-level retry attempts for idempotent reads
    pub retry_attempts: u32,
    /// Window during which a cached snapshot satisfies a refresh without a fetch
    pub cache_time_ms: u64,
    /// Age past which a snapshot is flagged stale when no push connection is live
    pub stale_time_ms: u64,
    /// Whether to open the push event stream on startup
    pub enable_real_time: bool,
    /// Remote platform API settings
    pub api: PlatformApiConfig,
    /// Event stream connection settings
    pub events: EventStreamConfig,
    /// Workflow execution settings
    pub execution: ExecutionConfig,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            retry_attempts: 3,
            cache_time_ms: 5_000,
            stale_time_ms: 60_000,
            enable_real_time: true,
            api: PlatformApiConfig::default(),
            events: EventStreamConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

/// Remote platform API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformApiConfig {
    /// Base URL for the governance platform API
    pub base_url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Authentication settings, if the platform requires them
    pub auth: Option<ApiAuthConfig>,
}

impl Default for PlatformApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 30_000,
            auth: None,
        }
    }
}

/// API authentication settings
///
/// Bearer tokens take precedence over API keys when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiAuthConfig {
    /// Pre-issued bearer token
    pub bearer_token: String,
    /// API key sent in a custom header
    pub api_key: String,
    /// Header name for the API key (defaults to X-API-Key)
    pub api_key_header: String,
}

/// Event stream connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStreamConfig {
    /// Path of the streaming endpoint relative to the API base URL
    pub endpoint: String,
    /// Base delay before the first reconnection attempt, in milliseconds
    pub initial_backoff_ms: u64,
    /// Reconnection delay ceiling in milliseconds
    pub max_backoff_ms: u64,
    /// Capacity of the fan-out channel to subscribers
    pub channel_capacity: usize,
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "/system/events".to_string(),
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            channel_capacity: 256,
        }
    }
}

/// Workflow execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Maximum number of log entries retained per execution (oldest evicted)
    pub log_capacity: usize,
    /// Ceiling applied to per-step retry backoff delays, in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            log_capacity: 200,
            max_retry_delay_ms: 30_000,
        }
    }
}

impl OrchestrationConfig {
    /// Load configuration from defaults, an optional file, and environment
    ///
    /// Environment variables use the `STEWARD_` prefix with `__` as the
    /// nesting separator, e.g. `STEWARD_API__BASE_URL`.
    pub fn load(config_file: Option<&Path>) -> StewardResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let merged = builder
            .add_source(config::Environment::with_prefix("STEWARD").separator("__"))
            .build()
            .map_err(|e| StewardError::config_error(format!("Failed to merge sources: {e}")))?;

        let config: OrchestrationConfig = merged
            .try_deserialize()
            .map_err(|e| StewardError::config_error(format!("Invalid configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the merged configuration as a whole
    pub fn validate(&self) -> StewardResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(StewardError::config_error("poll_interval_ms must be > 0"));
        }
        if self.api.base_url.is_empty() {
            return Err(StewardError::config_error("api.base_url must not be empty"));
        }
        if self.events.initial_backoff_ms == 0 {
            return Err(StewardError::config_error(
                "events.initial_backoff_ms must be > 0",
            ));
        }
        if self.events.max_backoff_ms < self.events.initial_backoff_ms {
            return Err(StewardError::config_error(
                "events.max_backoff_ms must be >= events.initial_backoff_ms",
            ));
        }
        if self.execution.log_capacity == 0 {
            return Err(StewardError::config_error(
                "execution.log_capacity must be > 0",
            ));
        }
        Ok(())
    }

    /// Poll interval as a `Duration`
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Staleness threshold as a `Duration`
    #[must_use]
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    /// Cache freshness window as a `Duration`
    #[must_use]
    pub fn cache_time(&self) -> Duration {
        Duration::from_millis(self.cache_time_ms)
    }
}
