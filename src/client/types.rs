//! Wire types for the governance platform API.
//!
//! Payload shapes belong to the remote platform; these types normalize the
//! envelopes the orchestration core actually consumes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status reported by the platform for an individual governance group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Group is operating normally
    Healthy,
    /// Group is operational with reduced capacity or elevated errors
    Degraded,
    /// Group is failing or unreachable
    Unhealthy,
}

impl GroupStatus {
    /// Check whether the group counts toward the healthy total
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Full health snapshot returned by `GET /system/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformHealth {
    /// Per-group operational status
    #[serde(default)]
    pub groups: HashMap<String, GroupStatus>,
    /// Server-side generation timestamp
    pub generated_at: DateTime<Utc>,
}

/// Alert severity levels, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Alert as delivered by the server (REST list or push frame)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub severity: AlertSeverity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Governance group that raised the alert
    pub source_group: String,
    #[serde(default)]
    pub is_acknowledged: bool,
    pub timestamp: DateTime<Utc>,
}

/// Server receipt for an acknowledgement mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckReceipt {
    pub alert_id: String,
    pub acknowledged: bool,
}

/// Query parameters for `GET /performance/analytics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    /// Time range token understood by the platform (e.g. "1h", "24h")
    pub time_range: String,
    /// Aggregation interval token (e.g. "1m", "5m")
    pub interval: String,
}

impl Default for AnalyticsQuery {
    fn default() -> Self {
        Self {
            time_range: "1h".to_string(),
            interval: "1m".to_string(),
        }
    }
}

/// Scalar metrics snapshot from analytics polling or a push frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub average_latency_ms: f64,
    #[serde(default)]
    pub throughput: f64,
    #[serde(default)]
    pub error_rate: f64,
    #[serde(default = "full_availability")]
    pub availability: f64,
    pub generated_at: DateTime<Utc>,
}

fn full_availability() -> f64 {
    100.0
}

/// Body for the generic step-invocation endpoint `POST /{group}/{operation}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInvocation {
    pub service_id: String,
    pub operation: String,
    pub parameters: Value,
}
