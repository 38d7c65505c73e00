//! Typed event frames and connection state for the push channel.

use serde::{Deserialize, Serialize};

use crate::client::types::{AlertRecord, MetricsSnapshot, PlatformHealth};

/// Connection state of the push event channel.
///
/// Governs whether polling or push is the active source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Typed messages delivered over the persistent event channel.
///
/// Wire frames are tagged JSON objects: `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Full health snapshot replacing the cached one wholesale
    SystemHealthUpdate(PlatformHealth),
    /// A new alert raised by the platform
    SystemAlert(AlertRecord),
    /// Incremental metrics sample
    RealtimeMetrics(MetricsSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_frame_deserialization() {
        let frame = r#"{
            "type": "system_alert",
            "payload": {
                "id": "alert-9",
                "severity": "critical",
                "title": "Scan backlog",
                "source_group": "scan",
                "timestamp": "2026-01-05T10:00:00Z"
            }
        }"#;
        let event: StreamEvent = serde_json::from_str(frame).unwrap();
        match event {
            StreamEvent::SystemAlert(alert) => {
                assert_eq!(alert.id, "alert-9");
                assert!(!alert.is_acknowledged);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_health_frame_deserialization() {
        let frame = r#"{
            "type": "system_health_update",
            "payload": {
                "groups": {"scan": "healthy", "catalog": "degraded"},
                "generated_at": "2026-01-05T10:00:00Z"
            }
        }"#;
        let event: StreamEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, StreamEvent::SystemHealthUpdate(_)));
    }
}
