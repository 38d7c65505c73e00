//! # Alert Aggregator
//!
//! Maintains the alert set, applies acknowledge/dismiss mutations
//! optimistically, and reconciles with server-confirmed state.
//!
//! Acknowledgement is modeled as a tagged state per alert rather than a
//! single boolean: `Confirmed` carries the server-confirmed value, `Pending`
//! carries both the optimistic value and the rollback target, so a failed
//! server call has an unambiguous state to restore.
//!
//! Dismiss is local-only: the platform has no dismissal endpoint, so a
//! dismissed alert disappears from this session's view but will not be
//! removed server-side. This asymmetry with acknowledge is intentional.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::client::types::{AlertRecord, AlertSeverity};
use crate::error::{StewardError, StewardResult};

/// Acknowledgement state of one alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum AckState {
    /// Server-confirmed acknowledgement value
    Confirmed { acknowledged: bool },
    /// Optimistic local value with the rollback target for a failed call
    Pending { optimistic: bool, rollback: bool },
}

impl AckState {
    /// The value consumers observe, optimistic or confirmed
    #[must_use]
    pub fn observed(&self) -> bool {
        match self {
            Self::Confirmed { acknowledged } => *acknowledged,
            Self::Pending { optimistic, .. } => *optimistic,
        }
    }
}

/// One alert as exposed to consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAlert {
    pub id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub source_group: String,
    pub ack: AckState,
    pub timestamp: DateTime<Utc>,
}

impl SystemAlert {
    /// Whether the alert is acknowledged from the consumer's point of view
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.ack.observed()
    }

    fn from_record(record: AlertRecord) -> Self {
        Self {
            id: record.id,
            severity: record.severity,
            title: record.title,
            description: record.description,
            source_group: record.source_group,
            ack: AckState::Confirmed {
                acknowledged: record.is_acknowledged,
            },
            timestamp: record.timestamp,
        }
    }
}

/// Aggregator over the current alert set, ordered most-recent-first
#[derive(Debug, Default)]
pub struct AlertAggregator {
    alerts: RwLock<Vec<SystemAlert>>,
}

impl AlertAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the alert set with server-confirmed state.
    ///
    /// Authoritative fetches win over optimistic local state: an in-flight
    /// acknowledgement will re-apply its confirmed value when its server
    /// call resolves.
    pub async fn replace_all(&self, records: Vec<AlertRecord>) {
        let mut alerts: Vec<SystemAlert> = records.into_iter().map(SystemAlert::from_record).collect();
        // Most-recent-first ordering is part of the contract
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut guard = self.alerts.write().await;
        debug!(count = alerts.len(), "Replaced alert set from authoritative fetch");
        *guard = alerts;
    }

    /// Prepend a newly pushed alert; an existing alert with the same id is
    /// superseded. Returns the stored alert for notification decisions.
    pub async fn push_alert(&self, record: AlertRecord) -> SystemAlert {
        let alert = SystemAlert::from_record(record);
        let mut guard = self.alerts.write().await;
        guard.retain(|existing| existing.id != alert.id);
        guard.insert(0, alert.clone());
        alert
    }

    /// Apply the optimistic half of an acknowledgement.
    ///
    /// Returns `true` when a server call is required; acknowledging an
    /// already-acknowledged alert is idempotent and returns `false` without
    /// touching state.
    pub async fn begin_acknowledge(&self, alert_id: &str) -> StewardResult<bool> {
        let mut guard = self.alerts.write().await;
        let alert = guard
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| StewardError::AlertNotFound {
                alert_id: alert_id.to_string(),
            })?;

        if alert.ack.observed() {
            debug!(alert_id, "Acknowledge is a no-op: already acknowledged");
            return Ok(false);
        }

        let rollback = match alert.ack {
            AckState::Confirmed { acknowledged } => acknowledged,
            AckState::Pending { rollback, .. } => rollback,
        };
        alert.ack = AckState::Pending {
            optimistic: true,
            rollback,
        };
        Ok(true)
    }

    /// Promote a pending acknowledgement to server-confirmed.
    pub async fn confirm_acknowledge(&self, alert_id: &str) {
        let mut guard = self.alerts.write().await;
        if let Some(alert) = guard.iter_mut().find(|a| a.id == alert_id) {
            alert.ack = AckState::Confirmed { acknowledged: true };
        }
    }

    /// Roll a failed acknowledgement back to its pre-mutation value.
    pub async fn rollback_acknowledge(&self, alert_id: &str) {
        let mut guard = self.alerts.write().await;
        if let Some(alert) = guard.iter_mut().find(|a| a.id == alert_id) {
            if let AckState::Pending { rollback, .. } = alert.ack {
                warn!(alert_id, "Rolling back optimistic acknowledgement");
                alert.ack = AckState::Confirmed {
                    acknowledged: rollback,
                };
            }
        }
    }

    /// Remove an alert from this session's view. Local-only: the platform
    /// keeps no dismissal state, so the alert may reappear on the next
    /// authoritative fetch or push.
    pub async fn dismiss(&self, alert_id: &str) -> StewardResult<()> {
        let mut guard = self.alerts.write().await;
        let before = guard.len();
        guard.retain(|a| a.id != alert_id);
        if guard.len() == before {
            return Err(StewardError::AlertNotFound {
                alert_id: alert_id.to_string(),
            });
        }
        Ok(())
    }

    /// Snapshot of the full alert set, most-recent-first
    pub async fn all(&self) -> Vec<SystemAlert> {
        self.alerts.read().await.clone()
    }

    /// Critical alerts; pure filter recomputed on read
    pub async fn critical(&self) -> Vec<SystemAlert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| a.severity == AlertSeverity::Critical)
            .cloned()
            .collect()
    }

    /// Unacknowledged alerts; pure filter recomputed on read
    pub async fn unacknowledged(&self) -> Vec<SystemAlert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| !a.is_acknowledged())
            .cloned()
            .collect()
    }

    /// Severities of unacknowledged alerts, as input to health derivation
    pub async fn unacknowledged_severities(&self) -> Vec<AlertSeverity> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| !a.is_acknowledged())
            .map(|a| a.severity)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, severity: AlertSeverity, acknowledged: bool, minute: u32) -> AlertRecord {
        AlertRecord {
            id: id.to_string(),
            severity,
            title: format!("alert {id}"),
            description: String::new(),
            source_group: "scan".to_string(),
            is_acknowledged: acknowledged,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 5, 10, minute, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_pushed_alerts_are_most_recent_first() {
        let aggregator = AlertAggregator::new();
        aggregator.push_alert(record("a", AlertSeverity::Low, false, 0)).await;
        aggregator.push_alert(record("b", AlertSeverity::High, false, 1)).await;

        let alerts = aggregator.all().await;
        assert_eq!(alerts[0].id, "b");
        assert_eq!(alerts[1].id, "a");
    }

    #[tokio::test]
    async fn test_pushed_alert_supersedes_same_id() {
        let aggregator = AlertAggregator::new();
        aggregator.push_alert(record("a", AlertSeverity::Low, false, 0)).await;
        aggregator.push_alert(record("a", AlertSeverity::Critical, false, 1)).await;

        let alerts = aggregator.all().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn test_acknowledge_is_idempotent() {
        let aggregator = AlertAggregator::new();
        aggregator.push_alert(record("a", AlertSeverity::High, false, 0)).await;

        assert!(aggregator.begin_acknowledge("a").await.unwrap());
        aggregator.confirm_acknowledge("a").await;

        // Second acknowledge of confirmed state issues no server call
        assert!(!aggregator.begin_acknowledge("a").await.unwrap());
        assert!(aggregator.all().await[0].is_acknowledged());
    }

    #[tokio::test]
    async fn test_pending_acknowledge_observes_optimistic_value() {
        let aggregator = AlertAggregator::new();
        aggregator.push_alert(record("a", AlertSeverity::High, false, 0)).await;

        aggregator.begin_acknowledge("a").await.unwrap();
        assert!(aggregator.all().await[0].is_acknowledged());
        assert!(aggregator.unacknowledged().await.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_restores_pre_mutation_value() {
        let aggregator = AlertAggregator::new();
        aggregator.push_alert(record("a", AlertSeverity::High, false, 0)).await;

        aggregator.begin_acknowledge("a").await.unwrap();
        aggregator.rollback_acknowledge("a").await;

        let alert = &aggregator.all().await[0];
        assert!(!alert.is_acknowledged());
        assert_eq!(
            alert.ack,
            AckState::Confirmed {
                acknowledged: false
            }
        );
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_alert_errors() {
        let aggregator = AlertAggregator::new();
        assert!(matches!(
            aggregator.begin_acknowledge("missing").await,
            Err(StewardError::AlertNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_dismiss_removes_locally() {
        let aggregator = AlertAggregator::new();
        aggregator.push_alert(record("a", AlertSeverity::Low, false, 0)).await;

        aggregator.dismiss("a").await.unwrap();
        assert!(aggregator.all().await.is_empty());
        assert!(aggregator.dismiss("a").await.is_err());
    }

    #[tokio::test]
    async fn test_replace_all_reconciles_optimistic_state() {
        let aggregator = AlertAggregator::new();
        aggregator.push_alert(record("a", AlertSeverity::High, false, 0)).await;
        aggregator.begin_acknowledge("a").await.unwrap();

        // Authoritative fetch still reports the alert unacknowledged
        aggregator
            .replace_all(vec![record("a", AlertSeverity::High, false, 0)])
            .await;

        let alert = &aggregator.all().await[0];
        assert_eq!(
            alert.ack,
            AckState::Confirmed {
                acknowledged: false
            }
        );
    }

    #[tokio::test]
    async fn test_derived_views_are_pure_filters() {
        let aggregator = AlertAggregator::new();
        aggregator.push_alert(record("a", AlertSeverity::Critical, false, 0)).await;
        aggregator.push_alert(record("b", AlertSeverity::Low, true, 1)).await;

        assert_eq!(aggregator.critical().await.len(), 1);
        assert_eq!(aggregator.unacknowledged().await.len(), 1);
        assert_eq!(
            aggregator.unacknowledged_severities().await,
            vec![AlertSeverity::Critical]
        );
        // Recomputing yields the same result
        assert_eq!(aggregator.critical().await.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_all_sorts_most_recent_first() {
        let aggregator = AlertAggregator::new();
        aggregator
            .replace_all(vec![
                record("old", AlertSeverity::Low, false, 0),
                record("new", AlertSeverity::Low, false, 5),
            ])
            .await;

        let alerts = aggregator.all().await;
        assert_eq!(alerts[0].id, "new");
    }
}
