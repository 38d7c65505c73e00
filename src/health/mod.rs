//! # Health Reconciler
//!
//! Merges periodic polled health snapshots with pushed updates into one
//! authoritative [`SystemHealthSummary`]. Both channels produce full
//! snapshots that replace the cached state wholesale (last full snapshot
//! wins), which rules out partial-state drift between the two sources.
//!
//! The overall status is never stored: it is derived on every read from the
//! current group map and the unacknowledged alert set.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::client::types::{AlertSeverity, GroupStatus};

/// Overall system health, derived from group statuses and open alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Which channel produced the cached snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Poll,
    Push,
}

/// Authoritative reconciled view of system health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthSummary {
    /// Derived overall status; never stored independently of its inputs
    pub overall_status: HealthStatus,
    /// Per-group operational status from the latest full snapshot
    pub group_statuses: HashMap<String, GroupStatus>,
    pub healthy_groups: usize,
    pub total_groups: usize,
    /// Timestamp of the last reconciliation, if any snapshot has arrived
    pub last_updated: Option<DateTime<Utc>>,
    /// Set when the snapshot has outlived the staleness window with no live
    /// push connection; the summary is still served, only flagged
    pub stale: bool,
}

/// Derive the overall status from its inputs.
///
/// Pure function: `Critical` iff any unacknowledged critical alert exists;
/// else `Degraded` iff any unacknowledged high alert exists or any group is
/// non-healthy; else `Healthy`.
#[must_use]
pub fn derive_overall(
    groups: &HashMap<String, GroupStatus>,
    unacknowledged: &[AlertSeverity],
) -> HealthStatus {
    if unacknowledged
        .iter()
        .any(|s| *s == AlertSeverity::Critical)
    {
        return HealthStatus::Critical;
    }

    let has_high_alert = unacknowledged.iter().any(|s| *s == AlertSeverity::High);
    let all_groups_healthy = groups.values().all(GroupStatus::is_healthy);

    if has_high_alert || !all_groups_healthy {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    groups: HashMap<String, GroupStatus>,
    received_at: DateTime<Utc>,
    source: SnapshotSource,
}

/// Single-writer cache of the latest full health snapshot
#[derive(Debug, Default)]
pub struct HealthReconciler {
    snapshot: RwLock<Option<CachedSnapshot>>,
}

impl HealthReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached snapshot wholesale.
    ///
    /// Applied identically for polled and pushed snapshots; a pushed update
    /// is treated as a newer full snapshot, not a patch.
    pub async fn apply_snapshot(&self, groups: HashMap<String, GroupStatus>, source: SnapshotSource) {
        let mut guard = self.snapshot.write().await;
        debug!(
            groups = groups.len(),
            source = ?source,
            "Replacing cached health snapshot"
        );
        *guard = Some(CachedSnapshot {
            groups,
            received_at: Utc::now(),
            source,
        });
    }

    /// Timestamp of the last reconciliation
    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.as_ref().map(|s| s.received_at)
    }

    /// Whether the cached snapshot is younger than the given window
    pub async fn is_fresh(&self, window: Duration) -> bool {
        match self.snapshot.read().await.as_ref() {
            Some(snapshot) => {
                let age = Utc::now().signed_duration_since(snapshot.received_at);
                age.to_std().map(|age| age < window).unwrap_or(true)
            }
            None => false,
        }
    }

    /// Build the reconciled summary.
    ///
    /// `unacknowledged` carries the severities of currently unacknowledged
    /// alerts; `stale_after` is the staleness window (2x the poll interval
    /// by default); `push_connected` suppresses the stale flag since a live
    /// push channel keeps the snapshot authoritative regardless of age.
    pub async fn summary(
        &self,
        unacknowledged: &[AlertSeverity],
        stale_after: Duration,
        push_connected: bool,
    ) -> SystemHealthSummary {
        let guard = self.snapshot.read().await;

        let (groups, last_updated) = match guard.as_ref() {
            Some(snapshot) => (snapshot.groups.clone(), Some(snapshot.received_at)),
            None => (HashMap::new(), None),
        };

        let stale = match last_updated {
            Some(at) if !push_connected => Utc::now()
                .signed_duration_since(at)
                .to_std()
                .map(|age| age > stale_after)
                .unwrap_or(false),
            Some(_) => false,
            None => !push_connected,
        };

        let healthy_groups = groups.values().filter(|s| s.is_healthy()).count();
        let total_groups = groups.len();
        let overall_status = derive_overall(&groups, unacknowledged);

        SystemHealthSummary {
            overall_status,
            group_statuses: groups,
            healthy_groups,
            total_groups,
            last_updated,
            stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(entries: &[(&str, GroupStatus)]) -> HashMap<String, GroupStatus> {
        entries
            .iter()
            .map(|(name, status)| (name.to_string(), *status))
            .collect()
    }

    #[test]
    fn test_all_healthy_no_alerts_is_healthy() {
        let map = groups(&[
            ("scan", GroupStatus::Healthy),
            ("catalog", GroupStatus::Healthy),
        ]);
        assert_eq!(derive_overall(&map, &[]), HealthStatus::Healthy);
    }

    #[test]
    fn test_degraded_group_with_high_alert_is_degraded() {
        let map = groups(&[
            ("scan", GroupStatus::Healthy),
            ("catalog", GroupStatus::Degraded),
        ]);
        let alerts = vec![AlertSeverity::High];
        assert_eq!(derive_overall(&map, &alerts), HealthStatus::Degraded);
    }

    #[test]
    fn test_critical_alert_dominates_group_statuses() {
        let map = groups(&[
            ("scan", GroupStatus::Healthy),
            ("catalog", GroupStatus::Degraded),
        ]);
        let alerts = vec![AlertSeverity::Critical];
        assert_eq!(derive_overall(&map, &alerts), HealthStatus::Critical);
    }

    #[test]
    fn test_unhealthy_group_alone_degrades() {
        let map = groups(&[("scan", GroupStatus::Unhealthy)]);
        assert_eq!(derive_overall(&map, &[]), HealthStatus::Degraded);
    }

    #[test]
    fn test_low_and_medium_alerts_do_not_degrade() {
        let map = groups(&[("scan", GroupStatus::Healthy)]);
        let alerts = vec![AlertSeverity::Low, AlertSeverity::Medium];
        assert_eq!(derive_overall(&map, &alerts), HealthStatus::Healthy);
    }

    #[test]
    fn test_derivation_is_pure() {
        let map = groups(&[("scan", GroupStatus::Degraded)]);
        let alerts = vec![AlertSeverity::High];
        let first = derive_overall(&map, &alerts);
        let second = derive_overall(&map, &alerts);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_snapshot_replaced_wholesale() {
        let reconciler = HealthReconciler::new();
        reconciler
            .apply_snapshot(
                groups(&[("scan", GroupStatus::Healthy), ("catalog", GroupStatus::Healthy)]),
                SnapshotSource::Poll,
            )
            .await;
        // A pushed snapshot missing a group removes it rather than merging
        reconciler
            .apply_snapshot(groups(&[("scan", GroupStatus::Degraded)]), SnapshotSource::Push)
            .await;

        let summary = reconciler
            .summary(&[], Duration::from_secs(60), true)
            .await;
        assert_eq!(summary.total_groups, 1);
        assert_eq!(summary.healthy_groups, 0);
        assert_eq!(summary.overall_status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_summary_without_snapshot_is_stale_and_empty() {
        let reconciler = HealthReconciler::new();
        let summary = reconciler
            .summary(&[], Duration::from_secs(60), false)
            .await;
        assert_eq!(summary.total_groups, 0);
        assert!(summary.stale);
        assert!(summary.last_updated.is_none());
        assert_eq!(summary.overall_status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_live_push_connection_suppresses_staleness() {
        let reconciler = HealthReconciler::new();
        reconciler
            .apply_snapshot(groups(&[("scan", GroupStatus::Healthy)]), SnapshotSource::Push)
            .await;

        let summary = reconciler
            .summary(&[], Duration::from_secs(0), true)
            .await;
        assert!(!summary.stale);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn severity_strategy() -> impl Strategy<Value = AlertSeverity> {
            prop_oneof![
                Just(AlertSeverity::Critical),
                Just(AlertSeverity::High),
                Just(AlertSeverity::Medium),
                Just(AlertSeverity::Low),
            ]
        }

        fn status_strategy() -> impl Strategy<Value = GroupStatus> {
            prop_oneof![
                Just(GroupStatus::Healthy),
                Just(GroupStatus::Degraded),
                Just(GroupStatus::Unhealthy),
            ]
        }

        proptest! {
            #[test]
            fn critical_alert_always_dominates(
                statuses in proptest::collection::hash_map("[a-z]{1,8}", status_strategy(), 0..6),
                mut severities in proptest::collection::vec(severity_strategy(), 0..6),
            ) {
                severities.push(AlertSeverity::Critical);
                prop_assert_eq!(derive_overall(&statuses, &severities), HealthStatus::Critical);
            }

            #[test]
            fn derivation_has_no_hidden_state(
                statuses in proptest::collection::hash_map("[a-z]{1,8}", status_strategy(), 0..6),
                severities in proptest::collection::vec(severity_strategy(), 0..6),
            ) {
                let first = derive_overall(&statuses, &severities);
                let second = derive_overall(&statuses, &severities);
                prop_assert_eq!(first, second);
            }
        }
    }
}
