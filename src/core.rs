//! # Orchestration Core
//!
//! The single entry point consumers use. Composes the transport client,
//! event stream manager, health reconciler, alert aggregator, metrics
//! collector, and workflow executor, and exposes refresh/acknowledge/
//! execute/cancel operations plus derived read-only views.
//!
//! One core instance is constructed at session start and passed by
//! reference to all consumers; `shutdown()` tears down the event-stream
//! connection and every background task.
//!
//! Mutation entry points are serialized per entity: the health snapshot and
//! alert set are written only through this facade or its background tasks,
//! and each workflow execution record is written only by its owning
//! executor task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerts::{AlertAggregator, SystemAlert};
use crate::client::types::{AlertSeverity, AnalyticsQuery};
use crate::client::{PlatformApiClient, PlatformTransport};
use crate::config::OrchestrationConfig;
use crate::error::{StewardError, StewardResult};
use crate::events::{
    ConnectionState, EventStreamManager, EventTransport, HttpEventTransport, StreamEvent,
};
use crate::health::{HealthReconciler, SnapshotSource, SystemHealthSummary};
use crate::metrics::{MetricsCollector, PerformanceMetrics};
use crate::workflow::{
    ExecutionCommand, SnapshotSink, WorkflowExecution, WorkflowExecutor, WorkflowStatus,
    WorkflowStep,
};

/// Retained orchestration fault records
const FAULT_CAPACITY: usize = 100;

/// User-facing notification side effects.
///
/// Distinct from stored state: a critical alert arriving over push and a
/// workflow reaching a terminal state produce one notification each; all
/// other errors land in the inspectable fault list instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    CriticalAlert { alert_id: String, title: String },
    WorkflowCompleted { workflow_id: String },
    WorkflowFailed { workflow_id: String, error: String },
    WorkflowCancelled { workflow_id: String },
}

/// One recorded orchestration error, inspectable by consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationFault {
    pub at: DateTime<Utc>,
    /// Subsystem that recorded the fault
    pub source: String,
    pub message: String,
}

struct ExecutionEntry {
    snapshot: WorkflowExecution,
    commands: watch::Sender<ExecutionCommand>,
    task: Option<JoinHandle<()>>,
}

/// Orchestration facade composing all engine components
pub struct OrchestrationCore {
    config: OrchestrationConfig,
    transport: Arc<dyn PlatformTransport>,
    stream: Arc<EventStreamManager>,
    health: Arc<HealthReconciler>,
    alerts: Arc<AlertAggregator>,
    metrics: Arc<MetricsCollector>,
    executor: Arc<WorkflowExecutor>,
    executions: Arc<DashMap<String, ExecutionEntry>>,
    notifications_tx: broadcast::Sender<Notification>,
    faults: Arc<RwLock<Vec<OrchestrationFault>>>,
    background: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    real_time: Arc<AtomicBool>,
}

impl std::fmt::Debug for OrchestrationCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationCore")
            .field("executions", &self.executions.len())
            .field("connection_state", &self.stream.state())
            .field("real_time", &self.real_time.load(Ordering::Relaxed))
            .finish()
    }
}

impl OrchestrationCore {
    /// Build a core against the configured platform endpoints.
    pub fn new(config: OrchestrationConfig) -> StewardResult<Self> {
        config.validate()?;
        let transport: Arc<dyn PlatformTransport> = Arc::new(PlatformApiClient::new(
            config.api.clone(),
            config.retry_attempts,
        )?);
        let event_transport: Arc<dyn EventTransport> =
            Arc::new(HttpEventTransport::new(&config.api, &config.events)?);
        Ok(Self::with_transports(config, transport, event_transport))
    }

    /// Build a core over explicit transports.
    ///
    /// This is the composition seam: tests (and alternative deployments)
    /// substitute their own request/response and push transports here.
    pub fn with_transports(
        config: OrchestrationConfig,
        transport: Arc<dyn PlatformTransport>,
        event_transport: Arc<dyn EventTransport>,
    ) -> Self {
        let stream = Arc::new(EventStreamManager::new(
            event_transport,
            config.events.clone(),
        ));
        let metrics = Arc::new(MetricsCollector::default());
        let executor = Arc::new(WorkflowExecutor::new(
            Arc::clone(&transport),
            Arc::clone(&metrics),
            config.execution.clone(),
        ));
        let (notifications_tx, _) = broadcast::channel(64);

        Self {
            real_time: Arc::new(AtomicBool::new(config.enable_real_time)),
            config,
            transport,
            stream,
            health: Arc::new(HealthReconciler::new()),
            alerts: Arc::new(AlertAggregator::new()),
            metrics,
            executor,
            executions: Arc::new(DashMap::new()),
            notifications_tx,
            faults: Arc::new(RwLock::new(Vec::new())),
            background: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Start background reconciliation: health polling, metrics polling,
    /// and push-event routing. Idempotent; call once at session start.
    pub fn start(&self) {
        let mut guard = self.background.lock();
        if !guard.is_empty() {
            debug!("start() ignored: background tasks already running");
            return;
        }

        guard.push(tokio::spawn(health_poll_loop(
            Arc::clone(&self.transport),
            Arc::clone(&self.health),
            Arc::clone(&self.alerts),
            Arc::clone(&self.stream),
            Arc::clone(&self.faults),
            Arc::clone(&self.real_time),
            self.config.clone(),
        )));
        guard.push(tokio::spawn(metrics_poll_loop(
            Arc::clone(&self.transport),
            Arc::clone(&self.metrics),
            Arc::clone(&self.stream),
            Arc::clone(&self.faults),
            Arc::clone(&self.real_time),
            self.config.clone(),
        )));
        guard.push(tokio::spawn(route_stream_events(
            self.stream.subscribe(),
            Arc::clone(&self.health),
            Arc::clone(&self.alerts),
            Arc::clone(&self.metrics),
            self.notifications_tx.clone(),
        )));

        if self.config.enable_real_time {
            self.stream.connect();
        }
        info!("Orchestration core started");
    }

    /// Tear down the core: cancel executions cooperatively, dispose the
    /// event-stream connection, and abort all background tasks.
    pub fn shutdown(&self) {
        for entry in self.executions.iter() {
            let _ = entry.commands.send(ExecutionCommand::Cancel);
        }
        self.stream.disconnect();
        for task in self.background.lock().drain(..) {
            task.abort();
        }
        info!("Orchestration core shut down");
    }

    // ===================================================================================
    // HEALTH & ALERTS
    // ===================================================================================

    /// Refresh health, status, and alerts from the platform.
    ///
    /// A snapshot younger than the configured cache window satisfies the
    /// refresh without a network round trip; use `trigger_health_check`
    /// to force one.
    pub async fn refresh_system_health(&self) -> StewardResult<SystemHealthSummary> {
        if !self.health.is_fresh(self.config.cache_time()).await {
            refresh_from_platform(self.transport.as_ref(), &self.health, &self.alerts).await?;
        }
        Ok(self.system_health().await)
    }

    /// On-demand health probe outside the poll cadence; bypasses the cache
    /// window.
    pub async fn trigger_health_check(&self) -> StewardResult<SystemHealthSummary> {
        debug!("On-demand health check triggered");
        refresh_from_platform(self.transport.as_ref(), &self.health, &self.alerts).await?;
        Ok(self.system_health().await)
    }

    /// Reconciled health summary; overall status derived on read
    pub async fn system_health(&self) -> SystemHealthSummary {
        let severities = self.alerts.unacknowledged_severities().await;
        self.health
            .summary(
                &severities,
                self.config.stale_time(),
                self.stream.is_connected(),
            )
            .await
    }

    /// Acknowledge an alert: optimistic local update plus authoritative
    /// server call, rolled back if the call fails. Idempotent for alerts
    /// already acknowledged.
    pub async fn acknowledge_alert(&self, alert_id: &str) -> StewardResult<()> {
        let needs_call = self.alerts.begin_acknowledge(alert_id).await?;
        if !needs_call {
            return Ok(());
        }

        match self.transport.acknowledge_alert(alert_id).await {
            Ok(receipt) if receipt.acknowledged => {
                self.alerts.confirm_acknowledge(alert_id).await;
                Ok(())
            }
            Ok(_) => {
                self.alerts.rollback_acknowledge(alert_id).await;
                let err = StewardError::AcknowledgeRejected {
                    alert_id: alert_id.to_string(),
                    message: "server declined acknowledgement".to_string(),
                };
                self.record_fault("acknowledge", &err.to_string()).await;
                Err(err)
            }
            // Server-side rejection is a mutation conflict, reported
            // distinctly from a pure network error
            Err(StewardError::Api { status, message }) => {
                self.alerts.rollback_acknowledge(alert_id).await;
                let err = StewardError::AcknowledgeRejected {
                    alert_id: alert_id.to_string(),
                    message: format!("HTTP {status}: {message}"),
                };
                self.record_fault("acknowledge", &err.to_string()).await;
                Err(err)
            }
            Err(e) => {
                self.alerts.rollback_acknowledge(alert_id).await;
                self.record_fault("acknowledge", &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Dismiss an alert from this session's view.
    ///
    /// Local-only by design: the platform has no dismissal endpoint, so the
    /// alert may reappear on the next authoritative fetch.
    pub async fn dismiss_alert(&self, alert_id: &str) -> StewardResult<()> {
        self.alerts.dismiss(alert_id).await
    }

    /// Full alert set, most-recent-first
    pub async fn alerts(&self) -> Vec<SystemAlert> {
        self.alerts.all().await
    }

    /// Critical alerts; recomputed on read
    pub async fn critical_alerts(&self) -> Vec<SystemAlert> {
        self.alerts.critical().await
    }

    /// Unacknowledged alerts; recomputed on read
    pub async fn unacknowledged_alerts(&self) -> Vec<SystemAlert> {
        self.alerts.unacknowledged().await
    }

    // ===================================================================================
    // WORKFLOWS
    // ===================================================================================

    /// Start executing a workflow.
    ///
    /// Steps run strictly sequentially on a dedicated task; the returned
    /// record is the initial snapshot. A second call for an id whose
    /// execution is still in flight is rejected. Terminal executions are
    /// retained (and their ids reusable) until `clear_execution`.
    pub fn execute_workflow(
        &self,
        workflow_id: &str,
        steps: Vec<WorkflowStep>,
        parameters: Value,
    ) -> StewardResult<WorkflowExecution> {
        if steps.is_empty() {
            return Err(StewardError::InvalidWorkflow(
                "workflow has no steps".to_string(),
            ));
        }
        if let Some(entry) = self.executions.get(workflow_id) {
            if !entry.snapshot.status.is_terminal() {
                return Err(StewardError::WorkflowAlreadyRunning {
                    workflow_id: workflow_id.to_string(),
                });
            }
        }

        let execution = WorkflowExecution::new(workflow_id, &steps);
        let (cmd_tx, cmd_rx) = watch::channel(ExecutionCommand::Run);
        self.executions.insert(
            workflow_id.to_string(),
            ExecutionEntry {
                snapshot: execution.clone(),
                commands: cmd_tx,
                task: None,
            },
        );

        let executor = Arc::clone(&self.executor);
        let executions = Arc::clone(&self.executions);
        let notifications = self.notifications_tx.clone();
        let id = workflow_id.to_string();
        let initial = execution.clone();

        let task = tokio::spawn(async move {
            let sink: SnapshotSink = {
                let executions = Arc::clone(&executions);
                let id = id.clone();
                Arc::new(move |snapshot: WorkflowExecution| {
                    if let Some(mut entry) = executions.get_mut(&id) {
                        entry.snapshot = snapshot;
                    }
                })
            };

            let final_state = executor.run(initial, &steps, &parameters, cmd_rx, sink).await;

            let note = match final_state.status {
                WorkflowStatus::Completed => Some(Notification::WorkflowCompleted {
                    workflow_id: id.clone(),
                }),
                WorkflowStatus::Failed => Some(Notification::WorkflowFailed {
                    workflow_id: id.clone(),
                    error: final_state.errors.last().cloned().unwrap_or_default(),
                }),
                WorkflowStatus::Cancelled => Some(Notification::WorkflowCancelled {
                    workflow_id: id.clone(),
                }),
                _ => None,
            };
            if let Some(note) = note {
                let _ = notifications.send(note);
            }
        });

        if let Some(mut entry) = self.executions.get_mut(workflow_id) {
            entry.task = Some(task);
        }

        Ok(execution)
    }

    /// Pause a workflow before its next step; the in-flight step call runs
    /// to completion first.
    pub fn pause_workflow(&self, workflow_id: &str) -> StewardResult<()> {
        self.send_command(workflow_id, ExecutionCommand::Pause)
    }

    /// Resume a paused workflow.
    pub fn resume_workflow(&self, workflow_id: &str) -> StewardResult<()> {
        self.send_command(workflow_id, ExecutionCommand::Run)
    }

    /// Cancel a workflow cooperatively: the command is observed between
    /// steps, never mid-call.
    pub fn cancel_workflow(&self, workflow_id: &str) -> StewardResult<()> {
        self.send_command(workflow_id, ExecutionCommand::Cancel)
    }

    fn send_command(&self, workflow_id: &str, command: ExecutionCommand) -> StewardResult<()> {
        let entry = self
            .executions
            .get(workflow_id)
            .ok_or_else(|| StewardError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })?;
        // A command to a terminal execution has no receiver left; harmless
        let _ = entry.commands.send(command);
        Ok(())
    }

    /// Remove a terminal execution record
    pub fn clear_execution(&self, workflow_id: &str) -> StewardResult<WorkflowExecution> {
        let terminal = match self.executions.get(workflow_id) {
            Some(entry) => entry.snapshot.status.is_terminal(),
            None => {
                return Err(StewardError::WorkflowNotFound {
                    workflow_id: workflow_id.to_string(),
                })
            }
        };
        if !terminal {
            return Err(StewardError::InvalidWorkflow(format!(
                "workflow {workflow_id} is still active"
            )));
        }
        let (_, entry) = self
            .executions
            .remove(workflow_id)
            .ok_or_else(|| StewardError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })?;
        Ok(entry.snapshot)
    }

    /// Snapshots of all retained executions
    pub fn active_executions(&self) -> Vec<WorkflowExecution> {
        self.executions
            .iter()
            .map(|entry| entry.snapshot.clone())
            .collect()
    }

    /// Snapshot of one execution
    pub fn execution(&self, workflow_id: &str) -> Option<WorkflowExecution> {
        self.executions
            .get(workflow_id)
            .map(|entry| entry.snapshot.clone())
    }

    // ===================================================================================
    // METRICS, CONNECTIVITY, NOTIFICATIONS
    // ===================================================================================

    /// Rolling performance view
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.metrics.performance()
    }

    /// Switch to push as the active source of truth
    pub fn enable_real_time(&self) {
        self.real_time.store(true, Ordering::Relaxed);
        self.stream.connect();
    }

    /// Fall back to polling; closes the push connection
    pub fn disable_real_time(&self) {
        self.real_time.store(false, Ordering::Relaxed);
        self.stream.disconnect();
    }

    /// Current push-channel state
    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    /// Subscribe to user-facing notifications
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications_tx.subscribe()
    }

    /// Subscribe to raw typed push events
    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.stream.subscribe()
    }

    /// Inspectable orchestration fault list, oldest first
    pub async fn faults(&self) -> Vec<OrchestrationFault> {
        self.faults.read().await.clone()
    }

    async fn record_fault(&self, source: &str, message: &str) {
        push_fault(&self.faults, source, message).await;
    }
}

impl Drop for OrchestrationCore {
    fn drop(&mut self) {
        for entry in self.executions.iter() {
            if let Some(task) = &entry.task {
                task.abort();
            }
        }
        for task in self.background.lock().drain(..) {
            task.abort();
        }
    }
}

/// Fetch health, status, and alerts and apply them wholesale.
async fn refresh_from_platform(
    transport: &dyn PlatformTransport,
    health: &HealthReconciler,
    alerts: &AlertAggregator,
) -> StewardResult<()> {
    let (platform_health, status_map, alert_records) = tokio::try_join!(
        transport.fetch_health(),
        transport.fetch_group_status(),
        transport.fetch_alerts(None, Some(100)),
    )?;

    // The dedicated status endpoint is the finer-grained source; its
    // entries win over the health snapshot's on collision
    let mut groups = platform_health.groups;
    groups.extend(status_map);

    health.apply_snapshot(groups, SnapshotSource::Poll).await;
    alerts.replace_all(alert_records).await;
    Ok(())
}

async fn push_fault(faults: &RwLock<Vec<OrchestrationFault>>, source: &str, message: &str) {
    let mut guard = faults.write().await;
    if guard.len() == FAULT_CAPACITY {
        guard.remove(0);
    }
    guard.push(OrchestrationFault {
        at: Utc::now(),
        source: source.to_string(),
        message: message.to_string(),
    });
}

/// Poll health on a timer while push is unavailable or disabled.
async fn health_poll_loop(
    transport: Arc<dyn PlatformTransport>,
    health: Arc<HealthReconciler>,
    alerts: Arc<AlertAggregator>,
    stream: Arc<EventStreamManager>,
    faults: Arc<RwLock<Vec<OrchestrationFault>>>,
    real_time: Arc<AtomicBool>,
    config: OrchestrationConfig,
) {
    let mut interval = tokio::time::interval(config.poll_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if real_time.load(Ordering::Relaxed) && stream.is_connected() {
            // Push is the active source of truth
            continue;
        }
        if let Err(e) = refresh_from_platform(transport.as_ref(), &health, &alerts).await {
            warn!(error = %e, "Health poll failed");
            push_fault(&faults, "health_poll", &e.to_string()).await;
        }
    }
}

/// Poll performance analytics on the same cadence as health.
async fn metrics_poll_loop(
    transport: Arc<dyn PlatformTransport>,
    metrics: Arc<MetricsCollector>,
    stream: Arc<EventStreamManager>,
    faults: Arc<RwLock<Vec<OrchestrationFault>>>,
    real_time: Arc<AtomicBool>,
    config: OrchestrationConfig,
) {
    let mut interval = tokio::time::interval(config.poll_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let query = AnalyticsQuery::default();
    loop {
        interval.tick().await;
        if real_time.load(Ordering::Relaxed) && stream.is_connected() {
            continue;
        }
        match transport.fetch_analytics(&query).await {
            Ok(snapshot) => metrics.ingest_snapshot(snapshot),
            Err(e) => {
                warn!(error = %e, "Metrics poll failed");
                push_fault(&faults, "metrics_poll", &e.to_string()).await;
            }
        }
    }
}

/// Route typed push events into the owning components.
///
/// A pushed critical alert produces its notification synchronously with
/// arrival, before the next event is read.
async fn route_stream_events(
    mut events: broadcast::Receiver<StreamEvent>,
    health: Arc<HealthReconciler>,
    alerts: Arc<AlertAggregator>,
    metrics: Arc<MetricsCollector>,
    notifications: broadcast::Sender<Notification>,
) {
    loop {
        match events.recv().await {
            Ok(StreamEvent::SystemHealthUpdate(update)) => {
                health
                    .apply_snapshot(update.groups, SnapshotSource::Push)
                    .await;
            }
            Ok(StreamEvent::SystemAlert(record)) => {
                let alert = alerts.push_alert(record).await;
                if alert.severity == AlertSeverity::Critical {
                    let _ = notifications.send(Notification::CriticalAlert {
                        alert_id: alert.id.clone(),
                        title: alert.title.clone(),
                    });
                }
            }
            Ok(StreamEvent::RealtimeMetrics(snapshot)) => {
                metrics.ingest_snapshot(snapshot);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event routing lagged behind the push channel");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
