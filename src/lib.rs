//! # Steward Core
//!
//! Cross-group orchestration engine for a remote data-governance platform.
//!
//! ## Architecture
//!
//! The engine coordinates three concerns behind one facade:
//!
//! - **Workflow execution**: ordered multi-step workflows driven to
//!   completion with per-step exponential-backoff retry, cooperative
//!   pause/resume/cancel, and structured lifecycle logs.
//! - **State reconciliation**: system health, alerts, and performance
//!   metrics merged from two independent channels (polled REST calls and a
//!   push event stream) into single-writer, race-free snapshots.
//! - **Connectivity**: one long-lived push connection with randomized
//!   exponential reconnect backoff, falling back to polling whenever the
//!   stream is down or disabled.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use steward_core::{OrchestrationConfig, OrchestrationCore};
//! use steward_core::workflow::{RetryPolicy, WorkflowStep};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let core = OrchestrationCore::new(OrchestrationConfig::default())?;
//! core.start();
//!
//! let steps = vec![WorkflowStep {
//!     id: "classify".to_string(),
//!     group: "classification".to_string(),
//!     operation: "run".to_string(),
//!     parameters: serde_json::json!({"depth": 2}),
//!     retry_policy: Some(RetryPolicy { max_retries: 2, initial_delay_ms: 500 }),
//! }];
//! core.execute_workflow("nightly-scan", steps, serde_json::json!({}))?;
//!
//! let health = core.refresh_system_health().await?;
//! println!("overall: {}", health.overall_status);
//!
//! core.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod workflow;

pub use crate::core::{Notification, OrchestrationCore, OrchestrationFault};
pub use alerts::{AckState, AlertAggregator, SystemAlert};
pub use client::{
    AlertRecord, AlertSeverity, GroupStatus, MetricsSnapshot, PlatformApiClient, PlatformTransport,
};
pub use config::{OrchestrationConfig, PlatformApiConfig};
pub use error::{StewardError, StewardResult};
pub use events::{ConnectionState, EventStreamManager, EventTransport, StreamEvent};
pub use health::{HealthReconciler, HealthStatus, SystemHealthSummary};
pub use metrics::{MetricsCollector, PerformanceMetrics};
pub use workflow::{
    RetryPolicy, WorkflowExecution, WorkflowExecutor, WorkflowStatus, WorkflowStep,
};
