//! # Workflow Execution
//!
//! Sequential step execution with per-step retry policy, cooperative
//! pause/resume/cancel, and snapshot-based lifecycle observation.

pub mod executor;
pub mod types;

pub use executor::{retry_delay, SnapshotSink, WorkflowExecutor};
pub use types::{
    merge_parameters, ExecutionCommand, ExecutionLogEntry, RetryPolicy, StepOutcome, StepState,
    WorkflowExecution, WorkflowStatus, WorkflowStep,
};
