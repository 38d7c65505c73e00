//! Workflow execution state types.
//!
//! A workflow is an ordered list of remote operations executed as one
//! logical unit. Steps are immutable once execution starts; the execution
//! record is owned by its executor task and exposed to consumers as cloned
//! snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Workflow lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created but not yet started
    Pending,
    /// Step loop is active
    Running,
    /// Paused between steps by external command
    Paused,
    /// All steps completed successfully
    Completed,
    /// A step failed fatally
    Failed,
    /// Cancelled by external command
    Cancelled,
}

impl WorkflowStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the workflow is being processed
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid workflow status: {s}")),
        }
    }
}

/// Per-step retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 means the first failure is fatal
    pub max_retries: u32,
    /// Base delay before the first retry, doubled per subsequent retry
    pub initial_delay_ms: u64,
}

impl RetryPolicy {
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// One remote operation within a workflow. Immutable once the workflow starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    /// Governance group the operation targets
    pub group: String,
    pub operation: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

/// Execution state of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Result record for one step within an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub state: StepState,
    /// Invocations issued, including the first attempt
    pub attempts: u32,
    pub duration_ms: Option<u64>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl StepOutcome {
    fn pending(step_id: String) -> Self {
        Self {
            step_id,
            state: StepState::Pending,
            attempts: 0,
            duration_ms: None,
            output: None,
            error: None,
        }
    }
}

/// One entry in an execution's append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// External commands applied to a running execution.
///
/// Observed cooperatively between steps; an in-flight step invocation runs
/// to completion before the command takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionCommand {
    Run,
    Pause,
    Cancel,
}

/// Full execution record for one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub steps: Vec<StepOutcome>,
    /// Index of the step currently (or last) being executed
    pub current_step: usize,
    pub total_steps: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Append-only, capped to the most recent entries
    pub logs: Vec<ExecutionLogEntry>,
    pub errors: Vec<String>,
    /// 100 for a completed run, 0 for a failed one
    pub success_rate: Option<f64>,
    /// Wall-clock duration from start to terminal state
    pub average_duration_ms: Option<u64>,
}

impl WorkflowExecution {
    /// Create a pending execution record for the given steps
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, steps: &[WorkflowStep]) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: WorkflowStatus::Pending,
            steps: steps
                .iter()
                .map(|s| StepOutcome::pending(s.id.clone()))
                .collect(),
            current_step: 0,
            total_steps: steps.len(),
            started_at: Utc::now(),
            completed_at: None,
            logs: Vec::new(),
            errors: Vec::new(),
            success_rate: None,
            average_duration_ms: None,
        }
    }

    /// Completion fraction as a percentage
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.status == WorkflowStatus::Completed {
            return 100.0;
        }
        if self.total_steps == 0 {
            return 0.0;
        }
        let completed = self
            .steps
            .iter()
            .filter(|s| s.state == StepState::Completed)
            .count();
        (completed as f64 / self.total_steps as f64) * 100.0
    }

    /// Append a log entry, evicting the oldest past `capacity`
    pub(crate) fn push_log(&mut self, capacity: usize, message: impl Into<String>) {
        if self.logs.len() == capacity {
            self.logs.remove(0);
        }
        self.logs.push(ExecutionLogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }
}

/// Merge step-level parameters with call-time parameters.
///
/// Call-time values take precedence on key collision. Non-object values
/// fall back to whichever side is an object, call-time winning outright
/// when both are non-objects.
#[must_use]
pub fn merge_parameters(step: &Value, call_time: &Value) -> Value {
    match (step, call_time) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (Value::Object(base), Value::Null) => Value::Object(base.clone()),
        (_, overlay) => overlay.clone(),
    }
}
