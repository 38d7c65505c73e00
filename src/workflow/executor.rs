//! # Workflow Executor
//!
//! Runs an ordered list of steps for a workflow, applying per-step retry
//! policy, recording structured logs and metrics, and exposing lifecycle
//! transitions through published snapshots.
//!
//! Steps execute strictly sequentially in array order; later steps may
//! depend on side effects of earlier ones. Completed steps are never rolled
//! back; compensation is the caller's responsibility.
//!
//! Pause, resume, and cancel arrive over a command channel checked between
//! steps. An in-flight step invocation runs to completion; only the next
//! iteration observes the command. Cancellation is cooperative, not
//! preemptive.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::types::StepInvocation;
use crate::client::PlatformTransport;
use crate::config::ExecutionConfig;
use crate::error::StewardError;
use crate::metrics::MetricsCollector;

use super::types::{
    merge_parameters, ExecutionCommand, StepState, WorkflowExecution, WorkflowStatus, WorkflowStep,
};

/// Callback publishing execution snapshots to the owning registry
pub type SnapshotSink = Arc<dyn Fn(WorkflowExecution) + Send + Sync>;

/// Delay before retry `attempt` (counting from 0) under the given policy.
///
/// Exponential backoff: `initial_delay * 2^attempt`, capped at `cap_ms`
/// regardless of step count.
#[must_use]
pub fn retry_delay(policy_initial_delay_ms: u64, attempt: u32, cap_ms: u64) -> Duration {
    let factor = 2u64.saturating_pow(attempt.min(32));
    Duration::from_millis(policy_initial_delay_ms.saturating_mul(factor).min(cap_ms))
}

enum Clearance {
    Proceed,
    Cancelled,
}

/// Executor driving one workflow's step loop
pub struct WorkflowExecutor {
    transport: Arc<dyn PlatformTransport>,
    metrics: Arc<MetricsCollector>,
    config: ExecutionConfig,
}

impl WorkflowExecutor {
    pub fn new(
        transport: Arc<dyn PlatformTransport>,
        metrics: Arc<MetricsCollector>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            transport,
            metrics,
            config,
        }
    }

    /// Drive the execution to a terminal state.
    ///
    /// `commands` carries external pause/resume/cancel; `sink` receives a
    /// snapshot after every observable transition. Returns the final record.
    pub async fn run(
        &self,
        mut execution: WorkflowExecution,
        steps: &[WorkflowStep],
        parameters: &Value,
        mut commands: watch::Receiver<ExecutionCommand>,
        sink: SnapshotSink,
    ) -> WorkflowExecution {
        let workflow_id = execution.workflow_id.clone();
        let run_started = Instant::now();

        execution.status = WorkflowStatus::Running;
        self.log(&mut execution, format!("Workflow {workflow_id} started"));
        sink(execution.clone());
        info!(workflow_id = %workflow_id, steps = steps.len(), "Workflow execution started");

        for (index, step) in steps.iter().enumerate() {
            match self
                .await_clearance(&mut commands, &mut execution, &sink)
                .await
            {
                Clearance::Proceed => {}
                Clearance::Cancelled => {
                    return self.finalize_cancelled(execution, run_started, sink);
                }
            }

            execution.current_step = index;
            execution.steps[index].state = StepState::Running;
            let total_steps = execution.total_steps;
            self.log(
                &mut execution,
                format!(
                    "Executing step {} ({}/{})",
                    step.id,
                    index + 1,
                    total_steps
                ),
            );
            sink(execution.clone());

            let merged = merge_parameters(&step.parameters, parameters);
            let invocation = StepInvocation {
                service_id: step.id.clone(),
                operation: step.operation.clone(),
                parameters: merged,
            };

            let step_started = Instant::now();
            let (result, attempts) = self
                .invoke_with_retry(step, &invocation, &mut execution, &sink)
                .await;
            let elapsed = step_started.elapsed();

            let outcome = &mut execution.steps[index];
            outcome.attempts = attempts;
            outcome.duration_ms = Some(elapsed.as_millis() as u64);

            match result {
                Ok(output) => {
                    outcome.state = StepState::Completed;
                    outcome.output = Some(output);
                    self.log(
                        &mut execution,
                        format!(
                            "Step {} completed in {}ms",
                            step.id,
                            elapsed.as_millis()
                        ),
                    );
                    sink(execution.clone());
                }
                Err(original) => {
                    // The original failure is what the workflow reports,
                    // not the last retry's failure
                    let failure = StewardError::StepFailed {
                        step_id: step.id.clone(),
                        attempts,
                        message: original.to_string(),
                    };
                    outcome.state = StepState::Failed;
                    outcome.error = Some(original.to_string());

                    execution.status = WorkflowStatus::Failed;
                    execution.completed_at = Some(chrono::Utc::now());
                    execution.success_rate = Some(0.0);
                    execution.average_duration_ms =
                        Some(run_started.elapsed().as_millis() as u64);
                    execution.errors.push(failure.to_string());
                    self.log(&mut execution, format!("Workflow failed: {failure}"));
                    sink(execution.clone());

                    warn!(
                        workflow_id = %workflow_id,
                        step_id = %step.id,
                        attempts,
                        error = %original,
                        "Workflow execution failed"
                    );
                    return execution;
                }
            }
        }

        let elapsed = run_started.elapsed();
        execution.status = WorkflowStatus::Completed;
        execution.completed_at = Some(chrono::Utc::now());
        execution.success_rate = Some(100.0);
        execution.average_duration_ms = Some(elapsed.as_millis() as u64);
        self.log(
            &mut execution,
            format!("Workflow completed in {}ms", elapsed.as_millis()),
        );
        sink(execution.clone());

        info!(
            workflow_id = %workflow_id,
            duration_ms = elapsed.as_millis() as u64,
            "Workflow execution completed"
        );
        execution
    }

    /// Invoke one step, applying its retry policy on failure.
    ///
    /// Returns the step result and the number of invocations issued. When
    /// every retry is exhausted the error is the ORIGINAL failure.
    async fn invoke_with_retry(
        &self,
        step: &WorkflowStep,
        invocation: &StepInvocation,
        execution: &mut WorkflowExecution,
        sink: &SnapshotSink,
    ) -> (Result<Value, StewardError>, u32) {
        let first_started = Instant::now();
        let first = self
            .transport
            .invoke_operation(&step.group, &step.operation, invocation)
            .await;

        match first {
            Ok(output) => {
                self.metrics.record_operation(first_started.elapsed(), true);
                (Ok(output), 1)
            }
            Err(original) => {
                self.metrics
                    .record_operation(first_started.elapsed(), false);

                let Some(policy) = step.retry_policy.filter(|p| p.max_retries > 0) else {
                    return (Err(original), 1);
                };

                let mut attempts = 1;
                for attempt in 0..policy.max_retries {
                    let delay = retry_delay(
                        policy.initial_delay_ms,
                        attempt,
                        self.config.max_retry_delay_ms,
                    );
                    self.log(
                        execution,
                        format!(
                            "Retrying step {} in {}ms (retry {}/{})",
                            step.id,
                            delay.as_millis(),
                            attempt + 1,
                            policy.max_retries
                        ),
                    );
                    sink(execution.clone());
                    tokio::time::sleep(delay).await;

                    attempts += 1;
                    let retry_started = Instant::now();
                    match self
                        .transport
                        .invoke_operation(&step.group, &step.operation, invocation)
                        .await
                    {
                        Ok(output) => {
                            self.metrics
                                .record_operation(retry_started.elapsed(), true);
                            debug!(step_id = %step.id, attempts, "Step recovered on retry");
                            return (Ok(output), attempts);
                        }
                        Err(e) => {
                            self.metrics
                                .record_operation(retry_started.elapsed(), false);
                            warn!(step_id = %step.id, attempt = attempts, error = %e, "Step retry failed");
                        }
                    }
                }

                (Err(original), attempts)
            }
        }
    }

    /// Observe the command channel between steps.
    ///
    /// Blocks while paused until resumed or cancelled. A closed channel is
    /// treated as cancellation: the owning registry is gone.
    async fn await_clearance(
        &self,
        commands: &mut watch::Receiver<ExecutionCommand>,
        execution: &mut WorkflowExecution,
        sink: &SnapshotSink,
    ) -> Clearance {
        loop {
            let command = *commands.borrow_and_update();
            match command {
                ExecutionCommand::Run => {
                    if execution.status == WorkflowStatus::Paused {
                        execution.status = WorkflowStatus::Running;
                        self.log(execution, "Workflow resumed");
                        sink(execution.clone());
                    }
                    return Clearance::Proceed;
                }
                ExecutionCommand::Pause => {
                    if execution.status != WorkflowStatus::Paused {
                        execution.status = WorkflowStatus::Paused;
                        self.log(execution, "Workflow paused");
                        sink(execution.clone());
                        info!(workflow_id = %execution.workflow_id, "Workflow paused");
                    }
                    if commands.changed().await.is_err() {
                        return Clearance::Cancelled;
                    }
                }
                ExecutionCommand::Cancel => return Clearance::Cancelled,
            }
        }
    }

    fn finalize_cancelled(
        &self,
        mut execution: WorkflowExecution,
        run_started: Instant,
        sink: SnapshotSink,
    ) -> WorkflowExecution {
        execution.status = WorkflowStatus::Cancelled;
        execution.completed_at = Some(chrono::Utc::now());
        execution.average_duration_ms = Some(run_started.elapsed().as_millis() as u64);
        self.log(&mut execution, "Workflow cancelled");
        sink(execution.clone());
        info!(workflow_id = %execution.workflow_id, "Workflow cancelled");
        execution
    }

    fn log(&self, execution: &mut WorkflowExecution, message: impl Into<String>) {
        execution.push_log(self.config.log_capacity, message);
    }
}
