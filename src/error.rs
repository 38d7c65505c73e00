//! # Orchestration Error Types
//!
//! Unified error handling for the steward orchestration core. The taxonomy
//! distinguishes transport failures (retryable at the step level), step
//! failures (workflow-fatal unless a retry policy applies), connection
//! errors (handled by automatic reconnection), and mutation conflicts
//! (rolled back locally and surfaced distinctly from network errors).

use thiserror::Error;

/// Orchestration operation result type
pub type StewardResult<T> = Result<T, StewardError>;

/// Comprehensive error types for orchestration operations
#[derive(Debug, Error)]
pub enum StewardError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Timeout waiting for operation: {operation}")]
    Timeout { operation: String },

    #[error("Step '{step_id}' failed after {attempts} attempt(s): {message}")]
    StepFailed {
        step_id: String,
        attempts: u32,
        message: String,
    },

    #[error("Workflow not found: {workflow_id}")]
    WorkflowNotFound { workflow_id: String },

    #[error("Workflow already running: {workflow_id}")]
    WorkflowAlreadyRunning { workflow_id: String },

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Alert not found: {alert_id}")]
    AlertNotFound { alert_id: String },

    #[error("Acknowledgement rejected for alert {alert_id}: {message}")]
    AcknowledgeRejected { alert_id: String, message: String },

    #[error("Event stream connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Internal channel closed: {0}")]
    ChannelClosed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StewardError {
    /// Create an API error from an HTTP response status and body
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a timeout error for a named operation
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a connection failure error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Check if the error is recoverable (worth retrying)
    ///
    /// Client errors (4xx) and mutation conflicts are never retried; server
    /// errors, timeouts, and network failures are.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            StewardError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StewardError::Api { status, .. } => *status >= 500,
            StewardError::Timeout { .. } => true,
            StewardError::ConnectionFailed(_) => true,
            StewardError::AcknowledgeRejected { .. } => false,
            _ => false,
        }
    }
}
