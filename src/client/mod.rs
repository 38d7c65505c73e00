//! # Transport Client
//!
//! Request/response access to the remote governance platform. The
//! [`PlatformTransport`] trait is the seam the rest of the engine depends
//! on; [`PlatformApiClient`] is the HTTP implementation.

pub mod transport;
pub mod types;

pub use transport::{PlatformApiClient, PlatformTransport};
pub use types::{
    AckReceipt, AlertRecord, AlertSeverity, AnalyticsQuery, GroupStatus, MetricsSnapshot,
    PlatformHealth, StepInvocation,
};
