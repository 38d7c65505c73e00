//! # Event Stream Manager
//!
//! Push-channel plumbing: one long-lived connection, automatic reconnection
//! with randomized exponential backoff, and typed fan-out to subscribers.

pub mod manager;
pub mod transport;
pub mod types;

pub use manager::{backoff_ceiling, reconnect_delay, EventStreamManager};
pub use transport::{EventStream, EventTransport, HttpEventTransport};
pub use types::{ConnectionState, StreamEvent};
