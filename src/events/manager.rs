//! # Event Stream Manager
//!
//! Owns the single long-lived push connection. Handles connect, disconnect,
//! and reconnection with randomized exponential backoff, and fans typed
//! events out to subscribers over a broadcast channel (dropping a receiver
//! unsubscribes it).
//!
//! State machine:
//!
//! ```text
//! disconnected --connect--> connecting --(success)--> connected
//! connecting --(failure)--> error --(backoff timer)--> connecting
//! connected  --(drop)-----> error --(backoff timer)--> connecting
//! ```
//!
//! Only one connection attempt is in flight at a time; `connect()` while
//! connecting or connected is a no-op. `disconnect()` cancels any pending
//! reconnect timer and is terminal until `connect()` is called again.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EventStreamConfig;

use super::transport::EventTransport;
use super::types::{ConnectionState, StreamEvent};

/// Deterministic backoff ceiling for a reconnect attempt (before jitter).
///
/// Doubles from the configured base and saturates at the configured cap, so
/// the envelope is monotonically non-decreasing across consecutive failures.
#[must_use]
pub fn backoff_ceiling(config: &EventStreamConfig, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.min(32));
    config
        .initial_backoff_ms
        .saturating_mul(factor)
        .min(config.max_backoff_ms)
}

/// Randomized reconnect delay for the given attempt.
///
/// Half-to-full jitter over the ceiling: uniformly drawn from
/// `[ceiling/2, ceiling]`. This desynchronizes reconnection across many
/// clients while keeping consecutive delays non-decreasing until the cap.
#[must_use]
pub fn reconnect_delay(config: &EventStreamConfig, attempt: u32) -> Duration {
    let ceiling = backoff_ceiling(config, attempt);
    let half = ceiling / 2;
    let jittered = half + fastrand::u64(0..=ceiling - half);
    Duration::from_millis(jittered.max(1))
}

/// Manager for the persistent push event channel
pub struct EventStreamManager {
    transport: Arc<dyn EventTransport>,
    config: EventStreamConfig,
    events_tx: broadcast::Sender<StreamEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    run_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventStreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamManager")
            .field("state", &self.state())
            .field("subscribers", &self.events_tx.receiver_count())
            .finish()
    }
}

impl EventStreamManager {
    /// Create a manager over the given transport; no connection is opened
    /// until `connect()` is called.
    pub fn new(transport: Arc<dyn EventTransport>, config: EventStreamConfig) -> Self {
        let (events_tx, _) = broadcast::channel(config.channel_capacity);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            config,
            events_tx,
            state_tx: Arc::new(state_tx),
            run_task: parking_lot::Mutex::new(None),
        }
    }

    /// Open the push connection and keep it alive with reconnection.
    ///
    /// No-op if a connection attempt or live connection already exists.
    pub fn connect(&self) {
        let mut guard = self.run_task.lock();
        if let Some(task) = guard.as_ref() {
            if !task.is_finished() {
                debug!("connect() ignored: connection loop already running");
                return;
            }
        }

        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        let events_tx = self.events_tx.clone();
        let state_tx = Arc::clone(&self.state_tx);

        *guard = Some(tokio::spawn(run_loop(
            transport, config, events_tx, state_tx,
        )));
    }

    /// Close the connection and cancel any pending reconnect timer.
    pub fn disconnect(&self) {
        let mut guard = self.run_task.lock();
        if let Some(task) = guard.take() {
            task.abort();
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!("Event stream disconnected");
    }

    /// Subscribe to typed events; dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events_tx.subscribe()
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch connection state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Whether the push channel is currently the active source of truth
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }
}

impl Drop for EventStreamManager {
    fn drop(&mut self) {
        if let Some(task) = self.run_task.lock().take() {
            task.abort();
        }
    }
}

/// Connection loop: connect, drain the stream, back off, repeat.
async fn run_loop(
    transport: Arc<dyn EventTransport>,
    config: EventStreamConfig,
    events_tx: broadcast::Sender<StreamEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
) {
    let mut attempt: u32 = 0;
    loop {
        state_tx.send_replace(ConnectionState::Connecting);

        match transport.open().await {
            Ok(mut stream) => {
                info!("Event stream connected");
                state_tx.send_replace(ConnectionState::Connected);
                // Successful connection resets the backoff schedule
                attempt = 0;

                while let Some(item) = stream.next().await {
                    match item {
                        Ok(event) => {
                            // Send fails only when no subscriber is listening
                            let _ = events_tx.send(event);
                        }
                        Err(e) => {
                            warn!(error = %e, "Event stream read failed");
                            break;
                        }
                    }
                }
                warn!("Event stream dropped");
            }
            Err(e) => {
                warn!(error = %e, attempt, "Event stream connection attempt failed");
            }
        }

        state_tx.send_replace(ConnectionState::Error);
        let delay = reconnect_delay(&config, attempt);
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(delay).await;
    }
}
