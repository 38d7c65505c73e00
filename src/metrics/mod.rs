//! # Metrics Collector
//!
//! Aggregates performance samples from explicit instrumentation and
//! periodic polling into rolling windows. Samples live in a fixed-capacity
//! ring buffer; new samples evict the oldest when full.
//!
//! Aggregate statistics are true windowed averages over current buffer
//! contents, computed on read. An unbounded running average of the form
//! `(avg * n + new) / (n + 1)` converges toward insensitivity over long
//! sessions and is deliberately not used here.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::client::types::MetricsSnapshot;

/// Default ring buffer capacity for client-side charting windows
pub const DEFAULT_SAMPLE_CAPACITY: usize = 100;

/// One timestamped sample in the rolling window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSample {
    pub recorded_at: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub latency_ms: f64,
    pub throughput: f64,
    pub error_rate: f64,
}

impl From<&MetricsSnapshot> for MetricsSample {
    fn from(snapshot: &MetricsSnapshot) -> Self {
        Self {
            recorded_at: snapshot.generated_at,
            cpu_usage: snapshot.cpu_usage,
            memory_usage: snapshot.memory_usage,
            latency_ms: snapshot.average_latency_ms,
            throughput: snapshot.throughput,
            error_rate: snapshot.error_rate,
        }
    }
}

/// One locally instrumented operation (workflow step, transport call)
#[derive(Debug, Clone)]
struct OperationSample {
    latency_ms: f64,
    success: bool,
}

/// Rolling performance view exposed to consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    /// Windowed mean of platform-reported latency over the sample buffer
    pub average_latency_ms: f64,
    pub throughput: f64,
    /// Windowed mean of platform-reported error rate over the sample buffer
    pub error_rate: f64,
    pub availability: f64,
    /// Windowed mean latency of locally instrumented operations
    pub operation_latency_ms: f64,
    /// Failure fraction of locally instrumented operations in the window
    pub operation_error_rate: f64,
    /// Bounded time-ordered buffer for charting and anomaly inspection
    pub realtime_metrics: Vec<MetricsSample>,
    /// Timestamp of the newest platform snapshot, if any
    pub sampled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MetricsState {
    samples: VecDeque<MetricsSample>,
    operations: VecDeque<OperationSample>,
    last_snapshot: Option<MetricsSnapshot>,
}

/// Collector over rolling metric windows
#[derive(Debug)]
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
    capacity: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY)
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            capacity: capacity.max(1),
        }
    }

    /// Ingest a platform snapshot from polling or a push frame.
    pub fn ingest_snapshot(&self, snapshot: MetricsSnapshot) {
        let mut state = self.state.lock();
        let sample = MetricsSample::from(&snapshot);
        trace!(at = %sample.recorded_at, "Ingesting metrics sample");
        if state.samples.len() == self.capacity {
            state.samples.pop_front();
        }
        state.samples.push_back(sample);
        state.last_snapshot = Some(snapshot);
    }

    /// Record one locally instrumented operation.
    pub fn record_operation(&self, latency: Duration, success: bool) {
        let mut state = self.state.lock();
        if state.operations.len() == self.capacity {
            state.operations.pop_front();
        }
        state.operations.push_back(OperationSample {
            latency_ms: latency.as_secs_f64() * 1_000.0,
            success,
        });
    }

    /// Number of samples currently held
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.state.lock().samples.len()
    }

    /// Compute the rolling performance view.
    ///
    /// Scalars with no windowed meaning (cpu, memory, throughput,
    /// availability) come from the newest snapshot; latency and error rate
    /// are averaged over the window.
    #[must_use]
    pub fn performance(&self) -> PerformanceMetrics {
        let state = self.state.lock();

        let (average_latency_ms, error_rate) = if state.samples.is_empty() {
            (0.0, 0.0)
        } else {
            let n = state.samples.len() as f64;
            let latency: f64 = state.samples.iter().map(|s| s.latency_ms).sum();
            let errors: f64 = state.samples.iter().map(|s| s.error_rate).sum();
            (latency / n, errors / n)
        };

        let (operation_latency_ms, operation_error_rate) = if state.operations.is_empty() {
            (0.0, 0.0)
        } else {
            let n = state.operations.len() as f64;
            let latency: f64 = state.operations.iter().map(|o| o.latency_ms).sum();
            let failures = state.operations.iter().filter(|o| !o.success).count() as f64;
            (latency / n, failures / n)
        };

        let (cpu_usage, memory_usage, throughput, availability, sampled_at) =
            match state.last_snapshot.as_ref() {
                Some(snapshot) => (
                    snapshot.cpu_usage,
                    snapshot.memory_usage,
                    snapshot.throughput,
                    snapshot.availability,
                    Some(snapshot.generated_at),
                ),
                None => (0.0, 0.0, 0.0, 100.0, None),
            };

        PerformanceMetrics {
            cpu_usage,
            memory_usage,
            average_latency_ms,
            throughput,
            error_rate,
            availability,
            operation_latency_ms,
            operation_error_rate,
            realtime_metrics: state.samples.iter().cloned().collect(),
            sampled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(latency: f64, error_rate: f64, second: u32) -> MetricsSnapshot {
        MetricsSnapshot {
            cpu_usage: 40.0,
            memory_usage: 60.0,
            average_latency_ms: latency,
            throughput: 120.0,
            error_rate,
            availability: 99.9,
            generated_at: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, second).unwrap(),
        }
    }

    #[test]
    fn test_ring_buffer_evicts_oldest_at_capacity() {
        let collector = MetricsCollector::new(3);
        for i in 0..5 {
            collector.ingest_snapshot(snapshot(i as f64, 0.0, i));
        }

        let metrics = collector.performance();
        assert_eq!(metrics.realtime_metrics.len(), 3);
        // Oldest two samples (latency 0, 1) were evicted
        assert_eq!(metrics.realtime_metrics[0].latency_ms, 2.0);
        assert_eq!(metrics.realtime_metrics[2].latency_ms, 4.0);
    }

    #[test]
    fn test_windowed_average_over_buffer_contents() {
        let collector = MetricsCollector::new(2);
        collector.ingest_snapshot(snapshot(100.0, 0.1, 0));
        collector.ingest_snapshot(snapshot(200.0, 0.3, 1));
        collector.ingest_snapshot(snapshot(300.0, 0.5, 2));

        let metrics = collector.performance();
        // Window holds the last two samples only
        assert_eq!(metrics.average_latency_ms, 250.0);
        assert!((metrics.error_rate - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scalars_track_newest_snapshot() {
        let collector = MetricsCollector::new(10);
        collector.ingest_snapshot(snapshot(100.0, 0.0, 0));

        let metrics = collector.performance();
        assert_eq!(metrics.cpu_usage, 40.0);
        assert_eq!(metrics.throughput, 120.0);
        assert!(metrics.sampled_at.is_some());
    }

    #[test]
    fn test_operation_window_statistics() {
        let collector = MetricsCollector::new(10);
        collector.record_operation(Duration::from_millis(100), true);
        collector.record_operation(Duration::from_millis(300), false);

        let metrics = collector.performance();
        assert_eq!(metrics.operation_latency_ms, 200.0);
        assert_eq!(metrics.operation_error_rate, 0.5);
    }

    #[test]
    fn test_empty_collector_yields_neutral_view() {
        let metrics = MetricsCollector::default().performance();
        assert_eq!(metrics.average_latency_ms, 0.0);
        assert_eq!(metrics.availability, 100.0);
        assert!(metrics.realtime_metrics.is_empty());
        assert!(metrics.sampled_at.is_none());
    }
}
