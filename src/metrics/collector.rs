//! Metrics collection and registry.

use crate::provider::{ProviderState, ProviderStats};
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of provider state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether the fetch loop is running.
    pub streaming: bool,
    /// Frames waiting in the delivered queue.
    pub delivered_len: usize,
    /// Frames waiting in the processed queue.
    pub processed_len: usize,
    pub frames_fetched: u64,
    pub frames_taken: u64,
    pub frames_returned: u64,
    pub recycled_processed: u64,
    pub recycled_delivered: u64,
    pub fetch_failures: u64,
    pub fetch_timeouts: u64,
    pub recycle_failures: u64,
    /// Age of the last frame the consumer took, at the time it was taken.
    pub frame_age_seconds: Option<f64>,
}

impl MetricsSnapshot {
    /// Creates a snapshot from provider statistics.
    pub fn from_stats(stats: &ProviderStats, state: ProviderState) -> Self {
        Self {
            streaming: state == ProviderState::Streaming,
            delivered_len: stats.delivered,
            processed_len: stats.processed,
            frames_fetched: stats.frames_fetched,
            frames_taken: stats.frames_taken,
            frames_returned: stats.frames_returned,
            recycled_processed: stats.recycled_processed,
            recycled_delivered: stats.recycled_delivered,
            fetch_failures: stats.fetch_failures,
            fetch_timeouts: stats.fetch_timeouts,
            recycle_failures: stats.recycle_failures,
            frame_age_seconds: None,
        }
    }

    /// Attaches the age of the most recently consumed frame.
    pub fn with_frame_age(mut self, seconds: f64) -> Self {
        self.frame_age_seconds = Some(seconds);
        self
    }
}

/// Prometheus metrics registry for frame provider monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Queue state
    streaming: IntGauge,
    delivered_len: IntGauge,
    processed_len: IntGauge,

    // Frame flow
    frames_fetched: IntCounter,
    frames_taken: IntCounter,
    frames_returned: IntCounter,
    recycled: IntCounterVec,
    frame_age: Gauge,

    // Failures
    fetch_failures: IntCounter,
    fetch_timeouts: IntCounter,
    recycle_failures: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all provider metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let streaming = IntGauge::new(
            "frame_provider_streaming",
            "Whether the fetch loop is running (1=streaming, 0=not)",
        )?;
        let delivered_len = IntGauge::new(
            "frame_provider_delivered_queue_length",
            "Frames delivered and not yet taken or recycled",
        )?;
        let processed_len = IntGauge::new(
            "frame_provider_processed_queue_length",
            "Frames returned by the consumer awaiting recycling",
        )?;

        let frames_fetched = IntCounter::new(
            "frame_provider_frames_fetched_total",
            "Filled buffers received from the capture backend",
        )?;
        let frames_taken = IntCounter::new(
            "frame_provider_frames_taken_total",
            "Frames handed to the consumer",
        )?;
        let frames_returned = IntCounter::new(
            "frame_provider_frames_returned_total",
            "Frames returned by the consumer",
        )?;
        let recycled = IntCounterVec::new(
            Opts::new(
                "frame_provider_recycled_total",
                "Buffers given back to the capture backend",
            ),
            &["source"],
        )?;
        let frame_age = Gauge::new(
            "frame_provider_frame_age_seconds",
            "Capture-to-consume latency of the last frame taken",
        )?;

        let fetch_failures = IntCounter::new(
            "frame_provider_fetch_failures_total",
            "Backend fetch calls that failed",
        )?;
        let fetch_timeouts = IntCounter::new(
            "frame_provider_fetch_timeouts_total",
            "Backend fetch calls that timed out",
        )?;
        let recycle_failures = IntCounter::new(
            "frame_provider_recycle_failures_total",
            "Buffers the backend refused to take back",
        )?;

        registry.register(Box::new(streaming.clone()))?;
        registry.register(Box::new(delivered_len.clone()))?;
        registry.register(Box::new(processed_len.clone()))?;
        registry.register(Box::new(frames_fetched.clone()))?;
        registry.register(Box::new(frames_taken.clone()))?;
        registry.register(Box::new(frames_returned.clone()))?;
        registry.register(Box::new(recycled.clone()))?;
        registry.register(Box::new(frame_age.clone()))?;
        registry.register(Box::new(fetch_failures.clone()))?;
        registry.register(Box::new(fetch_timeouts.clone()))?;
        registry.register(Box::new(recycle_failures.clone()))?;

        Ok(Self {
            registry,
            streaming,
            delivered_len,
            processed_len,
            frames_fetched,
            frames_taken,
            frames_returned,
            recycled,
            frame_age,
            fetch_failures,
            fetch_timeouts,
            recycle_failures,
        })
    }

    /// Updates all metrics from a snapshot of provider state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.streaming.set(i64::from(snapshot.streaming));
        self.delivered_len.set(snapshot.delivered_len as i64);
        self.processed_len.set(snapshot.processed_len as i64);

        // Provider counters are cumulative; advance ours by the difference.
        advance(&self.frames_fetched, snapshot.frames_fetched);
        advance(&self.frames_taken, snapshot.frames_taken);
        advance(&self.frames_returned, snapshot.frames_returned);
        advance(
            &self.recycled.with_label_values(&["processed"]),
            snapshot.recycled_processed,
        );
        advance(
            &self.recycled.with_label_values(&["delivered"]),
            snapshot.recycled_delivered,
        );
        advance(&self.fetch_failures, snapshot.fetch_failures);
        advance(&self.fetch_timeouts, snapshot.fetch_timeouts);
        advance(&self.recycle_failures, snapshot.recycle_failures);

        if let Some(age) = snapshot.frame_age_seconds {
            self.frame_age.set(age);
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let stats = ProviderStats {
            delivered: 2,
            processed: 1,
            frames_fetched: 40,
            frames_taken: 12,
            frames_returned: 11,
            recycled_processed: 10,
            recycled_delivered: 25,
            ..Default::default()
        };
        let snapshot =
            MetricsSnapshot::from_stats(&stats, ProviderState::Streaming).with_frame_age(0.25);
        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("frame_provider_streaming 1"));
        assert!(output.contains("frame_provider_delivered_queue_length 2"));
        assert!(output.contains("frame_provider_frames_fetched_total 40"));
        assert!(output.contains("frame_provider_recycled_total{source=\"delivered\"} 25"));
        assert!(output.contains("frame_provider_recycled_total{source=\"processed\"} 10"));
        assert!(output.contains("frame_provider_frame_age_seconds 0.25"));
    }

    #[test]
    fn test_stopped_snapshot_clears_streaming() {
        let registry = MetricsRegistry::new().unwrap();
        let stats = ProviderStats {
            frames_fetched: 5,
            ..Default::default()
        };

        registry.update(&MetricsSnapshot::from_stats(&stats, ProviderState::Streaming));
        assert!(registry.encode().unwrap().contains("frame_provider_streaming 1"));

        registry.update(&MetricsSnapshot::from_stats(&stats, ProviderState::Stopped));
        let output = registry.encode().unwrap();
        assert!(output.contains("frame_provider_streaming 0"));
        assert!(output.contains("frame_provider_frames_fetched_total 5"));
    }

    #[test]
    fn test_counters_never_go_backwards() {
        let registry = MetricsRegistry::new().unwrap();
        let mut snapshot = MetricsSnapshot {
            frames_fetched: 10,
            ..Default::default()
        };
        registry.update(&snapshot);
        snapshot.frames_fetched = 4;
        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("frame_provider_frames_fetched_total 10"));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("frame_provider_streaming"));
        assert!(output.contains("frame_provider_fetch_failures_total"));
        assert!(output.contains("frame_provider_processed_queue_length"));
    }
}
