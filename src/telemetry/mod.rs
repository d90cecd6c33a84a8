//! Pipeline telemetry collector and latency statistics.
//!
//! The collector multiplexes latency, queue occupancy, gate transitions and
//! error events into a bounded history plus a broadcast stream. Rolling
//! latency windows live in `LatencyTracker`, which the session state also
//! uses for its end-of-session summary.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

use crate::analysis::gate::GateState;
use crate::error::ErrorCode;

pub mod events;

pub use events::{LatencySource, MetricEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Recent events plus counters, for CLI and display reporting
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub published: u64,
    /// Events pushed out of the bounded history
    pub evicted: u64,
}

/// Append to a bounded queue, returning whether the oldest entry was evicted
fn push_bounded<T>(queue: &mut VecDeque<T>, capacity: usize, value: T) -> bool {
    let evicted = queue.len() >= capacity && queue.pop_front().is_some();
    queue.push_back(value);
    evicted
}

/// Fan-out of metric events with a bounded replay history
pub struct TelemetryCollector {
    stream: broadcast::Sender<MetricEvent>,
    recent: Mutex<VecDeque<MetricEvent>>,
    capacity: usize,
    published: AtomicU64,
    evicted: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(stream_capacity: usize, history_capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(stream_capacity.max(1));
        let capacity = history_capacity.max(1);
        Self {
            stream,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            published: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        if push_bounded(&mut recent, self.capacity, event.clone()) {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        drop(recent);

        // No subscribers is the normal case for the CLI
        let _ = self.stream.send(event);
    }

    /// Live stream of every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.stream.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        TelemetrySnapshot {
            recent: recent.iter().cloned().collect(),
            published: self.published.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Average, maximum and count over a latency window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub avg_ms: f32,
    pub max_ms: f32,
    pub sample_count: usize,
}

/// Rolling window of inference latencies in milliseconds
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    samples: VecDeque<f32>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn observe(&mut self, latency: Duration) -> LatencyStats {
        push_bounded(
            &mut self.samples,
            self.max_samples,
            latency.as_secs_f32() * 1000.0,
        );
        self.stats()
    }

    pub fn stats(&self) -> LatencyStats {
        let (sum, max) = self
            .samples
            .iter()
            .fold((0.0_f32, 0.0_f32), |(sum, max), &ms| (sum + ms, max.max(ms)));
        let sample_count = self.samples.len();
        LatencyStats {
            avg_ms: if sample_count == 0 { 0.0 } else { sum / sample_count as f32 },
            max_ms: max,
            sample_count,
        }
    }

    /// Mean latency, absent before the first sample
    pub fn mean_ms(&self) -> Option<f32> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.stats().avg_ms)
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Collector plus the last emitted value of each occupancy gauge
pub struct TelemetryHub {
    collector: TelemetryCollector,
    gauges: Mutex<HashMap<&'static str, f32>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    pub fn record_latency(&self, source: LatencySource, stats: LatencyStats) {
        self.collector.publish(MetricEvent::Latency {
            source,
            avg_ms: stats.avg_ms,
            max_ms: stats.max_ms,
            sample_count: stats.sample_count,
        });
    }

    /// Queue fill level; changes under 2.5 points are not re-emitted
    pub fn record_buffer_occupancy(&self, channel: &'static str, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        let mut gauges = self.gauges.lock().unwrap_or_else(|p| p.into_inner());
        let changed = match gauges.get(channel) {
            Some(last) => (last - percent).abs() >= 2.5,
            None => true,
        };
        if !changed {
            return;
        }
        gauges.insert(channel, percent);
        drop(gauges);
        self.collector.publish(MetricEvent::BufferOccupancy {
            channel: channel.to_string(),
            percent,
        });
    }

    pub fn record_gate_transition(&self, from: GateState, to: GateState) {
        if from != to {
            self.collector.publish(MetricEvent::GateTransition { from, to });
        }
    }

    pub fn record_frames_dropped(&self, total: u64) {
        self.collector.publish(MetricEvent::FramesDropped { total });
    }

    pub fn record_error(&self, error: &dyn ErrorCode, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Error {
            code: error.code(),
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64)
    }
}
