//! Core telemetry event types describing pipeline health for CLI and
//! logging collaborators.

use serde::{Deserialize, Serialize};

use crate::analysis::gate::GateState;
use crate::config::BackendKind;

/// Which estimator a latency sample belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LatencySource {
    Classifier,
    Music,
    Elevation,
}

impl From<BackendKind> for LatencySource {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Classifier => LatencySource::Classifier,
            BackendKind::Music => LatencySource::Music,
        }
    }
}

/// Rich metric events covering latency, queue occupancy, gating and errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    Latency {
        source: LatencySource,
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    BufferOccupancy {
        channel: String,
        percent: f32,
    },
    GateTransition {
        from: GateState,
        to: GateState,
    },
    FramesDropped {
        total: u64,
    },
    Error {
        code: i32,
        context: String,
    },
}
