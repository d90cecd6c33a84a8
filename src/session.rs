//! Session state owned by the predictor thread
//!
//! Everything that changes from frame to frame lives in `SessionState` and
//! is passed by `&mut` into `Predictor::process_frame`. Readers on other
//! threads never see it directly; they receive `PredictionSnapshot`s, which
//! are whole immutable values replaced once per frame.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::aggregator::{DisplayConfidences, Predictions};
use crate::analysis::backend::ConfidenceVector;
use crate::analysis::gate::GateState;
use crate::audio::frame::ChannelMatrix;
use crate::config::{azimuth_bins, ui_buckets, BackendKind};
use crate::telemetry::LatencyTracker;

/// Rolling latency windows, one per estimator
#[derive(Debug, Clone)]
pub struct SessionLatency {
    pub classifier: LatencyTracker,
    pub music: LatencyTracker,
    pub elevation: LatencyTracker,
}

impl SessionLatency {
    pub fn new(window: usize) -> Self {
        Self {
            classifier: LatencyTracker::new(window),
            music: LatencyTracker::new(window),
            elevation: LatencyTracker::new(window),
        }
    }

    pub fn for_backend(&mut self, kind: BackendKind) -> &mut LatencyTracker {
        match kind {
            BackendKind::Classifier => &mut self.classifier,
            BackendKind::Music => &mut self.music,
        }
    }
}

/// Mutable per-session pipeline state
#[derive(Debug, Clone)]
pub struct SessionState {
    /// External run control, copied in before each frame
    pub is_active: bool,
    /// Consecutive quiet frames while active
    pub silent_frame_count: u32,
    pub gate_state: GateState,
    /// Most recent remapped frame seen while active
    pub last_good_frame: Option<Arc<ChannelMatrix>>,
    pub predictions: Predictions,
    /// Azimuth confidences behind the current predictions
    pub azimuth_confidences: ConfidenceVector,
    pub elevation_confidences: Option<ConfidenceVector>,
    pub display: DisplayConfidences,
    pub latency: SessionLatency,
    pub frames_processed: u64,
    pub frames_inferred: u64,
}

impl SessionState {
    pub fn new(latency_window: usize) -> Self {
        Self {
            is_active: false,
            silent_frame_count: 0,
            gate_state: GateState::Idle,
            last_good_frame: None,
            predictions: Predictions::None,
            azimuth_confidences: vec![0.0; azimuth_bins()],
            elevation_confidences: None,
            display: DisplayConfidences::empty(ui_buckets()),
            latency: SessionLatency::new(latency_window),
            frames_processed: 0,
            frames_inferred: 0,
        }
    }

    /// Reset every estimate to "no estimate"
    pub fn clear_predictions(&mut self) {
        self.predictions = Predictions::None;
        self.azimuth_confidences = vec![0.0; azimuth_bins()];
        self.elevation_confidences = None;
        self.display = DisplayConfidences::empty(ui_buckets());
    }

    pub fn snapshot(&self, diagnostic: Option<String>) -> PredictionSnapshot {
        PredictionSnapshot {
            frame_index: self.frames_processed,
            gate_state: self.gate_state,
            predictions: self.predictions.clone(),
            azimuth_confidences: self.azimuth_confidences.clone(),
            elevation_confidences: self.elevation_confidences.clone(),
            display: self.display.clone(),
            classifier_latency_ms: self.latency.classifier.mean_ms(),
            music_latency_ms: self.latency.music.mean_ms(),
            diagnostic,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            frames_processed: self.frames_processed,
            frames_inferred: self.frames_inferred,
            classifier_latency_ms: self.latency.classifier.mean_ms(),
            music_latency_ms: self.latency.music.mean_ms(),
            elevation_latency_ms: self.latency.elevation.mean_ms(),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(crate::config::TelemetryConfig::default().latency_window)
    }
}

/// Immutable view of the session after one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub frame_index: u64,
    pub gate_state: GateState,
    pub predictions: Predictions,
    pub azimuth_confidences: ConfidenceVector,
    pub elevation_confidences: Option<ConfidenceVector>,
    pub display: DisplayConfidences,
    pub classifier_latency_ms: Option<f32>,
    pub music_latency_ms: Option<f32>,
    /// Diagnostic line of this frame, absent while idle
    pub diagnostic: Option<String>,
}

impl Default for PredictionSnapshot {
    fn default() -> Self {
        SessionState::default().snapshot(None)
    }
}

/// Statistics reported when a session stops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub frames_inferred: u64,
    pub classifier_latency_ms: Option<f32>,
    pub music_latency_ms: Option<f32>,
    pub elevation_latency_ms: Option<f32>,
}

fn fmt_mean(value: Option<f32>) -> String {
    value
        .map(|ms| format!("{:.3}", ms))
        .unwrap_or_else(|| "N/A".to_string())
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Frames processed: {} ({} with inference)",
            self.frames_processed, self.frames_inferred
        )?;
        writeln!(
            f,
            "Average CNN inference time (ms): {}",
            fmt_mean(self.classifier_latency_ms)
        )?;
        write!(
            f,
            "Average MUSIC inference time (ms): {}",
            fmt_mean(self.music_latency_ms)
        )?;
        if let Some(ms) = self.elevation_latency_ms {
            write!(f, "\nAverage elevation inference time (ms): {:.3}", ms)?;
        }
        Ok(())
    }
}
