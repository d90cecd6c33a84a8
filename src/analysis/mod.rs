// Analysis module - per-frame DOA pipeline
//
// This module owns everything between a raw captured frame and the
// published estimates. The engine's worker thread calls
// `Predictor::process_frame` once per frame, in capture order.
//
// Architecture:
// - ChannelRemapper: raw interleaved frame → 6 canonical microphone channels
// - ActivityGate: peak threshold + silence hysteresis (runs first, always)
// - FeatureExtractor: GCC-PHAT matrix and/or STFT tensor, as the backends need
// - AzimuthBackend: learned classifier or MUSIC; optional elevation classifier
// - Aggregator: single-source argmax or multi-source bucket thresholding

use std::sync::Arc;

use crate::audio::frame::{AudioFrame, ChannelMatrix, ChannelRemapper};
use crate::config::{
    AppConfig, BackendKind, DeploymentMode, AZIMUTH_RESOLUTION, CHUNK, ELEVATION_RESOLUTION,
    SAMPLE_RATE, UI_RESOLUTION,
};
use crate::error::{InferenceError, PipelineError};
use crate::session::SessionState;
use crate::telemetry::{self, LatencySource};

pub mod aggregator;
pub mod backend;
pub mod classifier;
pub mod features;
pub mod gate;
pub mod linalg;
pub mod model;
pub mod music;
pub mod quantizer;

use aggregator::{aggregate_multi, aggregate_single, display_confidences, Predictions};
use backend::AzimuthBackend;
use classifier::ClassifierBackend;
use features::{FeatureExtractor, MIC_PAIRS};
use gate::{ActivityGate, GateDecision, GateState};
use model::InferenceEngine;
use music::MusicBackend;

/// Marker line for frames without an estimate
pub const NO_PREDICTION: &str = "[No prediction]";

/// Inference engines handed to the predictor at startup
#[derive(Default)]
pub struct PredictorModels {
    /// Azimuth classifier (multi-label in multi-source mode)
    pub azimuth: Option<Box<dyn InferenceEngine>>,
    /// Elevation classifier, single-source mode only
    pub elevation: Option<Box<dyn InferenceEngine>>,
}

/// Result of one `process_frame` call
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub gate_state: GateState,
    /// Features and backends ran for this frame
    pub inferred: bool,
    /// Predictions were reset after the silence limit
    pub cleared: bool,
    /// Diagnostic line, emitted for every frame while active
    pub diagnostic: Option<String>,
}

impl FrameOutcome {
    fn idle() -> Self {
        Self {
            gate_state: GateState::Idle,
            inferred: false,
            cleared: false,
            diagnostic: None,
        }
    }
}

/// Per-frame controller: remap, gate, features, backends, aggregation
pub struct Predictor {
    remapper: ChannelRemapper,
    features: FeatureExtractor,
    gate: ActivityGate,
    mode: DeploymentMode,
    azimuth: AzimuthBackend,
    /// The other azimuth backend, when one was loaded
    standby: Option<AzimuthBackend>,
    elevation: Option<ClassifierBackend>,
}

impl Predictor {
    /// Build the pipeline and validate every model against it
    ///
    /// Fails before any frame is processed when a model does not fit the
    /// feature shapes or when the configured backend has no model.
    pub fn new(config: &AppConfig, models: PredictorModels) -> Result<Self, InferenceError> {
        let features = FeatureExtractor::new(CHUNK, SAMPLE_RATE);
        let lags = features.gcc_window_len();
        let mode = config.pipeline.mode;

        let classifier = models
            .azimuth
            .map(|engine| ClassifierBackend::new(engine, MIC_PAIRS, lags, AZIMUTH_RESOLUTION))
            .transpose()?
            .map(AzimuthBackend::Classifier);

        let elevation = match (mode, models.elevation) {
            (DeploymentMode::SingleSource, Some(engine)) => Some(ClassifierBackend::new(
                engine,
                MIC_PAIRS,
                lags,
                ELEVATION_RESOLUTION,
            )?),
            (DeploymentMode::MultiSource, Some(_)) => {
                tracing::warn!("[Predictor] Elevation model ignored in multi-source mode");
                None
            }
            (_, None) => None,
        };

        let music = AzimuthBackend::Music(MusicBackend::default());
        let (azimuth, standby) = match (config.pipeline.azimuth_backend, classifier) {
            (BackendKind::Classifier, Some(classifier)) => (classifier, Some(music)),
            (BackendKind::Classifier, None) => {
                return Err(InferenceError::BackendUnavailable {
                    backend: "classifier".to_string(),
                })
            }
            (BackendKind::Music, classifier) => (music, classifier),
        };

        tracing::info!(
            "[Predictor] Ready: mode={:?}, azimuth={:?}, standby={:?}, elevation={}",
            mode,
            azimuth.kind(),
            standby.as_ref().map(|b| b.kind()),
            elevation.is_some()
        );

        Ok(Self {
            remapper: ChannelRemapper::default(),
            features,
            gate: ActivityGate::new(&config.gate),
            mode,
            azimuth,
            standby,
            elevation,
        })
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn remapper(&self) -> &ChannelRemapper {
        &self.remapper
    }

    pub fn azimuth_backend(&self) -> BackendKind {
        self.azimuth.kind()
    }

    /// Backends that `set_azimuth_backend` accepts
    pub fn available_backends(&self) -> Vec<BackendKind> {
        std::iter::once(self.azimuth.kind())
            .chain(self.standby.as_ref().map(|b| b.kind()))
            .collect()
    }

    pub fn has_elevation(&self) -> bool {
        self.elevation.is_some()
    }

    /// Switch the azimuth estimator between frames
    pub fn set_azimuth_backend(&mut self, kind: BackendKind) -> Result<(), InferenceError> {
        if self.azimuth.kind() == kind {
            return Ok(());
        }
        match self.standby.take() {
            Some(mut other) if other.kind() == kind => {
                std::mem::swap(&mut self.azimuth, &mut other);
                self.standby = Some(other);
                tracing::info!("[Predictor] Azimuth backend switched to {:?}", kind);
                Ok(())
            }
            standby => {
                self.standby = standby;
                Err(InferenceError::BackendUnavailable {
                    backend: format!("{:?}", kind).to_lowercase(),
                })
            }
        }
    }

    /// Process one raw frame
    ///
    /// Idle frames touch nothing. While active the remapped frame becomes
    /// the last good frame, the gate decides, and on loud frames the
    /// backends run and the new estimates replace the old ones.
    pub fn process_frame(
        &mut self,
        session: &mut SessionState,
        frame: &AudioFrame,
    ) -> Result<FrameOutcome, PipelineError> {
        session.frames_processed += 1;

        if !session.is_active {
            session.gate_state = GateState::Idle;
            return Ok(FrameOutcome::idle());
        }

        let matrix = Arc::new(self.remapper.remap(frame)?);
        session.last_good_frame = Some(Arc::clone(&matrix));

        let decision = self.gate.step(
            session.is_active,
            matrix.peak_abs(),
            &mut session.silent_frame_count,
        );
        session.gate_state = decision.state();

        let mut outcome = FrameOutcome {
            gate_state: decision.state(),
            inferred: false,
            cleared: false,
            diagnostic: None,
        };

        match decision {
            GateDecision::Idle => return Ok(outcome),
            GateDecision::Run => {
                self.infer(session, &matrix)?;
                session.frames_inferred += 1;
                outcome.inferred = true;
            }
            GateDecision::Hold { clear } => {
                if clear {
                    tracing::debug!("[Predictor] Silence limit reached, clearing predictions");
                    session.clear_predictions();
                    outcome.cleared = true;
                }
            }
        }

        let line = format_predictions(&session.predictions);
        tracing::info!(target: "doa::predictions", "{}", line);
        outcome.diagnostic = Some(line);
        Ok(outcome)
    }

    fn infer(&mut self, session: &mut SessionState, matrix: &ChannelMatrix) -> Result<(), InferenceError> {
        // The GCC matrix is shared by the azimuth and elevation classifiers
        let needs_gcc =
            self.azimuth.kind() == BackendKind::Classifier || self.elevation.is_some();
        let gcc = needs_gcc.then(|| self.features.gcc_matrix(matrix));

        let kind = self.azimuth.kind();
        let azimuth = self.azimuth.estimate(&mut self.features, matrix, gcc.as_ref())?;
        let stats = session.latency.for_backend(kind).observe(azimuth.latency);
        telemetry::hub().record_latency(kind.into(), stats);

        match self.mode {
            DeploymentMode::SingleSource => {
                let elevation = match (self.elevation.as_mut(), gcc.as_ref()) {
                    (Some(classifier), Some(gcc)) => Some(classifier.predict(gcc)?),
                    _ => None,
                };
                if let Some(out) = &elevation {
                    let stats = session.latency.elevation.observe(out.latency);
                    telemetry::hub().record_latency(LatencySource::Elevation, stats);
                }

                session.predictions = aggregate_single(&azimuth, elevation.as_ref());
                session.display =
                    display_confidences(&azimuth.confidences, AZIMUTH_RESOLUTION, UI_RESOLUTION);
                session.elevation_confidences = elevation.map(|out| out.confidences);
            }
            DeploymentMode::MultiSource => {
                let (predictions, display) =
                    aggregate_multi(&azimuth.confidences, AZIMUTH_RESOLUTION, UI_RESOLUTION);
                session.predictions = predictions;
                session.display = display;
                session.elevation_confidences = None;
            }
        }
        session.azimuth_confidences = azimuth.confidences;

        tracing::debug!(
            "[Predictor] {:?} estimate {:?} in {:?}",
            kind,
            session.predictions,
            azimuth.latency
        );
        Ok(())
    }
}

/// One-line summary of the current estimates
///
/// Single source: `Azimuth:  37 degrees [ 92.0%] | Elevation:  30 degrees [ 40.0%]`.
/// Multi source: `[(90, 0.9), (250, 0.8)]`, angle with confidence to three
/// decimals.
pub fn format_predictions(predictions: &Predictions) -> String {
    match predictions {
        Predictions::None => NO_PREDICTION.to_string(),
        Predictions::Single { azimuth, elevation } => {
            let mut line = format!(
                "Azimuth: {:>3} degrees [{:>5.1}%]",
                azimuth.angle_deg,
                azimuth.confidence * 100.0
            );
            if let Some(elevation) = elevation {
                line.push_str(&format!(
                    " | Elevation: {:>3} degrees [{:>5.1}%]",
                    elevation.angle_deg,
                    elevation.confidence * 100.0
                ));
            }
            line
        }
        Predictions::Multi { sources } if sources.is_empty() => NO_PREDICTION.to_string(),
        Predictions::Multi { sources } => {
            let pairs: Vec<String> = sources
                .iter()
                .map(|s| {
                    format!(
                        "({}, {})",
                        s.angle_deg,
                        (s.confidence * 1000.0).round() / 1000.0
                    )
                })
                .collect();
            format!("[{}]", pairs.join(", "))
        }
    }
}
