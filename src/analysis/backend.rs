// Azimuth backend capability
//
// The learned classifier and the MUSIC search are two variants of one
// capability: given the frame's features, produce an angle, a confidence
// and a full per-bin confidence vector of the same length.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::classifier::ClassifierBackend;
use super::features::{FeatureExtractor, GccMatrix};
use super::music::MusicBackend;
use crate::audio::frame::ChannelMatrix;
use crate::config::BackendKind;
use crate::error::InferenceError;

/// Per-bin confidences, one entry per `resolution` degrees
pub type ConfidenceVector = Vec<f32>;

/// Angle in degrees with its confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleEstimate {
    pub angle_deg: u32,
    pub confidence: f32,
}

/// Common result shape of every backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutput {
    pub estimate: AngleEstimate,
    pub confidences: ConfidenceVector,
    /// Wall-clock time of the estimate
    ///
    /// MUSIC counts its STFT. The classifier counts only the engine call,
    /// since its GCC matrix may be shared with the elevation model.
    pub latency: Duration,
}

/// Index and value of the first maximum (NaN entries never win)
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if v <= b || v.is_nan() => best,
            None if v.is_nan() => None,
            _ => Some((i, v)),
        })
}

/// Estimate from an argmax over a confidence vector
pub fn estimate_from(confidences: &[f32], resolution: usize) -> AngleEstimate {
    let (index, confidence) = argmax(confidences).unwrap_or((0, 0.0));
    AngleEstimate {
        angle_deg: (index * resolution) as u32,
        confidence,
    }
}

/// Selected azimuth estimator
pub enum AzimuthBackend {
    Classifier(ClassifierBackend),
    Music(MusicBackend),
}

impl AzimuthBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            AzimuthBackend::Classifier(_) => BackendKind::Classifier,
            AzimuthBackend::Music(_) => BackendKind::Music,
        }
    }

    /// Run the estimator on one frame
    ///
    /// `gcc` is the frame's GCC matrix when one was already computed (the
    /// elevation classifier shares it); the classifier computes it otherwise.
    pub fn estimate(
        &mut self,
        features: &mut FeatureExtractor,
        matrix: &ChannelMatrix,
        gcc: Option<&GccMatrix>,
    ) -> Result<BackendOutput, InferenceError> {
        match self {
            AzimuthBackend::Classifier(classifier) => match gcc {
                Some(gcc) => classifier.predict(gcc),
                None => classifier.predict(&features.gcc_matrix(matrix)),
            },
            AzimuthBackend::Music(music) => {
                let started = Instant::now();
                let sft = features.sft_matrix(matrix);
                Ok(music.locate_since(&sft, started))
            }
        }
    }
}
