//! Configuration management for the DOA pipeline
//!
//! Two layers live here. The physical and capture constants describe the one
//! array this crate targets (a 6-microphone circular board behind an 8-channel
//! capture interface) and are compile-time constants. The tunables (gate
//! threshold, deployment mode, latency window, device selection) are loaded
//! from a JSON file at startup so they can be adjusted without recompiling.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Capture sample rate in Hz
pub const SAMPLE_RATE: u32 = 44_100;
/// Channels delivered by the capture interface
pub const RAW_CHANNELS: usize = 8;
/// Microphones used by the estimators after remapping
pub const MIC_CHANNELS: usize = 6;
/// Samples per channel in one captured frame
pub const CHUNK: usize = 4096;

/// Raw channel index feeding canonical microphone 0..5.
///
/// Microphone `i` sits at azimuth `i * 60` degrees on the board; the raw
/// interface exposes them as channel 1 followed by channels 6 down to 2.
pub const CHANNEL_MAP: [usize; MIC_CHANNELS] = [1, 6, 5, 4, 3, 2];

/// Degrees per azimuth confidence bin
pub const AZIMUTH_RESOLUTION: usize = 1;
/// Degrees per elevation confidence bin
pub const ELEVATION_RESOLUTION: usize = 10;
/// Degrees per display bucket
pub const UI_RESOLUTION: usize = 10;

/// Array diameter in meters
pub const ARRAY_DIAMETER_M: f64 = 0.09;
/// Array radius in meters
pub const ARRAY_RADIUS_M: f64 = 0.045;
/// Height of the microphone plane above the reference origin in meters
pub const MIC_HEIGHT_M: f64 = 1.0;
/// Assumed speed of sound in m/s
pub const SPEED_OF_SOUND: f64 = 340.0;

/// FFT length of the STFT fed to MUSIC
pub const STFT_NFFT: usize = 256;
/// Lower edge of the MUSIC frequency band in Hz
pub const MUSIC_FREQ_MIN_HZ: f64 = 500.0;
/// Upper edge of the MUSIC frequency band in Hz
pub const MUSIC_FREQ_MAX_HZ: f64 = 4000.0;

/// Number of azimuth bins (360 / AZIMUTH_RESOLUTION)
pub const fn azimuth_bins() -> usize {
    360 / AZIMUTH_RESOLUTION
}

/// Number of elevation bins (360 / ELEVATION_RESOLUTION)
pub const fn elevation_bins() -> usize {
    360 / ELEVATION_RESOLUTION
}

/// Number of display buckets (360 / UI_RESOLUTION)
pub const fn ui_buckets() -> usize {
    360 / UI_RESOLUTION
}

/// Interleaved samples in one raw frame
pub const fn raw_frame_len() -> usize {
    CHUNK * RAW_CHANNELS
}

/// Deployment mode, selecting the aggregator variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// One azimuth (and optional elevation) estimate per frame
    SingleSource,
    /// Zero or more azimuth sources per frame from a multi-label model
    MultiSource,
}

/// Which estimator produces the azimuth in single-source mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Learned classifier on the GCC-PHAT matrix
    Classifier,
    /// MUSIC grid search on the STFT tensor
    Music,
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Activity gate parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Peak absolute sample value a frame must exceed to run inference
    pub threshold: i16,
    /// Consecutive quiet frames after which predictions are cleared
    pub max_silence_frames: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 50,
            max_silence_frames: 10,
        }
    }
}

/// Pipeline selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mode: DeploymentMode,
    /// Initial azimuth backend (can be switched at runtime)
    pub azimuth_backend: BackendKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::SingleSource,
            azimuth_backend: BackendKind::Classifier,
        }
    }
}

/// Latency statistics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Inference latency samples retained per backend
    pub latency_window: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            latency_window: 512,
        }
    }
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Number of pre-allocated raw frames shared between capture and worker
    pub buffer_pool_size: usize,
    /// Input device name; the host default is used when absent
    #[serde(default)]
    pub input_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 8,
            input_device: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}
