// FeatureExtractor - per-frame features for the azimuth/elevation backends
//
// Module organization:
// - types: GccMatrix and SftMatrix
// - fft: planned forward/inverse transforms
// - gcc: GCC-PHAT over all 15 microphone pairs (classifier input)
// - stft: multichannel short-time spectra (MUSIC input)
// - mod.rs: Coordinator (FeatureExtractor)
//
// Only the features the selected backend needs are computed for a frame.

mod fft;
pub mod gcc;
pub mod stft;
mod types;

pub use gcc::{gcc_fft_len, max_lag_samples, mic_pairs, GccPhat, MIC_PAIRS};
pub use stft::{stft_frames, Stft};
pub use types::{GccMatrix, SftMatrix};

use crate::audio::frame::ChannelMatrix;
use crate::config::{CHUNK, SAMPLE_RATE, STFT_NFFT};

/// Owns the FFT plans and scratch buffers of both feature paths
pub struct FeatureExtractor {
    gcc: GccPhat,
    stft: Stft,
}

impl FeatureExtractor {
    /// Create a new FeatureExtractor for frames of `chunk` samples
    pub fn new(chunk: usize, sample_rate: u32) -> Self {
        Self {
            gcc: GccPhat::new(chunk, sample_rate),
            stft: Stft::new(STFT_NFFT),
        }
    }

    /// GCC-PHAT matrix, 15 pair rows x (2 * max_lag + 1) lags
    pub fn gcc_matrix(&mut self, matrix: &ChannelMatrix) -> GccMatrix {
        self.gcc.compute(matrix)
    }

    /// STFT tensor (channel, frame, bin)
    pub fn sft_matrix(&mut self, matrix: &ChannelMatrix) -> SftMatrix {
        self.stft.compute(matrix)
    }

    pub fn gcc_window_len(&self) -> usize {
        self.gcc.window_len()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(CHUNK, SAMPLE_RATE)
    }
}
