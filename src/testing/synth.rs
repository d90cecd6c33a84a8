//! Synthetic far-field array signals
//!
//! A plane wave made of a few tones arrives from a chosen azimuth. Each
//! microphone receives the tones with the exact fractional delay its
//! position implies, plus seeded uniform sensor noise. Tone frequencies sit
//! on STFT bin centres so the rectangular-window spectra are leakage free.

use std::f64::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::analysis::music::ArrayGeometry;
use crate::audio::frame::{AudioFrame, ChannelMatrix};
use crate::config::{CHANNEL_MAP, CHUNK, RAW_CHANNELS, SAMPLE_RATE, SPEED_OF_SOUND, STFT_NFFT};
use crate::error::AudioError;

/// Signal parameters
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub sample_rate: u32,
    pub chunk: usize,
    /// Peak amplitude of the tone sum
    pub amplitude: f64,
    /// Half-width of the uniform noise added per sample
    pub noise_amplitude: f64,
    /// STFT bins (of `STFT_NFFT`) carrying a tone
    pub tone_bins: Vec<usize>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            chunk: CHUNK,
            amplitude: 6000.0,
            noise_amplitude: 20.0,
            tone_bins: vec![6, 9, 12, 15, 18],
        }
    }
}

/// Plane wave source for the default circular array
#[derive(Debug, Clone)]
pub struct PlaneWave {
    azimuth_deg: f64,
    config: SynthConfig,
    geometry: ArrayGeometry,
}

impl PlaneWave {
    pub fn new(azimuth_deg: f64, config: SynthConfig) -> Self {
        Self {
            azimuth_deg,
            config,
            geometry: ArrayGeometry::default(),
        }
    }

    pub fn azimuth_deg(&self) -> f64 {
        self.azimuth_deg
    }

    /// One frame starting at sample 0
    pub fn frame(&self, seed: u64) -> ChannelMatrix {
        self.frame_at(0, seed)
    }

    /// Frame number `index` of a continuous recording
    pub fn frame_at(&self, index: u64, seed: u64) -> ChannelMatrix {
        let mut rng = StdRng::seed_from_u64(seed ^ index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let fs = self.config.sample_rate as f64;
        let azimuth = self.azimuth_deg.to_radians();
        let (ux, uy) = (azimuth.cos(), azimuth.sin());
        let per_tone = self.config.amplitude / self.config.tone_bins.len().max(1) as f64;
        let offset = index as f64 * self.config.chunk as f64;

        // Phases are fixed per source so consecutive frames join up
        let mut phase_rng = StdRng::seed_from_u64(seed);
        let tones: Vec<(f64, f64)> = self
            .config
            .tone_bins
            .iter()
            .map(|&bin| {
                (
                    bin as f64 * fs / STFT_NFFT as f64,
                    phase_rng.gen_range(0.0..2.0 * PI),
                )
            })
            .collect();

        let channels: Vec<Vec<i16>> = self
            .geometry
            .positions
            .iter()
            .map(|&(x, y)| {
                let advance = (x * ux + y * uy) / SPEED_OF_SOUND;
                (0..self.config.chunk)
                    .map(|t| {
                        let time = (offset + t as f64) / fs + advance;
                        let clean: f64 = tones
                            .iter()
                            .map(|&(freq, phase)| per_tone * (2.0 * PI * freq * time + phase).cos())
                            .sum();
                        let noise = if self.config.noise_amplitude > 0.0 {
                            rng.gen_range(-self.config.noise_amplitude..self.config.noise_amplitude)
                        } else {
                            0.0
                        };
                        (clean + noise).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
                    })
                    .collect()
            })
            .collect();

        // One equal-length channel per microphone, so this never falls back
        ChannelMatrix::from_channels(&channels)
            .unwrap_or_else(|_| ChannelMatrix::zeros(self.config.chunk))
    }

    /// Raw 8-channel frame as the capture interface would deliver it
    pub fn raw_frame_at(&self, index: u64, seed: u64) -> Result<AudioFrame, AudioError> {
        interleave_raw(&self.frame_at(index, seed))
    }
}

/// Quiet frame: uniform noise of the given half-width on every microphone
pub fn noise_frame(chunk: usize, noise_amplitude: i16, seed: u64) -> ChannelMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let channels: Vec<Vec<i16>> = (0..crate::config::MIC_CHANNELS)
        .map(|_| {
            (0..chunk)
                .map(|_| {
                    if noise_amplitude > 0 {
                        rng.gen_range(-noise_amplitude..=noise_amplitude)
                    } else {
                        0
                    }
                })
                .collect()
        })
        .collect();
    ChannelMatrix::from_channels(&channels).unwrap_or_else(|_| ChannelMatrix::zeros(chunk))
}

/// Place canonical microphone channels back onto their raw channel indices
///
/// Unused raw channels are silent.
pub fn interleave_raw(matrix: &ChannelMatrix) -> Result<AudioFrame, AudioError> {
    let chunk = matrix.chunk_len();
    let mut samples = vec![0_i16; chunk * RAW_CHANNELS];
    for (mic, &raw) in CHANNEL_MAP.iter().enumerate() {
        for (t, &sample) in matrix.channel(mic).iter().enumerate() {
            samples[t * RAW_CHANNELS + raw] = sample;
        }
    }
    AudioFrame::new(samples, RAW_CHANNELS)
}
