// MusicBackend - MUSIC grid search over the horizontal plane
//
// For every STFT bin inside the analysis band the spatial covariance of the
// six channels is estimated over all time frames, its noise subspace (one
// source assumed) is extracted, and the pseudo-spectrum
// 1 / (a^H En En^H a) is evaluated for every candidate azimuth. The
// pseudo-spectra are averaged over bins and the best azimuth wins.
//
// The microphone plane sits at a fixed height; every microphone shares it,
// so it drops out of the relative delays and the grid stays two-dimensional.

use std::f64::consts::PI;
use std::time::Instant;

use rustfft::num_complex::Complex;

use super::backend::{AngleEstimate, BackendOutput};
use super::features::SftMatrix;
use super::linalg::{embed_vector, NoiseSubspace};
use crate::config::{
    ARRAY_RADIUS_M, MIC_CHANNELS, MUSIC_FREQ_MAX_HZ, MUSIC_FREQ_MIN_HZ, SAMPLE_RATE,
    SPEED_OF_SOUND, STFT_NFFT,
};

/// Number of sources the subspace split assumes
const NUM_SOURCES: usize = 1;

/// Circular array geometry
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayGeometry {
    /// Microphone (x, y) offsets from the array centre in meters
    pub positions: Vec<(f64, f64)>,
}

impl ArrayGeometry {
    /// `count` microphones evenly spaced on a circle, the first at 0 degrees
    pub fn circular(count: usize, radius: f64) -> Self {
        let positions = (0..count)
            .map(|m| {
                let phi = 2.0 * PI * m as f64 / count as f64;
                (radius * phi.cos(), radius * phi.sin())
            })
            .collect();
        Self { positions }
    }

    pub fn mic_count(&self) -> usize {
        self.positions.len()
    }
}

impl Default for ArrayGeometry {
    fn default() -> Self {
        Self::circular(MIC_CHANNELS, ARRAY_RADIUS_M)
    }
}

/// STFT bins covering `[min_hz, max_hz]`, rounded to the nearest bin
pub fn band_bins(min_hz: f64, max_hz: f64, sample_rate: u32, nfft: usize) -> Vec<usize> {
    let to_bin = |hz: f64| (hz / sample_rate as f64 * nfft as f64).round() as usize;
    (to_bin(min_hz)..=to_bin(max_hz)).collect()
}

/// Far-field steering vector of a plane wave from `azimuth_rad` at `freq_hz`
///
/// A microphone displaced towards the source hears the wave early, which a
/// forward DFT sees as a positive phase.
pub fn steering_vector(
    geometry: &ArrayGeometry,
    azimuth_rad: f64,
    freq_hz: f64,
    speed_of_sound: f64,
) -> Vec<Complex<f64>> {
    let (ux, uy) = (azimuth_rad.cos(), azimuth_rad.sin());
    geometry
        .positions
        .iter()
        .map(|&(x, y)| {
            let advance = (x * ux + y * uy) / speed_of_sound;
            Complex::from_polar(1.0, 2.0 * PI * freq_hz * advance)
        })
        .collect()
}

/// MUSIC azimuth estimator
pub struct MusicBackend {
    geometry: ArrayGeometry,
    bins: Vec<usize>,
    resolution: usize,
    /// Embedded steering vectors, indexed [band bin][grid direction]
    steering: Vec<Vec<Vec<f64>>>,
    covariance: Vec<Complex<f64>>,
}

impl MusicBackend {
    pub fn new(geometry: ArrayGeometry, sample_rate: u32, nfft: usize, resolution: usize) -> Self {
        let bins = band_bins(MUSIC_FREQ_MIN_HZ, MUSIC_FREQ_MAX_HZ, sample_rate, nfft);
        let directions = 360 / resolution;

        let steering = bins
            .iter()
            .map(|&bin| {
                let freq = bin as f64 * sample_rate as f64 / nfft as f64;
                (0..directions)
                    .map(|d| {
                        let azimuth = ((d * resolution) as f64).to_radians();
                        embed_vector(&steering_vector(&geometry, azimuth, freq, SPEED_OF_SOUND))
                    })
                    .collect()
            })
            .collect();

        let m = geometry.mic_count();
        tracing::info!(
            "[Music] {} microphones, bins {:?}..={:?}, {} directions",
            m,
            bins.first(),
            bins.last(),
            directions
        );

        Self {
            geometry,
            bins,
            resolution,
            steering,
            covariance: vec![Complex::new(0.0, 0.0); m * m],
        }
    }

    pub fn band(&self) -> &[usize] {
        &self.bins
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Averaged pseudo-spectrum over the analysis band, one value per
    /// candidate direction
    pub fn pseudo_spectrum(&mut self, sft: &SftMatrix) -> Vec<f64> {
        let m = self.geometry.mic_count();
        let directions = 360 / self.resolution;
        let mut spectrum = vec![0.0; directions];
        let snapshots = sft.frames();
        if snapshots == 0 || sft.channels() < m {
            return spectrum;
        }

        let mut used_bins = 0;
        for (band_idx, &bin) in self.bins.iter().enumerate() {
            if bin >= sft.bins() {
                continue;
            }
            estimate_covariance(sft, bin, m, &mut self.covariance);
            let noise = NoiseSubspace::from_covariance(&self.covariance, m, NUM_SOURCES);

            for (value, steering) in spectrum.iter_mut().zip(&self.steering[band_idx]) {
                let denom = noise.projection(steering);
                *value += 1.0 / denom.max(f64::MIN_POSITIVE);
            }
            used_bins += 1;
        }

        if used_bins > 0 {
            spectrum.iter_mut().for_each(|v| *v /= used_bins as f64);
        }
        spectrum
    }

    /// Locate the single strongest source
    ///
    /// Confidence is fixed at 1.0 and the confidence vector is one-hot at the
    /// winning bin; MUSIC has no calibrated probability.
    pub fn locate(&mut self, sft: &SftMatrix) -> BackendOutput {
        self.locate_since(sft, Instant::now())
    }

    /// Like [`MusicBackend::locate`], with latency measured from `started`
    ///
    /// Callers pass the instant they began computing `sft` so the reported
    /// latency covers the STFT as well.
    pub fn locate_since(&mut self, sft: &SftMatrix, started: Instant) -> BackendOutput {
        let spectrum = self.pseudo_spectrum(sft);
        let best = spectrum
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
            .0;
        let latency = started.elapsed();

        let mut confidences = vec![0.0; spectrum.len()];
        confidences[best] = 1.0;

        BackendOutput {
            estimate: AngleEstimate {
                angle_deg: (best * self.resolution) as u32,
                confidence: 1.0,
            },
            confidences,
            latency,
        }
    }
}

/// Sample covariance X X^H / snapshots of one STFT bin
fn estimate_covariance(sft: &SftMatrix, bin: usize, m: usize, out: &mut [Complex<f64>]) {
    let snapshots = sft.frames();
    for i in 0..m {
        for j in 0..m {
            let sum: Complex<f64> = (0..snapshots)
                .map(|s| sft.at(i, s, bin) * sft.at(j, s, bin).conj())
                .sum();
            out[i * m + j] = sum / snapshots as f64;
        }
    }
}

impl Default for MusicBackend {
    fn default() -> Self {
        Self::new(
            ArrayGeometry::default(),
            SAMPLE_RATE,
            STFT_NFFT,
            crate::config::AZIMUTH_RESOLUTION,
        )
    }
}
