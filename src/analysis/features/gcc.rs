// GCC-PHAT - pairwise phase-transform cross-correlation
//
// For every unordered pair of the six microphones the cross-power spectrum
// is phase-normalized and inverse transformed; only the lags that a plane
// wave can physically produce across the array (± max_lag) are kept.
//
// Each channel spectrum is computed and normalized once per frame. Because
// |X1 X2*| = |X1||X2|, normalizing the channels separately is the same as
// normalizing the cross spectrum.

use rustfft::num_complex::Complex;

use super::fft::FftProcessor;
use super::types::GccMatrix;
use crate::audio::frame::ChannelMatrix;
use crate::config::{ARRAY_DIAMETER_M, MIC_CHANNELS, SAMPLE_RATE, SPEED_OF_SOUND};

/// Number of unordered microphone pairs, C(6, 2)
pub const MIC_PAIRS: usize = MIC_CHANNELS * (MIC_CHANNELS - 1) / 2;

/// Microphone pairs in lexicographic order
pub fn mic_pairs() -> impl Iterator<Item = (usize, usize)> {
    (0..MIC_CHANNELS).flat_map(|a| ((a + 1)..MIC_CHANNELS).map(move |b| (a, b)))
}

/// FFT length: smallest even integer >= 2 * chunk - 1
pub fn gcc_fft_len(chunk: usize) -> usize {
    let n = 2 * chunk - 1;
    n + n % 2
}

/// Largest inter-microphone delay in samples for the array diameter
pub fn max_lag_samples(sample_rate: u32) -> usize {
    (ARRAY_DIAMETER_M / SPEED_OF_SOUND * sample_rate as f64).ceil() as usize
}

/// GCC-PHAT feature stage
pub struct GccPhat {
    fft: FftProcessor,
    max_lag: usize,
    spectra: Vec<Vec<Complex<f64>>>,
    cross: Vec<Complex<f64>>,
}

impl GccPhat {
    pub fn new(chunk: usize, sample_rate: u32) -> Self {
        let n = gcc_fft_len(chunk);
        Self {
            fft: FftProcessor::new(n),
            max_lag: max_lag_samples(sample_rate),
            spectra: vec![Vec::with_capacity(n); MIC_CHANNELS],
            cross: vec![Complex::new(0.0, 0.0); n],
        }
    }

    pub fn max_lag(&self) -> usize {
        self.max_lag
    }

    /// Lag window length, 2 * max_lag + 1
    pub fn window_len(&self) -> usize {
        2 * self.max_lag + 1
    }

    /// Compute the 15-row GCC matrix for one frame
    pub fn compute(&mut self, matrix: &ChannelMatrix) -> GccMatrix {
        for (mic, spectrum) in self.spectra.iter_mut().enumerate() {
            self.fft.forward_real(matrix.channel(mic), spectrum);
            phase_normalize(spectrum);
        }

        let n = self.fft.fft_size();
        let lags = self.window_len();
        let mut out = GccMatrix::zeros(MIC_PAIRS, lags);

        for (row, (a, b)) in mic_pairs().enumerate() {
            for ((c, x1), x2) in self
                .cross
                .iter_mut()
                .zip(self.spectra[a].iter())
                .zip(self.spectra[b].iter())
            {
                *c = x1 * x2.conj();
            }
            self.fft.inverse_in_place(&mut self.cross);

            // Negative lags wrap to the end of the circular correlation
            let window = out.row_mut(row);
            for (i, value) in window.iter_mut().enumerate() {
                let idx = (n + i - self.max_lag) % n;
                *value = (self.cross[idx].re / n as f64) as f32;
            }
        }

        out
    }
}

impl Default for GccPhat {
    fn default() -> Self {
        Self::new(crate::config::CHUNK, SAMPLE_RATE)
    }
}

/// Divide each bin by its magnitude, leaving exact zeros untouched
fn phase_normalize(spectrum: &mut [Complex<f64>]) {
    for bin in spectrum.iter_mut() {
        let magnitude = bin.norm();
        if magnitude != 0.0 {
            *bin /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_from(channels: Vec<Vec<i16>>) -> ChannelMatrix {
        ChannelMatrix::from_channels(&channels).unwrap()
    }

    fn noise(len: usize, seed: u64) -> Vec<i16> {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-2000..2000)).collect()
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    #[test]
    fn test_constants() {
        assert_eq!(gcc_fft_len(4096), 8192);
        assert_eq!(gcc_fft_len(3), 6);
        assert_eq!(max_lag_samples(44_100), 12);
        assert_eq!(MIC_PAIRS, 15);
    }

    #[test]
    fn test_pair_order_is_lexicographic() {
        let pairs: Vec<_> = mic_pairs().collect();
        assert_eq!(pairs.len(), 15);
        assert_eq!(pairs[0], (0, 1));
        assert_eq!(pairs[4], (0, 5));
        assert_eq!(pairs[5], (1, 2));
        assert_eq!(pairs[14], (4, 5));
    }

    #[test]
    fn test_identical_signals_peak_at_zero_lag_and_are_symmetric() {
        let signal = noise(512, 7);
        let mut gcc = GccPhat::new(512, 44_100);
        let out = gcc.compute(&matrix_from(vec![signal; MIC_CHANNELS]));

        let center = gcc.max_lag();
        for pair in 0..out.pairs() {
            let row = out.row(pair);
            assert_eq!(argmax(row), center);
            assert!((row[center] - 1.0).abs() < 1e-4);
            for k in 1..=center {
                assert!((row[center - k] - row[center + k]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_window_length_independent_of_amplitude() {
        let mut gcc = GccPhat::new(256, 44_100);
        for scale in [1_i16, 10, 1000] {
            let channels: Vec<Vec<i16>> = (0..MIC_CHANNELS)
                .map(|m| {
                    noise(256, m as u64)
                        .iter()
                        .map(|&s| (s as i32 * scale as i32 / 1000) as i16)
                        .collect::<Vec<i16>>()
                })
                .collect();
            let out = gcc.compute(&matrix_from(channels));
            assert_eq!(out.pairs(), 15);
            assert_eq!(out.lags(), 25);
        }
    }

    #[test]
    fn test_delay_shows_up_at_matching_lag() {
        let base = noise(1024 + 8, 3);
        // Mic 0 hears the signal 5 samples later than mic 1
        let mic0: Vec<i16> = base[3..3 + 1024].to_vec();
        let mic1: Vec<i16> = base[8..8 + 1024].to_vec();
        let mut channels = vec![mic1.clone(); MIC_CHANNELS];
        channels[0] = mic0;

        let mut gcc = GccPhat::new(1024, 44_100);
        let out = gcc.compute(&matrix_from(channels));

        // r[k] = sum x0[t + k] x1[t] with x0[t] = x1[t - 5] peaks at k = +5
        assert_eq!(argmax(out.row(0)), gcc.max_lag() + 5);
        // Pair (1, 2) sees identical signals
        assert_eq!(argmax(out.row(5)), gcc.max_lag());
    }

    #[test]
    fn test_silent_channel_does_not_produce_nan() {
        let mut channels = vec![noise(256, 11); MIC_CHANNELS];
        channels[3] = vec![0; 256];
        let mut gcc = GccPhat::new(256, 44_100);
        let out = gcc.compute(&matrix_from(channels));
        assert!(out.as_pair_major().iter().all(|v| v.is_finite()));
        assert!(out.row(2).iter().all(|&v| v == 0.0), "pair (0,3) is all zero");
    }
}
