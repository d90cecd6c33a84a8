// FFT module - planned forward/inverse transforms of a fixed length
//
// Both feature paths zero-pad real signals into a complex buffer and run a
// full-length complex FFT. Plans are created once per processor.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Forward and inverse FFT of one fixed size
pub struct FftProcessor {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    fft_size: usize,
}

impl FftProcessor {
    /// Create a new FFT processor for transforms of length `fft_size`
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
            fft_size,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Forward FFT of a real signal zero-padded to `fft_size`
    ///
    /// Samples past `fft_size` are ignored. `out` is resized to `fft_size`.
    pub fn forward_real<T>(&self, signal: &[T], out: &mut Vec<Complex<f64>>)
    where
        T: Copy + Into<f64>,
    {
        out.clear();
        out.extend(
            signal
                .iter()
                .take(self.fft_size)
                .map(|&s| Complex::new(s.into(), 0.0)),
        );
        out.resize(self.fft_size, Complex::new(0.0, 0.0));
        self.forward.process(out);
    }

    /// Unnormalized inverse FFT in place (caller divides by `fft_size`)
    pub fn inverse_in_place(&self, buffer: &mut [Complex<f64>]) {
        self.inverse.process(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_then_inverse_restores_signal() {
        let fft = FftProcessor::new(16);
        let signal: Vec<f64> = (0..10).map(|i| (i as f64 * 0.7).sin()).collect();

        let mut spectrum = Vec::new();
        fft.forward_real(&signal, &mut spectrum);
        assert_eq!(spectrum.len(), 16);

        fft.inverse_in_place(&mut spectrum);
        for (i, value) in spectrum.iter().enumerate() {
            let expected = signal.get(i).copied().unwrap_or(0.0);
            assert!((value.re / 16.0 - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dc_bin_is_sum() {
        let fft = FftProcessor::new(8);
        let mut spectrum = Vec::new();
        fft.forward_real(&[1_i16, 2, 3, 4], &mut spectrum);
        assert!((spectrum[0].re - 10.0).abs() < 1e-12);
        assert!(spectrum[0].im.abs() < 1e-12);
    }
}
