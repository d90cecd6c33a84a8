// STFT - multichannel short-time spectra for the subspace backend
//
// Rectangular frames of STFT_NFFT samples with a hop of half a frame, no
// padding, keeping the non-negative frequency bins.

use rustfft::num_complex::Complex;

use super::fft::FftProcessor;
use super::types::SftMatrix;
use crate::audio::frame::ChannelMatrix;
use crate::config::{MIC_CHANNELS, STFT_NFFT};

/// Number of full frames that fit in `chunk` samples
pub fn stft_frames(chunk: usize, nfft: usize) -> usize {
    let hop = nfft / 2;
    if chunk < nfft {
        0
    } else {
        (chunk - nfft) / hop + 1
    }
}

/// STFT feature stage
pub struct Stft {
    fft: FftProcessor,
    hop: usize,
    scratch: Vec<Complex<f64>>,
}

impl Stft {
    pub fn new(nfft: usize) -> Self {
        Self {
            fft: FftProcessor::new(nfft),
            hop: nfft / 2,
            scratch: Vec::with_capacity(nfft),
        }
    }

    pub fn nfft(&self) -> usize {
        self.fft.fft_size()
    }

    /// Number of kept bins, nfft / 2 + 1
    pub fn bins(&self) -> usize {
        self.nfft() / 2 + 1
    }

    pub fn compute(&mut self, matrix: &ChannelMatrix) -> SftMatrix {
        let nfft = self.nfft();
        let bins = self.bins();
        let frames = stft_frames(matrix.chunk_len(), nfft);
        let mut out = SftMatrix::zeros(MIC_CHANNELS, frames, bins);

        for mic in 0..MIC_CHANNELS {
            let samples = matrix.channel(mic);
            for frame in 0..frames {
                let start = frame * self.hop;
                self.fft
                    .forward_real(&samples[start..start + nfft], &mut self.scratch);
                out.spectrum_mut(mic, frame)
                    .copy_from_slice(&self.scratch[..bins]);
            }
        }

        out
    }
}

impl Default for Stft {
    fn default() -> Self {
        Self::new(STFT_NFFT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CHUNK;

    #[test]
    fn test_frame_count_for_full_chunk() {
        assert_eq!(stft_frames(CHUNK, 256), 31);
        assert_eq!(stft_frames(256, 256), 1);
        assert_eq!(stft_frames(100, 256), 0);
    }

    #[test]
    fn test_shape_and_tone_bin() {
        // Tone centred on bin 8 of a 64-point transform
        let nfft = 64;
        let chunk = 256;
        let tone: Vec<i16> = (0..chunk)
            .map(|t| {
                (1000.0 * (2.0 * std::f64::consts::PI * 8.0 * t as f64 / nfft as f64).cos()) as i16
            })
            .collect();
        let matrix = ChannelMatrix::from_channels(&vec![tone; MIC_CHANNELS]).unwrap();

        let mut stft = Stft::new(nfft);
        let out = stft.compute(&matrix);

        assert_eq!(out.channels(), 6);
        assert_eq!(out.frames(), 7);
        assert_eq!(out.bins(), 33);

        for frame in 0..out.frames() {
            let spectrum = out.spectrum(2, frame);
            let peak = spectrum
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
                .map(|(i, _)| i);
            assert_eq!(peak, Some(8));
        }
    }
}
