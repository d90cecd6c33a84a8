// Types module - feature matrices produced from one ChannelMatrix

use rustfft::num_complex::Complex;

/// Pairwise GCC-PHAT matrix
///
/// One row per unordered microphone pair in lexicographic order
/// ((0,1), (0,2), ... (4,5)), one column per lag from `-max_lag` to
/// `+max_lag`. Stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct GccMatrix {
    values: Vec<f32>,
    pairs: usize,
    lags: usize,
}

impl GccMatrix {
    pub(crate) fn zeros(pairs: usize, lags: usize) -> Self {
        Self {
            values: vec![0.0; pairs * lags],
            pairs,
            lags,
        }
    }

    /// Number of rows (microphone pairs)
    pub fn pairs(&self) -> usize {
        self.pairs
    }

    /// Number of columns (lag positions)
    pub fn lags(&self) -> usize {
        self.lags
    }

    /// Lag window of pair `pair`; index `max_lag` is zero lag
    pub fn row(&self, pair: usize) -> &[f32] {
        &self.values[pair * self.lags..(pair + 1) * self.lags]
    }

    pub(crate) fn row_mut(&mut self, pair: usize) -> &mut [f32] {
        &mut self.values[pair * self.lags..(pair + 1) * self.lags]
    }

    /// Values in pair-major order, shape `[pairs, lags]`
    pub fn as_pair_major(&self) -> &[f32] {
        &self.values
    }

    /// Values in lag-major order, shape `[lags, pairs]`
    pub fn to_lag_major(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.values.len());
        for lag in 0..self.lags {
            for pair in 0..self.pairs {
                out.push(self.values[pair * self.lags + lag]);
            }
        }
        out
    }
}

/// Short-time spectral tensor for the subspace backend
///
/// Axes are (channel, time frame, frequency bin).
#[derive(Debug, Clone, PartialEq)]
pub struct SftMatrix {
    data: Vec<Complex<f64>>,
    channels: usize,
    frames: usize,
    bins: usize,
}

impl SftMatrix {
    pub(crate) fn zeros(channels: usize, frames: usize, bins: usize) -> Self {
        Self {
            data: vec![Complex::new(0.0, 0.0); channels * frames * bins],
            channels,
            frames,
            bins,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    #[inline]
    pub fn at(&self, channel: usize, frame: usize, bin: usize) -> Complex<f64> {
        self.data[(channel * self.frames + frame) * self.bins + bin]
    }

    /// Spectrum of one frame of one channel
    pub fn spectrum(&self, channel: usize, frame: usize) -> &[Complex<f64>] {
        let start = (channel * self.frames + frame) * self.bins;
        &self.data[start..start + self.bins]
    }

    pub(crate) fn spectrum_mut(&mut self, channel: usize, frame: usize) -> &mut [Complex<f64>] {
        let start = (channel * self.frames + frame) * self.bins;
        &mut self.data[start..start + self.bins]
    }
}
