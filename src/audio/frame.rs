// Raw capture frames and canonical channel ordering
//
// An `AudioFrame` is one capture period: CHUNK interleaved samples per raw
// channel. The `ChannelRemapper` picks the six microphone channels out of it
// in the order the array geometry expects and produces a `ChannelMatrix`.

use crate::config::{CHANNEL_MAP, CHUNK, MIC_CHANNELS, RAW_CHANNELS};
use crate::error::AudioError;

/// One captured frame of interleaved i16 samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    channels: usize,
}

impl AudioFrame {
    /// Wrap interleaved samples, validating that they divide into whole
    /// sample periods of `channels` channels.
    pub fn new(samples: Vec<i16>, channels: usize) -> Result<Self, AudioError> {
        if channels == 0 {
            return Err(AudioError::ChannelCountMismatch {
                expected: RAW_CHANNELS,
                actual: 0,
            });
        }
        if samples.len() % channels != 0 {
            return Err(AudioError::FrameLengthMismatch {
                expected: samples.len().div_ceil(channels) * channels,
                actual: samples.len(),
            });
        }
        Ok(Self { samples, channels })
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel
    pub fn len_per_channel(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Six canonical microphone channels of one frame, channel-major
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMatrix {
    data: Vec<i16>,
    chunk: usize,
}

impl ChannelMatrix {
    /// All-zero matrix, used before the first frame arrives
    pub fn zeros(chunk: usize) -> Self {
        Self {
            data: vec![0; chunk * MIC_CHANNELS],
            chunk,
        }
    }

    /// Build from per-channel sample vectors (must be MIC_CHANNELS of equal length)
    pub fn from_channels(channels: &[Vec<i16>]) -> Result<Self, AudioError> {
        if channels.len() != MIC_CHANNELS {
            return Err(AudioError::ChannelCountMismatch {
                expected: MIC_CHANNELS,
                actual: channels.len(),
            });
        }
        let chunk = channels[0].len();
        let mut data = Vec::with_capacity(chunk * MIC_CHANNELS);
        for channel in channels {
            if channel.len() != chunk {
                return Err(AudioError::FrameLengthMismatch {
                    expected: chunk,
                    actual: channel.len(),
                });
            }
            data.extend_from_slice(channel);
        }
        Ok(Self { data, chunk })
    }

    /// Samples of canonical microphone `mic`
    pub fn channel(&self, mic: usize) -> &[i16] {
        let start = mic * self.chunk;
        &self.data[start..start + self.chunk]
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk
    }

    /// Largest absolute sample value over all channels
    pub fn peak_abs(&self) -> i32 {
        self.data
            .iter()
            .map(|&s| (s as i32).abs())
            .max()
            .unwrap_or(0)
    }
}

/// Selects and reorders raw channels into canonical microphone order
#[derive(Debug, Clone)]
pub struct ChannelRemapper {
    map: [usize; MIC_CHANNELS],
    raw_channels: usize,
    chunk: usize,
}

impl Default for ChannelRemapper {
    fn default() -> Self {
        Self {
            map: CHANNEL_MAP,
            raw_channels: RAW_CHANNELS,
            chunk: CHUNK,
        }
    }
}

impl ChannelRemapper {
    /// Create a remapper for a custom layout
    ///
    /// Fails when any mapped index is outside the raw channel range.
    pub fn new(
        map: [usize; MIC_CHANNELS],
        raw_channels: usize,
        chunk: usize,
    ) -> Result<Self, AudioError> {
        let needed = map.iter().copied().max().unwrap_or(0) + 1;
        if raw_channels < needed {
            return Err(AudioError::ChannelCountMismatch {
                expected: needed,
                actual: raw_channels,
            });
        }
        Ok(Self {
            map,
            raw_channels,
            chunk,
        })
    }

    pub fn raw_channels(&self) -> usize {
        self.raw_channels
    }

    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Check that a device or file delivers the raw channel count this
    /// remapper expects. Called once at session start.
    pub fn validate_channel_count(&self, actual: usize) -> Result<(), AudioError> {
        if actual != self.raw_channels {
            return Err(AudioError::ChannelCountMismatch {
                expected: self.raw_channels,
                actual,
            });
        }
        Ok(())
    }

    /// Remap a raw frame into a fresh `ChannelMatrix`
    pub fn remap(&self, frame: &AudioFrame) -> Result<ChannelMatrix, AudioError> {
        let mut out = ChannelMatrix::zeros(self.chunk);
        self.remap_into(frame, &mut out)?;
        Ok(out)
    }

    /// Remap a raw frame into an existing matrix, reusing its storage
    pub fn remap_into(&self, frame: &AudioFrame, out: &mut ChannelMatrix) -> Result<(), AudioError> {
        self.validate_channel_count(frame.channels())?;
        let expected = self.chunk * self.raw_channels;
        if frame.samples().len() != expected {
            return Err(AudioError::FrameLengthMismatch {
                expected,
                actual: frame.samples().len(),
            });
        }

        if out.chunk != self.chunk {
            *out = ChannelMatrix::zeros(self.chunk);
        }

        for (mic, &raw) in self.map.iter().enumerate() {
            let dst = &mut out.data[mic * self.chunk..(mic + 1) * self.chunk];
            for (t, sample) in dst.iter_mut().enumerate() {
                *sample = frame.samples()[t * self.raw_channels + raw];
            }
        }
        Ok(())
    }
}
