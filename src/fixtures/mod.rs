//! Recording replay utilities for the CLI harness.
//!
//! Recordings are multichannel 16-bit WAV files at the capture rate. The
//! recorder tool keeps only the first seven raw channels (the eighth is
//! unused by the array), so shorter layouts are padded back to the raw
//! channel count with silence before they are cut into frames.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use crate::audio::frame::AudioFrame;
use crate::config::{CHANNEL_MAP, CHUNK, RAW_CHANNELS, SAMPLE_RATE};

/// Decoded recording split into raw frames
#[derive(Debug, Clone)]
pub struct Recording {
    pub path: PathBuf,
    pub sample_rate: u32,
    /// Channels stored in the file (before padding)
    pub file_channels: usize,
    pub frames: Vec<AudioFrame>,
    /// Samples per channel discarded after the last full frame
    pub trailing_samples: usize,
}

impl Recording {
    pub fn duration_secs(&self) -> f32 {
        (self.frames.len() * CHUNK + self.trailing_samples) as f32 / self.sample_rate as f32
    }
}

/// Load a recording and cut it into `CHUNK`-sample raw frames
pub fn load_recording(path: &Path) -> Result<Recording> {
    let (samples, sample_rate, channels) = read_wav(path)?;
    if sample_rate != SAMPLE_RATE {
        bail!(
            "{} is sampled at {} Hz, the array runs at {} Hz",
            path.display(),
            sample_rate,
            SAMPLE_RATE
        );
    }

    let min_channels = CHANNEL_MAP.iter().max().map_or(RAW_CHANNELS, |&c| c + 1);
    if channels < min_channels || channels > RAW_CHANNELS {
        bail!(
            "{} has {} channels, expected {} to {}",
            path.display(),
            channels,
            min_channels,
            RAW_CHANNELS
        );
    }

    let padded = pad_channels(&samples, channels, RAW_CHANNELS);
    let per_channel = padded.len() / RAW_CHANNELS;
    let frames = split_frames(&padded, RAW_CHANNELS, CHUNK)?;
    let trailing_samples = per_channel - frames.len() * CHUNK;

    log::info!(
        "[Fixtures] Loaded {}: {} channels, {} frames, {} trailing samples",
        path.display(),
        channels,
        frames.len(),
        trailing_samples
    );

    Ok(Recording {
        path: path.to_path_buf(),
        sample_rate,
        file_channels: channels,
        frames,
        trailing_samples,
    })
}

/// Write frames as a 16-bit WAV at the capture rate
pub fn write_recording(path: &Path, frames: &[AudioFrame]) -> Result<()> {
    let channels = frames.first().map_or(RAW_CHANNELS, |f| f.channels());
    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for frame in frames {
        if frame.channels() != channels {
            bail!(
                "frame with {} channels in a {}-channel recording",
                frame.channels(),
                channels
            );
        }
        for &sample in frame.samples() {
            writer.write_sample(sample)?;
        }
    }
    writer
        .finalize()
        .with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}

/// Interleaved samples with silent channels appended up to `target`
fn pad_channels(samples: &[i16], channels: usize, target: usize) -> Vec<i16> {
    if channels == target {
        return samples.to_vec();
    }
    let mut padded = Vec::with_capacity(samples.len() / channels * target);
    for row in samples.chunks_exact(channels) {
        padded.extend_from_slice(row);
        padded.resize(padded.len() + (target - channels), 0);
    }
    padded
}

/// Cut interleaved samples into full frames, dropping a partial tail
pub fn split_frames(samples: &[i16], channels: usize, chunk: usize) -> Result<Vec<AudioFrame>> {
    samples
        .chunks_exact(channels * chunk)
        .map(|block| AudioFrame::new(block.to_vec(), channels).map_err(|e| anyhow!(e)))
        .collect()
}

fn read_wav(path: &Path) -> Result<(Vec<i16>, u32, usize)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("{} has zero channels", path.display());
    }

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| {
                sample
                    .map(|v| {
                        (v * i16::MAX as f32)
                            .round()
                            .clamp(i16::MIN as f32, i16::MAX as f32) as i16
                    })
                    .map_err(|err| anyhow!(err))
            })
            .collect::<Result<Vec<i16>>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|sample| sample.map_err(|err| anyhow!(err)))
                .collect::<Result<Vec<i16>>>()?,
            other => bail!(
                "Unsupported bits per sample {} in {}",
                other,
                path.display()
            ),
        },
    };

    Ok((samples, spec.sample_rate, spec.channels as usize))
}
