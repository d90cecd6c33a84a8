//! Frame sources feeding the buffer pool.
//!
//! A source fills pre-allocated raw frame buffers and pushes them onto the
//! data queue. The live capture source lives in `audio::capture`; replay
//! sources feed recorded or synthetic frames through the same path.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::buffer_pool::CaptureChannels;
use crate::audio::frame::AudioFrame;
use crate::config::RAW_CHANNELS;
use crate::error::AudioError;

use super::EngineShared;

/// Producer side of the engine
///
/// `start` hands the source its queue ends; from then on the source owns
/// them until `stop` returns.
pub trait FrameSource: Send {
    /// Raw channels in every frame this source delivers
    fn channels(&self) -> usize;

    fn start(&mut self, channels: CaptureChannels, shared: Arc<EngineShared>)
        -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;
}

/// Replays a fixed list of frames, optionally at the capture rate
///
/// Unlike live capture, replay never drops: it waits for a free buffer.
pub struct ReplaySource {
    frames: Option<Vec<AudioFrame>>,
    channels: usize,
    pace: Option<Duration>,
    feeder: Option<JoinHandle<()>>,
}

impl ReplaySource {
    /// Deliver frames as fast as the worker consumes them
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        let channels = frames.first().map_or(RAW_CHANNELS, |f| f.channels());
        Self {
            frames: Some(frames),
            channels,
            pace: None,
            feeder: None,
        }
    }

    /// Deliver one frame per `period`, like a live device would
    pub fn paced(frames: Vec<AudioFrame>, period: Duration) -> Self {
        Self {
            pace: Some(period),
            ..Self::new(frames)
        }
    }
}

impl FrameSource for ReplaySource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn start(
        &mut self,
        mut channels: CaptureChannels,
        shared: Arc<EngineShared>,
    ) -> Result<(), AudioError> {
        let frames = self.frames.take().ok_or(AudioError::AlreadyRunning)?;
        let pace = self.pace;

        let feeder = thread::Builder::new()
            .name("doa-replay".to_string())
            .spawn(move || {
                let started = Instant::now();
                for (index, frame) in frames.iter().enumerate() {
                    if let Some(period) = pace {
                        let due = started + period * index as u32;
                        if let Some(wait) = due.checked_duration_since(Instant::now()) {
                            thread::sleep(wait);
                        }
                    }

                    let mut buffer = loop {
                        if !shared.is_running() {
                            tracing::info!("[Replay] Stopped after {} frames", index);
                            shared.mark_source_done();
                            return;
                        }
                        match channels.pool_consumer.pop() {
                            Ok(buffer) => break buffer,
                            Err(_) => thread::sleep(Duration::from_millis(1)),
                        }
                    };

                    buffer.clear();
                    buffer.extend_from_slice(frame.samples());
                    if channels.data_producer.push(buffer).is_err() {
                        // Pool and data queue have equal capacity
                        shared.record_dropped(1);
                    }
                }
                tracing::info!("[Replay] Delivered {} frames", frames.len());
                shared.mark_source_done();
            })
            .map_err(|e| AudioError::HardwareError {
                details: format!("failed to spawn replay thread: {}", e),
            })?;

        self.feeder = Some(feeder);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        match self.feeder.take() {
            Some(handle) => handle.join().map_err(|_| AudioError::StreamFailure {
                reason: "replay thread panicked".to_string(),
            }),
            None => Err(AudioError::NotRunning),
        }
    }
}
