// Live capture from the microphone array via cpal
//
// The stream is built and owned by a dedicated thread because cpal streams
// are not `Send` on every host. The data callback fills pool buffers with
// interleaved i16 samples and pushes each full frame; when no buffer is free
// the samples are discarded and counted as dropped frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::buffer_pool::CaptureChannels;
use crate::config::{CHUNK, RAW_CHANNELS, SAMPLE_RATE};
use crate::engine::{EngineShared, FrameSource};
use crate::error::AudioError;

/// Names of all input devices on the default host
pub fn list_input_devices() -> Result<Vec<String>, AudioError> {
    let host = cpal::default_host();
    let devices = host.input_devices().map_err(|e| AudioError::HardwareError {
        details: format!("Failed to enumerate input devices: {:?}", e),
    })?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

fn find_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: "No default input device found".to_string(),
            }),
        Some(wanted) => host
            .input_devices()
            .map_err(|e| AudioError::HardwareError {
                details: format!("Failed to enumerate input devices: {:?}", e),
            })?
            .find(|device| device.name().map_or(false, |n| n.contains(wanted)))
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: format!("No input device matching '{}'", wanted),
            }),
    }
}

/// Accumulates callback slices into frame-sized pool buffers
struct FrameAssembler {
    channels: CaptureChannels,
    shared: Arc<EngineShared>,
    frame_len: usize,
    pending: Option<Vec<i16>>,
    discarded: usize,
}

impl FrameAssembler {
    fn feed(&mut self, mut data: &[i16]) {
        if !self.shared.is_running() {
            return;
        }

        while !data.is_empty() {
            if self.pending.is_none() {
                if let Ok(mut buffer) = self.channels.pool_consumer.pop() {
                    buffer.clear();
                    self.pending = Some(buffer);
                    // The partly skipped frame is lost; the new one starts here
                    if self.discarded > 0 {
                        self.discarded = 0;
                        self.shared.record_dropped(1);
                    }
                }
            }

            match self.pending.as_mut() {
                Some(buffer) => {
                    let take = (self.frame_len - buffer.len()).min(data.len());
                    buffer.extend_from_slice(&data[..take]);
                    data = &data[take..];

                    if buffer.len() == self.frame_len {
                        if let Some(full) = self.pending.take() {
                            if self.channels.data_producer.push(full).is_err() {
                                self.shared.record_dropped(1);
                            }
                        }
                    }
                }
                None => {
                    // Worker is behind: skip samples a whole frame at a time
                    let take = (self.frame_len - self.discarded).min(data.len());
                    self.discarded += take;
                    data = &data[take..];
                    if self.discarded == self.frame_len {
                        self.discarded = 0;
                        self.shared.record_dropped(1);
                    }
                }
            }
        }
    }
}

/// Eight-channel 44.1 kHz input stream
pub struct CpalCapture {
    device_name: Option<String>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalCapture {
    /// Capture from the device whose name contains `device_name`, or the default
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    fn open_stream(
        device_name: Option<&str>,
        assembler: FrameAssembler,
    ) -> Result<cpal::Stream, AudioError> {
        let device = find_device(device_name)?;
        log::info!(
            "[CpalCapture] Opening '{}'",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let config = cpal::StreamConfig {
            channels: RAW_CHANNELS as u16,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut assembler = assembler;
        let err_fn = |err| log::error!("[CpalCapture] Input stream error: {}", err);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| assembler.feed(data),
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("{:?}", e),
            })?;

        stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start input stream: {:?}", e),
        })?;
        Ok(stream)
    }
}

impl FrameSource for CpalCapture {
    fn channels(&self) -> usize {
        RAW_CHANNELS
    }

    fn start(
        &mut self,
        channels: CaptureChannels,
        shared: Arc<EngineShared>,
    ) -> Result<(), AudioError> {
        if self.thread.is_some() {
            return Err(AudioError::AlreadyRunning);
        }
        self.stop_flag.store(false, Ordering::SeqCst);

        let assembler = FrameAssembler {
            channels,
            shared: Arc::clone(&shared),
            frame_len: CHUNK * RAW_CHANNELS,
            pending: None,
            discarded: 0,
        };
        let device_name = self.device_name.clone();
        let stop_flag = Arc::clone(&self.stop_flag);
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("doa-capture".to_string())
            .spawn(move || {
                let stream = match Self::open_stream(device_name.as_deref(), assembler) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                while !stop_flag.load(Ordering::SeqCst) && shared.is_running() {
                    thread::sleep(Duration::from_millis(10));
                }
                drop(stream);
                log::info!("[CpalCapture] Stream closed");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::StreamFailure {
                    reason: "capture thread exited before opening the stream".to_string(),
                })
            }
        }
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let thread = self.thread.take().ok_or(AudioError::NotRunning)?;
        self.stop_flag.store(true, Ordering::SeqCst);
        thread.join().map_err(|_| AudioError::StreamFailure {
            reason: "capture thread panicked".to_string(),
        })
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}
