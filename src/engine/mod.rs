//! Engine lifecycle: frame source, predictor worker and published state.
//!
//! `EngineHandle::start` validates the source against the channel layout,
//! allocates the frame pool, spawns the predictor worker and starts the
//! source. Control (run flag, backend choice) flows in through atomics;
//! results flow out through `watch` channels holding immutable snapshots,
//! so readers never observe a half-written frame. A `watch` keeps only the
//! newest value; callers that need every frame's snapshot start the engine
//! with `start_reporting` and drain the returned queue.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, watch};

use crate::analysis::Predictor;
use crate::audio::buffer_pool::BufferPool;
use crate::audio::frame::ChannelMatrix;
use crate::config::{AppConfig, BackendKind, CHUNK};
use crate::error::{AudioError, InferenceError, PipelineError};
use crate::session::{PredictionSnapshot, SessionState};

pub mod monitor;
pub mod source;
mod worker;

pub use monitor::SignalMonitor;
pub use source::{FrameSource, ReplaySource};
pub use worker::SessionReport;

use worker::{spawn_predictor_thread, Publishers};

/// Ordered queue of every snapshot the worker publishes
pub type ReportReceiver = mpsc::UnboundedReceiver<Arc<PredictionSnapshot>>;

fn encode_backend(kind: BackendKind) -> u8 {
    match kind {
        BackendKind::Classifier => 0,
        BackendKind::Music => 1,
    }
}

fn decode_backend(value: u8) -> BackendKind {
    match value {
        0 => BackendKind::Classifier,
        _ => BackendKind::Music,
    }
}

/// Flags shared by the control side, the source and the worker
pub struct EngineShared {
    running: AtomicBool,
    active: AtomicBool,
    backend: AtomicU8,
    source_done: AtomicBool,
    frames_dropped: AtomicU64,
}

impl EngineShared {
    pub(crate) fn new(active: bool, backend: BackendKind) -> Self {
        Self {
            running: AtomicBool::new(true),
            active: AtomicBool::new(active),
            backend: AtomicU8::new(encode_backend(backend)),
            source_done: AtomicBool::new(false),
            frames_dropped: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn requested_backend(&self) -> BackendKind {
        decode_backend(self.backend.load(Ordering::SeqCst))
    }

    pub(crate) fn request_backend(&self, kind: BackendKind) {
        self.backend.store(encode_backend(kind), Ordering::SeqCst);
    }

    /// A finite source has pushed its last frame
    pub fn mark_source_done(&self) {
        self.source_done.store(true, Ordering::SeqCst);
    }

    pub fn is_source_done(&self) -> bool {
        self.source_done.load(Ordering::SeqCst)
    }

    /// Count frames the source could not hand to the worker
    pub fn record_dropped(&self, frames: u64) {
        self.frames_dropped.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}

/// Running pipeline
pub struct EngineHandle {
    shared: Arc<EngineShared>,
    source: Box<dyn FrameSource>,
    worker: Option<JoinHandle<SessionReport>>,
    snapshot_rx: watch::Receiver<Arc<PredictionSnapshot>>,
    frame_rx: watch::Receiver<Option<Arc<ChannelMatrix>>>,
    available: Vec<BackendKind>,
}

impl EngineHandle {
    /// Start processing frames from `source`
    ///
    /// The run control starts as `active`. Fails without spawning anything
    /// when the source's channel layout does not match the remapper.
    pub fn start(
        config: &AppConfig,
        predictor: Predictor,
        source: Box<dyn FrameSource>,
        active: bool,
    ) -> Result<Self, PipelineError> {
        Self::launch(config, predictor, source, active, None)
    }

    /// Start like [`EngineHandle::start`] and also queue every snapshot
    ///
    /// The queue holds one entry per processed frame, in processing order,
    /// and closes once the worker has exited and its entries are drained.
    pub fn start_reporting(
        config: &AppConfig,
        predictor: Predictor,
        source: Box<dyn FrameSource>,
        active: bool,
    ) -> Result<(Self, ReportReceiver), PipelineError> {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let handle = Self::launch(config, predictor, source, active, Some(report_tx))?;
        Ok((handle, report_rx))
    }

    fn launch(
        config: &AppConfig,
        predictor: Predictor,
        mut source: Box<dyn FrameSource>,
        active: bool,
        reports: Option<mpsc::UnboundedSender<Arc<PredictionSnapshot>>>,
    ) -> Result<Self, PipelineError> {
        let raw_channels = source.channels();
        predictor.remapper().validate_channel_count(raw_channels)?;

        let pool = BufferPool::new(config.audio.buffer_pool_size.max(1), CHUNK * raw_channels);
        let (capture_channels, worker_channels) = pool.split_for_threads();

        let shared = Arc::new(EngineShared::new(active, predictor.azimuth_backend()));
        let available = predictor.available_backends();

        let session = SessionState::new(config.telemetry.latency_window);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(session.snapshot(None)));
        let (frame_tx, frame_rx) = watch::channel(None);

        let worker = spawn_predictor_thread(
            worker_channels,
            raw_channels,
            predictor,
            session,
            Arc::clone(&shared),
            Publishers {
                snapshot: snapshot_tx,
                frame: frame_tx,
                reports,
            },
        )
        .map_err(AudioError::from)?;

        if let Err(err) = source.start(capture_channels, Arc::clone(&shared)) {
            shared.running.store(false, Ordering::SeqCst);
            let _ = worker.join();
            return Err(err.into());
        }

        tracing::info!(
            "[Engine] Started: {} raw channels, pool of {} frames, active={}",
            raw_channels,
            config.audio.buffer_pool_size.max(1),
            active
        );
        Ok(Self {
            shared,
            source,
            worker: Some(worker),
            snapshot_rx,
            frame_rx,
            available,
        })
    }

    /// Toggle gated processing without touching the stream
    pub fn set_active(&self, active: bool) {
        self.shared.active.store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Ask the worker to switch azimuth backend before its next frame
    pub fn set_azimuth_backend(&self, kind: BackendKind) -> Result<(), InferenceError> {
        if !self.available.contains(&kind) {
            return Err(InferenceError::BackendUnavailable {
                backend: format!("{:?}", kind).to_lowercase(),
            });
        }
        self.shared.request_backend(kind);
        Ok(())
    }

    pub fn available_backends(&self) -> &[BackendKind] {
        &self.available
    }

    /// Receiver for the newest snapshot; intermediate frames may be skipped
    pub fn subscribe(&self) -> watch::Receiver<Arc<PredictionSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Most recently published snapshot (possibly one frame stale)
    pub fn latest(&self) -> Arc<PredictionSnapshot> {
        Arc::clone(&self.snapshot_rx.borrow())
    }

    /// Receiver for the last good frame
    pub fn frames(&self) -> watch::Receiver<Option<Arc<ChannelMatrix>>> {
        self.frame_rx.clone()
    }

    pub fn last_frame(&self) -> Option<Arc<ChannelMatrix>> {
        self.frame_rx.borrow().clone()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.shared.frames_dropped()
    }

    /// The worker has exited (source exhausted or fatal error)
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Cooperative shutdown
    ///
    /// The worker finishes its current frame, drains the queue and exits;
    /// then the source releases its device.
    pub fn stop(&mut self) -> Result<SessionReport, AudioError> {
        let worker = self.worker.take().ok_or(AudioError::NotRunning)?;
        self.shared.running.store(false, Ordering::SeqCst);

        let report = worker.join().map_err(|_| AudioError::StreamFailure {
            reason: "predictor thread panicked".to_string(),
        })?;

        if let Err(err) = self.source.stop() {
            tracing::warn!("[Engine] Source stop failed: {}", err);
        }

        tracing::info!(
            "[Engine] Stopped: {} frames, {} dropped",
            report.summary.frames_processed,
            self.shared.frames_dropped()
        );
        Ok(report)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}
