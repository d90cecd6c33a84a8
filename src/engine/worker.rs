// Predictor worker - the one thread that runs the per-frame pipeline
//
// Pops raw frames from the data queue in capture order, runs
// `Predictor::process_frame` synchronously, returns each buffer to the pool
// and publishes whole-value snapshots. There is no watchdog: a slow backend
// call delays every later frame, and the capture side drops what does not
// fit in the pool.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::PopError;
use tokio::sync::{mpsc, watch};

use crate::analysis::gate::GateState;
use crate::analysis::Predictor;
use crate::audio::buffer_pool::WorkerChannels;
use crate::audio::frame::{AudioFrame, ChannelMatrix};
use crate::error::{log_audio_error, log_inference_error, PipelineError};
use crate::session::{PredictionSnapshot, SessionState, SessionSummary};
use crate::telemetry;

use super::EngineShared;

/// What the worker hands back when it exits
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub summary: SessionSummary,
    /// Fatal error that ended the session early
    pub failure: Option<PipelineError>,
}

pub(crate) struct Publishers {
    pub snapshot: watch::Sender<Arc<PredictionSnapshot>>,
    pub frame: watch::Sender<Option<Arc<ChannelMatrix>>>,
    pub reports: Option<mpsc::UnboundedSender<Arc<PredictionSnapshot>>>,
}

struct PredictorWorker {
    channels: WorkerChannels,
    raw_channels: usize,
    predictor: Predictor,
    session: SessionState,
    shared: Arc<EngineShared>,
    publishers: Publishers,
    reported_drops: u64,
}

impl PredictorWorker {
    fn run(mut self) -> SessionReport {
        tracing::info!(
            "[PredictorThread] Starting, backend={:?}",
            self.predictor.azimuth_backend()
        );

        let capacity = self.channels.data_consumer.buffer().capacity().max(1);
        let mut failure = None;

        loop {
            let buffer = match self.channels.data_consumer.pop() {
                Ok(buffer) => buffer,
                Err(PopError::Empty) => {
                    let finished = !self.shared.is_running() || self.shared.is_source_done();
                    // Re-check: the source may have pushed after the failed pop
                    if finished && self.channels.data_consumer.is_empty() {
                        tracing::info!("[PredictorThread] Queue drained, exiting");
                        break;
                    }
                    if !finished {
                        thread::sleep(Duration::from_millis(1));
                    }
                    continue;
                }
            };

            let occupancy = self.channels.data_consumer.slots() as f32 / capacity as f32 * 100.0;
            telemetry::hub().record_buffer_occupancy("frame_queue", occupancy);

            let (result, buffer) = self.process(buffer);

            if self.channels.pool_producer.push(buffer).is_err() {
                tracing::warn!("[PredictorThread] Pool queue full, dropping buffer");
            }

            if let Err(err) = result {
                match &err {
                    PipelineError::Audio(e) => log_audio_error(e, "process_frame"),
                    PipelineError::Inference(e) => log_inference_error(e, "process_frame"),
                }
                telemetry::hub().record_error(&err, "process_frame");
                failure = Some(err);
                break;
            }

            self.report_drops();
        }

        self.report_drops();
        let summary = self.session.summary();
        tracing::info!(
            "[PredictorThread] Finished after {} frames ({} inferred)",
            summary.frames_processed,
            summary.frames_inferred
        );
        SessionReport { summary, failure }
    }

    /// Run one buffer through the pipeline and get the buffer back
    fn process(&mut self, buffer: Vec<i16>) -> (Result<(), PipelineError>, Vec<i16>) {
        self.apply_backend_request();
        self.session.is_active = self.shared.is_active();

        let frame = match AudioFrame::new(buffer, self.raw_channels) {
            Ok(frame) => frame,
            Err(err) => {
                // The length check failed, so the buffer was consumed; hand a
                // fresh one back to keep the pool at full strength
                let len = crate::config::CHUNK * self.raw_channels;
                return (Err(err.into()), vec![0; len]);
            }
        };

        let previous = self.session.gate_state;
        let result = match self.predictor.process_frame(&mut self.session, &frame) {
            Ok(outcome) => {
                telemetry::hub().record_gate_transition(previous, outcome.gate_state);
                self.publish(outcome.diagnostic, outcome.gate_state);
                Ok(())
            }
            Err(err) => Err(err),
        };

        (result, frame.into_samples())
    }

    fn publish(&mut self, diagnostic: Option<String>, state: GateState) {
        let snapshot = Arc::new(self.session.snapshot(diagnostic));
        if let Some(reports) = &self.publishers.reports {
            // A closed queue only means nobody is reading any more
            let _ = reports.send(Arc::clone(&snapshot));
        }
        self.publishers.snapshot.send_replace(snapshot);

        if state != GateState::Idle {
            self.publishers
                .frame
                .send_replace(self.session.last_good_frame.clone());
        }
    }

    fn apply_backend_request(&mut self) {
        let wanted = self.shared.requested_backend();
        if wanted == self.predictor.azimuth_backend() {
            return;
        }
        if let Err(err) = self.predictor.set_azimuth_backend(wanted) {
            log_inference_error(&err, "backend switch");
            self.shared.request_backend(self.predictor.azimuth_backend());
        }
    }

    fn report_drops(&mut self) {
        let dropped = self.shared.frames_dropped();
        if dropped != self.reported_drops {
            tracing::warn!("[PredictorThread] {} frames dropped so far", dropped);
            telemetry::hub().record_frames_dropped(dropped);
            self.reported_drops = dropped;
        }
    }
}

pub(crate) fn spawn_predictor_thread(
    channels: WorkerChannels,
    raw_channels: usize,
    predictor: Predictor,
    session: SessionState,
    shared: Arc<EngineShared>,
    publishers: Publishers,
) -> std::io::Result<JoinHandle<SessionReport>> {
    thread::Builder::new()
        .name("doa-predictor".to_string())
        .spawn(move || {
            let worker = PredictorWorker {
                channels,
                raw_channels,
                predictor,
                session,
                shared,
                publishers,
                reported_drops: 0,
            };
            worker.run()
        })
}
