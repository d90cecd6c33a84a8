// SignalMonitor - fixed-cadence poller of the last good frame
//
// Visualization collaborators that cannot be woken by the worker poll the
// published frame instead. Each poll clones the `Arc`, so the callback sees
// a frozen matrix even while the worker publishes the next one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::watch;

use crate::audio::frame::ChannelMatrix;
use crate::config::MIC_CHANNELS;

/// Background poller handing each new frame to a callback
pub struct SignalMonitor {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<u64>>,
}

impl SignalMonitor {
    /// Poll `frames` every `interval`; `on_frame` runs once per new frame
    pub fn spawn<F>(
        frames: watch::Receiver<Option<Arc<ChannelMatrix>>>,
        interval: Duration,
        mut on_frame: F,
    ) -> Self
    where
        F: FnMut(u64, &ChannelMatrix) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = thread::spawn(move || {
            let mut delivered = 0_u64;
            let mut last: Option<Arc<ChannelMatrix>> = None;
            while flag.load(Ordering::SeqCst) {
                let current = frames.borrow().clone();
                if let Some(frame) = current {
                    let is_new = last.as_ref().map_or(true, |prev| !Arc::ptr_eq(prev, &frame));
                    if is_new {
                        delivered += 1;
                        on_frame(delivered, &frame);
                        last = Some(frame);
                    }
                }
                thread::sleep(interval);
            }
            delivered
        });

        Self {
            running,
            thread: Some(thread),
        }
    }

    /// Stop polling; returns how many frames were delivered
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        self.running.store(false, Ordering::SeqCst);
        self.thread
            .take()
            .and_then(|thread| thread.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for SignalMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// First sample of every microphone, one console line per frame
pub fn format_frame_line(index: u64, frame: &ChannelMatrix) -> String {
    let values: String = (0..MIC_CHANNELS)
        .map(|mic| format!("{:>7}", frame.channel(mic).first().copied().unwrap_or(0)))
        .collect();
    format!("Frame {:>3}:    [{}   ]", index, values)
}
