// ActivityGate - admission control before any feature extraction
//
// States:
// - Idle: the run control is off; nothing runs and nothing is cleared
// - ListeningActive: peak above threshold; the full pipeline runs
// - ListeningSilent: peak at or below threshold; the silence counter grows
//   and predictions are cleared only when it reaches the configured maximum

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;

/// Gate state for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    ListeningSilent,
    ListeningActive,
}

/// What the controller should do with the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Run control off
    Idle,
    /// Run features, backend and aggregator
    Run,
    /// Skip inference; `clear` is true on the frame that reaches the
    /// silence limit
    Hold { clear: bool },
}

impl GateDecision {
    pub fn state(&self) -> GateState {
        match self {
            GateDecision::Idle => GateState::Idle,
            GateDecision::Run => GateState::ListeningActive,
            GateDecision::Hold { .. } => GateState::ListeningSilent,
        }
    }
}

/// Peak threshold with silence hysteresis
#[derive(Debug, Clone)]
pub struct ActivityGate {
    threshold: i32,
    max_silence_frames: u32,
}

impl ActivityGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            threshold: config.threshold as i32,
            max_silence_frames: config.max_silence_frames.max(1),
        }
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    pub fn max_silence_frames(&self) -> u32 {
        self.max_silence_frames
    }

    /// Decide for one frame and update the silence counter
    pub fn step(&self, is_active: bool, peak: i32, silent_frames: &mut u32) -> GateDecision {
        if !is_active {
            return GateDecision::Idle;
        }

        if peak > self.threshold {
            *silent_frames = 0;
            return GateDecision::Run;
        }

        *silent_frames += 1;
        if *silent_frames >= self.max_silence_frames {
            *silent_frames = 0;
            GateDecision::Hold { clear: true }
        } else {
            GateDecision::Hold { clear: false }
        }
    }
}

impl Default for ActivityGate {
    fn default() -> Self {
        Self::new(&GateConfig::default())
    }
}
