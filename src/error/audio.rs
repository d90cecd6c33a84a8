// Audio error types - capture device, stream lifecycle, raw frame layout

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Stable codes for `AudioError`, range 1001-1008
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    pub const ALREADY_RUNNING: i32 = 1001;
    pub const NOT_RUNNING: i32 = 1002;
    /// Device enumeration or thread spawn failed
    pub const HARDWARE_ERROR: i32 = 1003;
    /// The input device refused the 8-channel 44.1 kHz i16 layout
    pub const STREAM_OPEN_FAILED: i32 = 1004;
    pub const LOCK_POISONED: i32 = 1005;
    /// Capture stream or a pipeline thread ended unexpectedly
    pub const STREAM_FAILURE: i32 = 1006;
    pub const CHANNEL_COUNT_MISMATCH: i32 = 1007;
    pub const FRAME_LENGTH_MISMATCH: i32 = 1008;
}

/// Emit one structured error line for a capture-side failure
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "[Audio] {} failed: code={} message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Device, stream lifecycle and raw frame layout failures
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    AlreadyRunning,
    NotRunning,
    HardwareError { details: String },
    StreamOpenFailed { reason: String },
    LockPoisoned { component: String },
    StreamFailure { reason: String },
    /// Source delivers a different raw channel count than the remapper expects
    ChannelCountMismatch { expected: usize, actual: usize },
    /// Interleaved sample count is not CHUNK x channels
    FrameLengthMismatch { expected: usize, actual: usize },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::NotRunning => AudioErrorCodes::NOT_RUNNING,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::ChannelCountMismatch { .. } => AudioErrorCodes::CHANNEL_COUNT_MISMATCH,
            AudioError::FrameLengthMismatch { .. } => AudioErrorCodes::FRAME_LENGTH_MISMATCH,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::AlreadyRunning => "Frame source is already running".to_string(),
            AudioError::NotRunning => "Frame source is not running".to_string(),
            AudioError::HardwareError { details } => format!("Array hardware: {}", details),
            AudioError::StreamOpenFailed { reason } => {
                format!("Cannot open the capture stream: {}", reason)
            }
            AudioError::LockPoisoned { component } => format!("{} lock poisoned", component),
            AudioError::StreamFailure { reason } => format!("Capture stopped: {}", reason),
            AudioError::ChannelCountMismatch { expected, actual } => {
                format!(
                    "Channel layout mismatch: expected {} raw channels, got {}",
                    expected, actual
                )
            }
            AudioError::FrameLengthMismatch { expected, actual } => {
                format!(
                    "Frame length mismatch: expected {} interleaved samples, got {}",
                    expected, actual
                )
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message(), self.code())
    }
}

impl std::error::Error for AudioError {}

/// Thread spawn and file failures surface as hardware errors
impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}
