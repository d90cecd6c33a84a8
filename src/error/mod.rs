// Error types for the DOA pipeline
//
// Each concern gets its own enum with stable numeric codes. Startup failures
// (device open, model load, tensor allocation, channel layout) abort session
// initialization; per-frame anomalies never surface here.

mod audio;
mod inference;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use inference::{log_inference_error, InferenceError, InferenceErrorCodes};

use std::fmt;

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so the CLI and display collaborators can report
/// failures consistently.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Failure of one `process_frame` call
///
/// Backend invocation failures end up here and are fatal for the session:
/// they are reported distinctly from a zero-confidence prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Audio(AudioError),
    Inference(InferenceError),
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::Audio(err) => err.code(),
            PipelineError::Inference(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::Audio(err) => err.message(),
            PipelineError::Inference(err) => err.message(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Audio(err) => err.fmt(f),
            PipelineError::Inference(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<AudioError> for PipelineError {
    fn from(err: AudioError) -> Self {
        PipelineError::Audio(err)
    }
}

impl From<InferenceError> for PipelineError {
    fn from(err: InferenceError) -> Self {
        PipelineError::Inference(err)
    }
}
