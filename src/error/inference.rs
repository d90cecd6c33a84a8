// Inference error types - model loading, tensor layout, backend invocation

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Inference error code constants
///
/// Error code range: 3001-3006
pub struct InferenceErrorCodes {}

impl InferenceErrorCodes {
    /// Model file could not be loaded
    pub const MODEL_LOAD_FAILED: i32 = 3001;

    /// Engine could not allocate its tensors
    pub const TENSOR_ALLOCATION_FAILED: i32 = 3002;

    /// Feature matrix does not fit the model input shape
    pub const SHAPE_MISMATCH: i32 = 3003;

    /// Tensor element type not handled by the quantizer
    pub const UNSUPPORTED_ELEMENT_TYPE: i32 = 3004;

    /// Engine invocation failed
    pub const INVOCATION_FAILED: i32 = 3005;

    /// Requested backend was not loaded for this session
    pub const BACKEND_UNAVAILABLE: i32 = 3006;
}

/// Log an inference error with structured context
pub fn log_inference_error(err: &InferenceError, context: &str) {
    error!(
        "[Inference] {} failed: code={} message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by model loading and backend invocation
///
/// Every variant is fatal for the current session; there is no retry.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// Model file missing or unreadable
    ModelLoadFailed { reason: String },

    /// Engine failed to allocate tensors
    TensorAllocationFailed { reason: String },

    /// Input or output tensor shape differs from what the backend can build
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Element type not supported for this tensor role
    UnsupportedElementType { element_type: String },

    /// The black-box engine reported a fault
    InvocationFailed { reason: String },

    /// The selected backend was not loaded
    BackendUnavailable { backend: String },
}

impl ErrorCode for InferenceError {
    fn code(&self) -> i32 {
        match self {
            InferenceError::ModelLoadFailed { .. } => InferenceErrorCodes::MODEL_LOAD_FAILED,
            InferenceError::TensorAllocationFailed { .. } => {
                InferenceErrorCodes::TENSOR_ALLOCATION_FAILED
            }
            InferenceError::ShapeMismatch { .. } => InferenceErrorCodes::SHAPE_MISMATCH,
            InferenceError::UnsupportedElementType { .. } => {
                InferenceErrorCodes::UNSUPPORTED_ELEMENT_TYPE
            }
            InferenceError::InvocationFailed { .. } => InferenceErrorCodes::INVOCATION_FAILED,
            InferenceError::BackendUnavailable { .. } => InferenceErrorCodes::BACKEND_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            InferenceError::ModelLoadFailed { reason } => {
                format!("Failed to load model: {}", reason)
            }
            InferenceError::TensorAllocationFailed { reason } => {
                format!("Failed to allocate tensors: {}", reason)
            }
            InferenceError::ShapeMismatch { expected, actual } => {
                format!("Tensor shape mismatch: expected {:?}, got {:?}", expected, actual)
            }
            InferenceError::UnsupportedElementType { element_type } => {
                format!("Unsupported tensor element type: {}", element_type)
            }
            InferenceError::InvocationFailed { reason } => {
                format!("Inference invocation failed: {}", reason)
            }
            InferenceError::BackendUnavailable { backend } => {
                format!("Backend not loaded for this session: {}", backend)
            }
        }
    }
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message(), self.code())
    }
}

impl std::error::Error for InferenceError {}
