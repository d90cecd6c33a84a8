//! Inference engine doubles
//!
//! Deterministic `InferenceEngine` implementations for driving the
//! classifier path without a trained model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::analysis::model::{InferenceEngine, ModelSpec, Tensor, TensorData, TensorSpec};
use crate::error::InferenceError;

/// Most recent input handed to an engine, shared with the test
pub type InputLog = Arc<Mutex<Option<Tensor>>>;

/// Returns the same output for every input, counts invocations and keeps
/// the last input
pub struct ScriptedEngine {
    spec: ModelSpec,
    output: TensorData,
    calls: Arc<AtomicUsize>,
    last_input: InputLog,
}

impl ScriptedEngine {
    pub fn new(spec: ModelSpec, output: TensorData) -> Self {
        Self {
            spec,
            output,
            calls: Arc::new(AtomicUsize::new(0)),
            last_input: Arc::new(Mutex::new(None)),
        }
    }

    /// Float model on the lag-major GCC input with a fixed output vector
    pub fn float(name: &str, output: Vec<f32>) -> Self {
        let spec = ModelSpec {
            name: name.to_string(),
            input: TensorSpec::f32(vec![1, 25, 15, 1]),
            output: TensorSpec::f32(vec![1, output.len()]),
        };
        Self::new(spec, TensorData::F32(output))
    }

    /// `bins` outputs, zero except `confidence` at `index`
    pub fn one_hot(name: &str, bins: usize, index: usize, confidence: f32) -> Self {
        let mut output = vec![0.0; bins];
        if let Some(slot) = output.get_mut(index) {
            *slot = confidence;
        }
        Self::float(name, output)
    }

    /// Shared invocation counter, readable after the engine is boxed
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Last tensor passed to `invoke`, readable after the engine is boxed
    pub fn input_log(&self) -> InputLog {
        Arc::clone(&self.last_input)
    }
}

impl InferenceEngine for ScriptedEngine {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn invoke(&mut self, input: &Tensor) -> Result<Tensor, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_input.lock() {
            *last = Some(input.clone());
        }
        Tensor::new(self.spec.output.shape.clone(), self.output.clone())
    }
}

/// Loads fine and fails on every invocation
pub struct FailingEngine {
    spec: ModelSpec,
}

impl FailingEngine {
    pub fn new(bins: usize) -> Self {
        Self::with_spec(ModelSpec {
            name: "failing".to_string(),
            input: TensorSpec::f32(vec![1, 25, 15]),
            output: TensorSpec::f32(vec![1, bins]),
        })
    }

    pub fn with_spec(spec: ModelSpec) -> Self {
        Self { spec }
    }
}

impl InferenceEngine for FailingEngine {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn invoke(&mut self, _input: &Tensor) -> Result<Tensor, InferenceError> {
        Err(InferenceError::InvocationFailed {
            reason: "engine fault".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_hot_engine_counts_calls() {
        let mut engine = ScriptedEngine::one_hot("az", 360, 37, 0.92);
        let calls = engine.calls();
        let log = engine.input_log();
        let input = Tensor::new(vec![1, 25, 15, 1], TensorData::F32(vec![0.0; 375])).unwrap();
        let out = engine.invoke(&input).unwrap();
        assert_eq!(out.shape, vec![1, 360]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.lock().unwrap().as_ref(), Some(&input));
        match out.data {
            TensorData::F32(values) => assert_eq!(values[37], 0.92),
            other => panic!("unexpected output {:?}", other),
        }
    }
}
