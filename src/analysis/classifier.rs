// ClassifierBackend - learned angle classifier on the GCC-PHAT matrix
//
// The backend adapts the 15 x 25 GCC matrix to whatever input tensor the
// engine declares (lag-major or pair-major, optional batch and trailing unit
// axes, optional quantization), invokes the engine, and turns the output
// into a confidence vector and an argmax angle.

use std::time::Instant;

use super::backend::{estimate_from, BackendOutput};
use super::features::GccMatrix;
use super::model::{InferenceEngine, ModelSpec, Tensor};
use super::quantizer::{dequantize, quantize};
use crate::error::InferenceError;

/// Memory order of the GCC values inside the input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// `[.., lags, pairs]`: the transposed matrix
    LagMajor,
    /// `[.., pairs, lags]`: one row per microphone pair
    PairMajor,
}

/// Classifier over one angular axis (azimuth or elevation)
pub struct ClassifierBackend {
    engine: Box<dyn InferenceEngine>,
    layout: InputLayout,
    resolution: usize,
}

impl ClassifierBackend {
    /// Bind an engine to a GCC matrix of `pairs x lags`
    ///
    /// Fails when the model's tensors cannot hold the features or produce
    /// `360 / resolution` confidences. This is the startup check; no frame is
    /// processed with a model that fails it.
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        pairs: usize,
        lags: usize,
        resolution: usize,
    ) -> Result<Self, InferenceError> {
        let spec = engine.spec();
        let layout = detect_layout(&spec.input.shape, pairs, lags)?;

        let bins = 360 / resolution;
        if spec.output.element_count() != bins {
            return Err(InferenceError::ShapeMismatch {
                expected: vec![1, bins],
                actual: spec.output.shape.clone(),
            });
        }

        tracing::info!(
            "[Classifier] {} model input tensor: {:?} ({:?}, {:?})",
            spec.name,
            spec.input.shape,
            spec.input.dtype,
            layout
        );
        tracing::info!(
            "[Classifier] {} model output tensor: {:?} ({:?})",
            spec.name,
            spec.output.shape,
            spec.output.dtype
        );

        Ok(Self {
            engine,
            layout,
            resolution,
        })
    }

    pub fn spec(&self) -> &ModelSpec {
        self.engine.spec()
    }

    pub fn layout(&self) -> InputLayout {
        self.layout
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Build the engine input tensor for one GCC matrix
    pub fn input_tensor(&self, gcc: &GccMatrix) -> Result<Tensor, InferenceError> {
        let spec = &self.engine.spec().input;
        let values = match self.layout {
            InputLayout::LagMajor => gcc.to_lag_major(),
            InputLayout::PairMajor => gcc.as_pair_major().to_vec(),
        };
        let data = quantize(&values, spec.dtype, spec.active_quantization())?;
        Tensor::new(spec.shape.clone(), data)
    }

    /// Run the model on one GCC matrix
    pub fn predict(&mut self, gcc: &GccMatrix) -> Result<BackendOutput, InferenceError> {
        let input = self.input_tensor(gcc)?;

        let start = Instant::now();
        let output = self.engine.invoke(&input)?;
        let latency = start.elapsed();

        let confidences = dequantize(&output.data, self.spec().output.active_quantization());
        let bins = 360 / self.resolution;
        if confidences.len() != bins {
            return Err(InferenceError::ShapeMismatch {
                expected: vec![1, bins],
                actual: output.shape,
            });
        }

        Ok(BackendOutput {
            estimate: estimate_from(&confidences, self.resolution),
            confidences,
            latency,
        })
    }
}

/// Match the model input shape against the feature matrix
///
/// Accepts `[1, a, b]` and, for rank-4 models, `[1, a, b, 1]`, where
/// `(a, b)` is `(lags, pairs)` or `(pairs, lags)`.
fn detect_layout(shape: &[usize], pairs: usize, lags: usize) -> Result<InputLayout, InferenceError> {
    for (layout, core) in [
        (InputLayout::LagMajor, [lags, pairs]),
        (InputLayout::PairMajor, [pairs, lags]),
    ] {
        let mut expected = vec![1, core[0], core[1]];
        if shape.len() == expected.len() + 1 {
            expected.push(1);
        }
        if shape == expected.as_slice() {
            return Ok(layout);
        }
    }
    Err(InferenceError::ShapeMismatch {
        expected: vec![1, lags, pairs],
        actual: shape.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::model::{ElementType, QuantizationParams, TensorData, TensorSpec};
    use crate::testing::engines::{FailingEngine, ScriptedEngine};

    fn spec(input: TensorSpec, output: TensorSpec) -> ModelSpec {
        ModelSpec {
            name: "test".to_string(),
            input,
            output,
        }
    }

    fn ramp_gcc() -> GccMatrix {
        let mut gcc = GccMatrix::zeros(15, 25);
        for pair in 0..15 {
            for (lag, v) in gcc.row_mut(pair).iter_mut().enumerate() {
                *v = (pair * 100 + lag) as f32;
            }
        }
        gcc
    }

    #[test]
    fn test_one_hot_output_gives_bin_angle() {
        let mut output = vec![0.0; 360];
        output[37] = 0.92;
        let engine = ScriptedEngine::new(
            spec(TensorSpec::f32(vec![1, 25, 15]), TensorSpec::f32(vec![1, 360])),
            TensorData::F32(output),
        );
        let log = engine.input_log();
        let mut backend = ClassifierBackend::new(Box::new(engine), 15, 25, 1).unwrap();
        let out = backend.predict(&ramp_gcc()).unwrap();
        let seen = log.lock().unwrap().clone().expect("engine invoked");
        assert_eq!(seen.shape, vec![1, 25, 15]);
        assert_eq!(out.estimate.angle_deg, 37);
        assert!((out.estimate.confidence - 0.92).abs() < 1e-6);
        assert_eq!(out.confidences.len(), 360);
    }

    #[test]
    fn test_layout_follows_input_shape() {
        assert_eq!(detect_layout(&[1, 25, 15], 15, 25).unwrap(), InputLayout::LagMajor);
        assert_eq!(detect_layout(&[1, 25, 15, 1], 15, 25).unwrap(), InputLayout::LagMajor);
        assert_eq!(detect_layout(&[1, 15, 25], 15, 25).unwrap(), InputLayout::PairMajor);
        assert!(matches!(
            detect_layout(&[1, 375], 15, 25),
            Err(InferenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_lag_major_input_is_transposed() {
        let engine = ScriptedEngine::new(
            spec(TensorSpec::f32(vec![1, 25, 15, 1]), TensorSpec::f32(vec![1, 36])),
            TensorData::F32(vec![0.0; 36]),
        );
        let backend = ClassifierBackend::new(Box::new(engine), 15, 25, 10).unwrap();
        let input = backend.input_tensor(&ramp_gcc()).unwrap();
        assert_eq!(input.shape, vec![1, 25, 15, 1]);
        match input.data {
            TensorData::F32(values) => {
                // element [lag=1, pair=2]
                assert_eq!(values[15 + 2], 201.0);
            }
            other => panic!("unexpected input {:?}", other),
        }
    }

    #[test]
    fn test_quantized_model_round_trip() {
        let input_q = QuantizationParams {
            scale: 2.0,
            zero_point: 10,
        };
        let output_q = QuantizationParams {
            scale: 1.0 / 256.0,
            zero_point: 0,
        };
        let mut output = vec![0_u8; 360];
        output[90] = 200;
        let engine = ScriptedEngine::new(
            spec(
                TensorSpec {
                    shape: vec![1, 15, 25],
                    dtype: ElementType::U8,
                    quantization: Some(input_q),
                },
                TensorSpec {
                    shape: vec![1, 360],
                    dtype: ElementType::U8,
                    quantization: Some(output_q),
                },
            ),
            TensorData::U8(output),
        );
        let log = engine.input_log();
        let mut backend = ClassifierBackend::new(Box::new(engine), 15, 25, 1).unwrap();

        let mut gcc = GccMatrix::zeros(15, 25);
        gcc.row_mut(0)[0] = 20.0;
        gcc.row_mut(0)[1] = -100.0;
        let input = backend.input_tensor(&gcc).unwrap();
        match &input.data {
            TensorData::U8(values) => {
                assert_eq!(values[0], 20);
                assert_eq!(values[1], 0, "saturated");
                assert_eq!(values[2], 10, "zero maps to zero point");
            }
            other => panic!("unexpected input {:?}", other),
        }

        let out = backend.predict(&gcc).unwrap();
        assert_eq!(log.lock().unwrap().as_ref(), Some(&input));
        assert_eq!(out.estimate.angle_deg, 90);
        assert!((out.estimate.confidence - 200.0 / 256.0).abs() < 1e-6);
    }

    #[test]
    fn test_output_size_checked_at_startup() {
        let engine = ScriptedEngine::new(
            spec(TensorSpec::f32(vec![1, 25, 15]), TensorSpec::f32(vec![1, 10])),
            TensorData::F32(vec![0.0; 10]),
        );
        assert!(matches!(
            ClassifierBackend::new(Box::new(engine), 15, 25, 1),
            Err(InferenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_engine_failure_propagates() {
        let engine = FailingEngine::with_spec(spec(
            TensorSpec::f32(vec![1, 25, 15]),
            TensorSpec::f32(vec![1, 360]),
        ));
        let mut backend = ClassifierBackend::new(Box::new(engine), 15, 25, 1).unwrap();
        assert!(matches!(
            backend.predict(&ramp_gcc()),
            Err(InferenceError::InvocationFailed { .. })
        ));
    }
}
