// Model boundary - tensor descriptions and the black-box inference call
//
// A backend never looks inside an engine. It reads the engine's `ModelSpec`
// once at startup to decide how to lay out and (de)quantize tensors, then
// calls `invoke` once per active frame.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Tensor element types an engine may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    F32,
    U8,
    I8,
}

/// Affine quantization: real = (q - zero_point) * scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationParams {
    pub scale: f32,
    pub zero_point: i32,
}

/// Shape, element type and optional quantization of one tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub shape: Vec<usize>,
    pub dtype: ElementType,
    #[serde(default)]
    pub quantization: Option<QuantizationParams>,
}

impl TensorSpec {
    pub fn f32(shape: Vec<usize>) -> Self {
        Self {
            shape,
            dtype: ElementType::F32,
            quantization: None,
        }
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Quantization that applies to this tensor, if its type is an integer
    /// type with a usable scale
    pub fn active_quantization(&self) -> Option<QuantizationParams> {
        match self.dtype {
            ElementType::F32 => None,
            ElementType::U8 | ElementType::I8 => self.quantization.filter(|q| q.scale > 0.0),
        }
    }
}

/// Input and output description of one model; immutable after load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub input: TensorSpec,
    pub output: TensorSpec,
}

/// Tensor payload exchanged with an engine
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    U8(Vec<u8>),
    I8(Vec<i8>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::U8(v) => v.len(),
            TensorData::I8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::F32(_) => ElementType::F32,
            TensorData::U8(_) => ElementType::U8,
            TensorData::I8(_) => ElementType::I8,
        }
    }
}

/// Shaped tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl Tensor {
    /// Build a tensor, checking that the payload fills the shape exactly
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self, InferenceError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(InferenceError::ShapeMismatch {
                expected: shape,
                actual: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }
}

/// Opaque tensor-in/tensor-out inference engine
///
/// Implementations own whatever runtime they wrap. `invoke` may take as
/// long as it needs; the caller measures the latency.
pub trait InferenceEngine: Send {
    fn spec(&self) -> &ModelSpec;

    fn invoke(&mut self, input: &Tensor) -> Result<Tensor, InferenceError>;
}

/// Single dense layer (optionally softmaxed) stored as JSON
///
/// Small enough to ship alongside the CLI for replaying recordings without
/// an external runtime. Weights are row-major `[outputs, inputs]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseModel {
    pub spec: ModelSpec,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub softmax: bool,
}

impl DenseModel {
    /// Load and validate a model file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, InferenceError> {
        let contents =
            fs::read_to_string(path.as_ref()).map_err(|e| InferenceError::ModelLoadFailed {
                reason: format!("{}: {}", path.as_ref().display(), e),
            })?;
        let model: DenseModel =
            serde_json::from_str(&contents).map_err(|e| InferenceError::ModelLoadFailed {
                reason: format!("{}: {}", path.as_ref().display(), e),
            })?;
        model.validate()?;
        Ok(model)
    }

    /// Check that weights and bias match the declared tensor sizes
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.spec.input.dtype != ElementType::F32 || self.spec.output.dtype != ElementType::F32
        {
            return Err(InferenceError::UnsupportedElementType {
                element_type: "dense models are f32 only".to_string(),
            });
        }
        let inputs = self.spec.input.element_count();
        let outputs = self.spec.output.element_count();
        if self.weights.len() != inputs * outputs || self.bias.len() != outputs {
            return Err(InferenceError::TensorAllocationFailed {
                reason: format!(
                    "expected {} weights and {} biases, found {} and {}",
                    inputs * outputs,
                    outputs,
                    self.weights.len(),
                    self.bias.len()
                ),
            });
        }
        Ok(())
    }
}

impl InferenceEngine for DenseModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn invoke(&mut self, input: &Tensor) -> Result<Tensor, InferenceError> {
        let values = match &input.data {
            TensorData::F32(values) => values,
            other => {
                return Err(InferenceError::UnsupportedElementType {
                    element_type: format!("{:?}", other.element_type()),
                })
            }
        };
        let inputs = self.spec.input.element_count();
        if values.len() != inputs {
            return Err(InferenceError::ShapeMismatch {
                expected: self.spec.input.shape.clone(),
                actual: input.shape.clone(),
            });
        }

        let mut out: Vec<f32> = self
            .weights
            .chunks(inputs)
            .zip(self.bias.iter())
            .map(|(row, b)| row.iter().zip(values).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();

        if self.softmax {
            let max = out.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut total = 0.0;
            for v in out.iter_mut() {
                *v = (*v - max).exp();
                total += *v;
            }
            if total > 0.0 {
                out.iter_mut().for_each(|v| *v /= total);
            }
        }

        Tensor::new(self.spec.output.shape.clone(), TensorData::F32(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model(softmax: bool) -> DenseModel {
        DenseModel {
            spec: ModelSpec {
                name: "tiny".to_string(),
                input: TensorSpec::f32(vec![1, 2]),
                output: TensorSpec::f32(vec![1, 3]),
            },
            weights: vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            bias: vec![0.0, 0.0, -10.0],
            softmax,
        }
    }

    #[test]
    fn test_tensor_shape_must_match_payload() {
        assert!(Tensor::new(vec![2, 3], TensorData::F32(vec![0.0; 6])).is_ok());
        assert!(matches!(
            Tensor::new(vec![2, 3], TensorData::U8(vec![0; 5])),
            Err(InferenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_active_quantization_ignores_float_tensors() {
        let mut spec = TensorSpec::f32(vec![1, 4]);
        spec.quantization = Some(QuantizationParams {
            scale: 0.5,
            zero_point: 3,
        });
        assert_eq!(spec.active_quantization(), None);

        spec.dtype = ElementType::U8;
        assert_eq!(spec.active_quantization().map(|q| q.zero_point), Some(3));

        spec.quantization = Some(QuantizationParams {
            scale: 0.0,
            zero_point: 0,
        });
        assert_eq!(spec.active_quantization(), None);
    }

    #[test]
    fn test_dense_model_invoke() {
        let mut model = tiny_model(false);
        model.validate().unwrap();
        let input = Tensor::new(vec![1, 2], TensorData::F32(vec![2.0, 3.0])).unwrap();
        let out = model.invoke(&input).unwrap();
        assert_eq!(out.shape, vec![1, 3]);
        assert_eq!(out.data, TensorData::F32(vec![2.0, 3.0, -5.0]));
    }

    #[test]
    fn test_dense_model_softmax_sums_to_one() {
        let mut model = tiny_model(true);
        let input = Tensor::new(vec![1, 2], TensorData::F32(vec![2.0, 3.0])).unwrap();
        match model.invoke(&input).unwrap().data {
            TensorData::F32(values) => {
                let total: f32 = values.iter().sum();
                assert!((total - 1.0).abs() < 1e-5);
                assert!(values[1] > values[0]);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_dense_model_rejects_bad_weights() {
        let mut model = tiny_model(false);
        model.bias.pop();
        assert!(matches!(
            model.validate(),
            Err(InferenceError::TensorAllocationFailed { .. })
        ));
    }

    #[test]
    fn test_model_spec_json() {
        let json = r#"{
            "name": "azimuth",
            "input": { "shape": [1, 25, 15, 1], "dtype": "u8",
                       "quantization": { "scale": 0.01, "zero_point": 128 } },
            "output": { "shape": [1, 360], "dtype": "f32" }
        }"#;
        let spec: ModelSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.input.shape.len(), 4);
        assert!(spec.input.active_quantization().is_some());
        assert!(spec.output.quantization.is_none());
    }

    #[test]
    fn test_missing_model_file() {
        assert!(matches!(
            DenseModel::load("/nonexistent/model.json"),
            Err(InferenceError::ModelLoadFailed { .. })
        ));
    }
}
