// Quantizer - affine fixed-point transforms for model tensors
//
// Pure numeric functions, independent of any engine:
//   quantize:   q = round(x / scale + zero_point), saturated to the type range
//   dequantize: x = (q - zero_point) * scale

use crate::analysis::model::{ElementType, QuantizationParams, TensorData};
use crate::error::InferenceError;

/// Quantize a single value into the integer range `[min, max]`
#[inline]
fn quantize_value(x: f32, q: QuantizationParams, min: f32, max: f32) -> f32 {
    (x / q.scale + q.zero_point as f32).round().clamp(min, max)
}

/// Encode floating values for a tensor of element type `dtype`
///
/// Float tensors pass through unchanged. Integer tensors require
/// quantization parameters.
pub fn quantize(
    values: &[f32],
    dtype: ElementType,
    params: Option<QuantizationParams>,
) -> Result<TensorData, InferenceError> {
    match (dtype, params) {
        (ElementType::F32, _) => Ok(TensorData::F32(values.to_vec())),
        (ElementType::U8, Some(q)) => Ok(TensorData::U8(
            values
                .iter()
                .map(|&x| quantize_value(x, q, u8::MIN as f32, u8::MAX as f32) as u8)
                .collect(),
        )),
        (ElementType::I8, Some(q)) => Ok(TensorData::I8(
            values
                .iter()
                .map(|&x| quantize_value(x, q, i8::MIN as f32, i8::MAX as f32) as i8)
                .collect(),
        )),
        (dtype, None) => Err(InferenceError::UnsupportedElementType {
            element_type: format!("{:?} without quantization parameters", dtype),
        }),
    }
}

/// Decode an engine output into floating confidences
///
/// Integer outputs without parameters are passed through as plain numbers.
pub fn dequantize(data: &TensorData, params: Option<QuantizationParams>) -> Vec<f32> {
    let (scale, zero_point) = params
        .map(|q| (q.scale, q.zero_point as f32))
        .unwrap_or((1.0, 0.0));
    match data {
        TensorData::F32(values) => values.clone(),
        TensorData::U8(values) => values
            .iter()
            .map(|&v| (v as f32 - zero_point) * scale)
            .collect(),
        TensorData::I8(values) => values
            .iter()
            .map(|&v| (v as f32 - zero_point) * scale)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const U8_PARAMS: QuantizationParams = QuantizationParams {
        scale: 0.05,
        zero_point: 128,
    };
    const I8_PARAMS: QuantizationParams = QuantizationParams {
        scale: 1.0 / 127.0,
        zero_point: 0,
    };

    #[test]
    fn test_u8_round_trip_within_one_step() {
        // Representable range is (0 - 128) * 0.05 ..= (255 - 128) * 0.05
        let mut x = -6.4_f32;
        while x <= 6.35 {
            let q = quantize(&[x], ElementType::U8, Some(U8_PARAMS)).unwrap();
            let back = dequantize(&q, Some(U8_PARAMS))[0];
            assert!(
                (back - x).abs() <= U8_PARAMS.scale,
                "x={} back={}",
                x,
                back
            );
            x += 0.013;
        }
    }

    #[test]
    fn test_i8_round_trip_within_one_step() {
        for i in -100..=100 {
            let x = i as f32 / 100.0;
            let q = quantize(&[x], ElementType::I8, Some(I8_PARAMS)).unwrap();
            let back = dequantize(&q, Some(I8_PARAMS))[0];
            assert!((back - x).abs() <= I8_PARAMS.scale);
        }
    }

    #[test]
    fn test_quantize_saturates() {
        let q = quantize(&[1e6, -1e6], ElementType::U8, Some(U8_PARAMS)).unwrap();
        assert_eq!(q, TensorData::U8(vec![255, 0]));

        let q = quantize(&[1e6, -1e6], ElementType::I8, Some(I8_PARAMS)).unwrap();
        assert_eq!(q, TensorData::I8(vec![127, -128]));
    }

    #[test]
    fn test_zero_point_only_offsets() {
        let params = QuantizationParams {
            scale: 0.00390625,
            zero_point: 0,
        };
        // Output scale only, as the usual uint8 softmax head
        let out = dequantize(&TensorData::U8(vec![0, 128, 255]), Some(params));
        assert_eq!(out, vec![0.0, 0.5, 0.99609375]);
    }

    #[test]
    fn test_float_passthrough() {
        let q = quantize(&[0.25, -3.0], ElementType::F32, None).unwrap();
        assert_eq!(dequantize(&q, None), vec![0.25, -3.0]);
    }

    #[test]
    fn test_integer_without_params_rejected() {
        assert!(matches!(
            quantize(&[1.0], ElementType::U8, None),
            Err(InferenceError::UnsupportedElementType { .. })
        ));
    }
}
