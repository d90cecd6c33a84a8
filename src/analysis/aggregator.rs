// Prediction aggregation - from backend confidence vectors to reported
// estimates and display buckets
//
// Display bucketing rotates the fine vector by half a bucket before
// max-pooling, so bucket b covers the fine bins centred on b * UI_RESOLUTION.
// Review note: the rotation is kept exactly as the deployed display used it;
// whether it compensates an off-by-one in bin alignment is still open.

use serde::{Deserialize, Serialize};

use super::backend::{argmax, AngleEstimate, BackendOutput};

/// Confidence above which a multi-source bucket is reported
pub const SOURCE_THRESHOLD: f32 = 0.5;

/// Bucketed confidences for arc colouring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfidences {
    /// One value per UI bucket; sums to 1 unless all are zero
    pub buckets: Vec<f32>,
    /// Bucket with the highest confidence, absent when all are zero
    pub max_bucket: Option<usize>,
}

impl DisplayConfidences {
    pub fn empty(buckets: usize) -> Self {
        Self {
            buckets: vec![0.0; buckets],
            max_bucket: None,
        }
    }
}

/// Reported estimates of one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Predictions {
    /// No estimate (never computed, or cleared after silence)
    None,
    Single {
        azimuth: AngleEstimate,
        elevation: Option<AngleEstimate>,
    },
    /// Active sources in ascending angle order; may be empty
    Multi { sources: Vec<AngleEstimate> },
}

impl Predictions {
    pub fn is_none(&self) -> bool {
        matches!(self, Predictions::None)
    }
}

/// Rotate by half a bucket and max-pool into `360 / ui_resolution` buckets
///
/// The result is not normalized.
pub fn bucket_confidences(fine: &[f32], fine_resolution: usize, ui_resolution: usize) -> Vec<f32> {
    let group = (ui_resolution / fine_resolution.max(1)).max(1);
    let shift = group / 2;
    let n = fine.len();
    if n == 0 {
        return Vec::new();
    }

    (0..n.div_ceil(group))
        .map(|bucket| {
            (bucket * group..((bucket + 1) * group).min(n))
                .map(|i| fine[(i + n - shift % n) % n])
                .fold(f32::MIN, f32::max)
        })
        .collect()
}

/// Scale so the values sum to 1; all-zero input stays zero
pub fn normalize(values: &mut [f32]) {
    let total: f32 = values.iter().sum();
    if total != 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}

/// Display vector: rotated, pooled and normalized
pub fn display_confidences(
    fine: &[f32],
    fine_resolution: usize,
    ui_resolution: usize,
) -> DisplayConfidences {
    let mut buckets = bucket_confidences(fine, fine_resolution, ui_resolution);
    let total: f32 = buckets.iter().sum();
    normalize(&mut buckets);
    let max_bucket = if total != 0.0 {
        argmax(&buckets).map(|(i, _)| i)
    } else {
        None
    };
    DisplayConfidences {
        buckets,
        max_bucket,
    }
}

/// Single-source aggregation: argmax per axis, confidences as produced
pub fn aggregate_single(azimuth: &BackendOutput, elevation: Option<&BackendOutput>) -> Predictions {
    Predictions::Single {
        azimuth: azimuth.estimate,
        elevation: elevation.map(|e| e.estimate),
    }
}

/// Multi-source aggregation
///
/// Every bucket whose pooled confidence exceeds `SOURCE_THRESHOLD` is a
/// source at `bucket * ui_resolution` degrees, reported with its pooled
/// confidence.
pub fn aggregate_multi(
    fine: &[f32],
    fine_resolution: usize,
    ui_resolution: usize,
) -> (Predictions, DisplayConfidences) {
    let pooled = bucket_confidences(fine, fine_resolution, ui_resolution);
    let sources = pooled
        .iter()
        .enumerate()
        .filter(|(_, &c)| c > SOURCE_THRESHOLD)
        .map(|(bucket, &confidence)| AngleEstimate {
            angle_deg: (bucket * ui_resolution) as u32,
            confidence,
        })
        .collect();
    (
        Predictions::Multi { sources },
        display_confidences(fine, fine_resolution, ui_resolution),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn output(confidences: Vec<f32>, resolution: usize) -> BackendOutput {
        BackendOutput {
            estimate: super::super::backend::estimate_from(&confidences, resolution),
            confidences,
            latency: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_rotation_centres_buckets() {
        let mut fine = vec![0.0; 360];
        // Fine bin 355 belongs to bucket 0 after the half-bucket rotation
        fine[355] = 0.4;
        // Fine bin 4 still belongs to bucket 0, bin 5 to bucket 1
        fine[5] = 0.3;
        let buckets = bucket_confidences(&fine, 1, 10);
        assert_eq!(buckets.len(), 36);
        assert_eq!(buckets[0], 0.4);
        assert_eq!(buckets[1], 0.3);
        assert_eq!(buckets[35], 0.0);
    }

    #[test]
    fn test_pooling_takes_maximum() {
        let mut fine = vec![0.0; 360];
        fine[98] = 0.2;
        fine[100] = 0.7;
        fine[104] = 0.1;
        let buckets = bucket_confidences(&fine, 1, 10);
        assert_eq!(buckets[10], 0.7);
    }

    #[test]
    fn test_display_sums_to_one_or_zero() {
        let fine: Vec<f32> = (0..360).map(|i| (i % 7) as f32 * 0.01).collect();
        let display = display_confidences(&fine, 1, 10);
        let total: f32 = display.buckets.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(display.max_bucket.is_some());

        let display = display_confidences(&vec![0.0; 360], 1, 10);
        assert_eq!(display.buckets.iter().sum::<f32>(), 0.0);
        assert_eq!(display.max_bucket, None);
    }

    #[test]
    fn test_single_source_passes_confidence_through() {
        let mut az = vec![0.0; 360];
        az[37] = 0.92;
        let mut el = vec![0.0; 36];
        el[3] = 0.4;
        let predictions = aggregate_single(&output(az, 1), Some(&output(el, 10)));
        assert_eq!(
            predictions,
            Predictions::Single {
                azimuth: AngleEstimate {
                    angle_deg: 37,
                    confidence: 0.92
                },
                elevation: Some(AngleEstimate {
                    angle_deg: 30,
                    confidence: 0.4
                }),
            }
        );
    }

    #[test]
    fn test_multi_source_two_buckets_ascending() {
        let mut fine = vec![0.0; 360];
        fine[250] = 0.8;
        fine[90] = 0.9;
        fine[170] = 0.3;
        let (predictions, display) = aggregate_multi(&fine, 1, 10);
        match predictions {
            Predictions::Multi { sources } => {
                let angles: Vec<u32> = sources.iter().map(|s| s.angle_deg).collect();
                assert_eq!(angles, vec![90, 250]);
                assert!((sources[0].confidence - 0.9).abs() < 1e-6);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(display.max_bucket, Some(9));
        assert!((display.buckets.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_multi_source_none_above_threshold() {
        let mut fine = vec![0.0; 360];
        fine[10] = 0.5;
        let (predictions, _) = aggregate_multi(&fine, 1, 10);
        assert_eq!(predictions, Predictions::Multi { sources: vec![] });
    }

    #[test]
    fn test_coarse_vector_is_not_rotated() {
        let mut coarse = vec![0.0; 36];
        coarse[3] = 0.6;
        let buckets = bucket_confidences(&coarse, 10, 10);
        assert_eq!(buckets, coarse);
    }
}
