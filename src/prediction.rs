//! Predictions of the global model.

use thiserror::Error;

use crate::{
    model::GlobalModel,
    record::{FeatureVector, FEATURE_COUNT},
};

#[derive(Debug, Error, PartialEq)]
/// Errors of the prediction.
pub enum PredictionError {
    #[error("no global model available yet")]
    ModelNotReady,
    #[error("global model has {0} weights, expected {}", FEATURE_COUNT)]
    SchemaMismatch(usize),
}

/// Applies the global model to the features.
///
/// The prediction `bias + Σ wᵢ·fᵢ` is rounded to one decimal place, half away from zero.
pub fn predict(
    model: Option<&GlobalModel>,
    features: &FeatureVector,
) -> Result<f64, PredictionError> {
    let model = model.ok_or(PredictionError::ModelNotReady)?;
    if model.weights.len() != FEATURE_COUNT {
        return Err(PredictionError::SchemaMismatch(model.weights.len()));
    }

    let raw = model
        .weights
        .iter()
        .zip(features.as_slice())
        .fold(model.bias, |acc, (w, f)| acc + w * f);
    Ok((raw * 10.).round() / 10.)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn global(weights: Vec<f64>, bias: f64) -> GlobalModel {
        GlobalModel {
            weights,
            bias,
            total_samples: 10,
            contributors: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_prediction_is_rounded() {
        let model = global(vec![0.1, -0.05, 0.02, -0.03], 70.);
        let features = FeatureVector::new(72., 80., 120., 45.);
        assert_eq!(predict(Some(&model), &features), Ok(74.3));
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        let model = global(vec![0.; 4], -2.25);
        let features = FeatureVector::new(1., 1., 1., 1.);
        assert_eq!(predict(Some(&model), &features), Ok(-2.3));
    }

    #[test]
    fn test_model_not_ready() {
        let features = FeatureVector::new(72., 80., 120., 45.);
        assert_eq!(
            predict(None, &features),
            Err(PredictionError::ModelNotReady)
        );
    }

    #[test]
    fn test_schema_mismatch() {
        let model = global(vec![0.1, 0.2, 0.3], 70.);
        let features = FeatureVector::new(72., 80., 120., 45.);
        assert_eq!(
            predict(Some(&model), &features),
            Err(PredictionError::SchemaMismatch(3))
        );
    }
}
