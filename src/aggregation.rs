//! Federated averaging.
//!
//! The global model is the average of all contributor models, weighted by their sample counts:
//!
//! ```text
//! c_i = n_i / Σ n
//! w[j] = Σ c_i · w_i[j]
//! b = Σ c_i · b_i
//! ```
//!
//! Contributors are summed in the order of their identifiers, so aggregating the same models
//! always yields a bit-identical result regardless of the order in which they were loaded.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    model::{ContributorModel, GlobalModel},
    record::ContributorId,
};

#[derive(Debug, Error, PartialEq)]
/// Errors of the aggregation.
pub enum AggregationError {
    #[error("no model data found")]
    NoContributors,
    #[error("model of contributor {contributor} has {found} weights, expected {expected}")]
    SchemaMismatch {
        contributor: ContributorId,
        expected: usize,
        found: usize,
    },
    #[error("contributor models cover no samples")]
    NoSamples,
}

/// Aggregates the contributor models into a global model stamped with the current time.
///
/// # Errors
/// Fails if there are no models, if the models have weight vectors of different lengths, or if
/// they cover no samples at all.
pub fn aggregate(models: &[ContributorModel]) -> Result<GlobalModel, AggregationError> {
    aggregate_at(models, Utc::now())
}

/// Aggregates the contributor models into a global model with the given timestamp.
pub fn aggregate_at(
    models: &[ContributorModel],
    timestamp: DateTime<Utc>,
) -> Result<GlobalModel, AggregationError> {
    let mut sorted: Vec<&ContributorModel> = models.iter().collect();
    sorted.sort_by(|a, b| a.contributor.cmp(&b.contributor));

    let first = sorted.first().ok_or(AggregationError::NoContributors)?;
    let expected = first.weights.len();
    if let Some(model) = sorted.iter().find(|m| m.weights.len() != expected) {
        return Err(AggregationError::SchemaMismatch {
            contributor: model.contributor.clone(),
            expected,
            found: model.weights.len(),
        });
    }

    let total_samples: u64 = sorted.iter().map(|m| m.sample_count).sum();
    if total_samples == 0 {
        return Err(AggregationError::NoSamples);
    }

    let mut weights = vec![0_f64; expected];
    let mut bias = 0_f64;
    for model in &sorted {
        let coefficient = model.sample_count as f64 / total_samples as f64;
        for (acc, w) in weights.iter_mut().zip(&model.weights) {
            *acc += coefficient * w;
        }
        bias += coefficient * model.bias;
    }

    Ok(GlobalModel {
        weights,
        bias,
        total_samples,
        contributors: sorted.len(),
        timestamp,
    })
}
