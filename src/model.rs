//! Persisted model parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::ContributorId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// The most recent local model of a contributor.
pub struct ContributorModel {
    pub contributor: ContributorId,
    /// The weights, in feature order.
    pub weights: Vec<f64>,
    pub bias: f64,
    /// The number of samples the model was fitted to.
    pub sample_count: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// The sample weighted average of all contributor models.
pub struct GlobalModel {
    /// The weights, in feature order.
    pub weights: Vec<f64>,
    pub bias: f64,
    /// The sum of the sample counts of all contributors. Always positive.
    pub total_samples: u64,
    /// The number of contributors.
    pub contributors: usize,
    pub timestamp: DateTime<Utc>,
}
