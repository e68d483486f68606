//! Local training of the linear model.
//!
//! A contributor's verified records are fitted by full batch gradient descent on the mean squared
//! error. Features are used as submitted: the trainer doesn't normalize them, so ill-scaled inputs
//! converge slowly or not at all within the configured epochs.

pub mod evaluation;

use std::convert::TryFrom;

use serde::Serialize;
use thiserror::Error;

pub use self::evaluation::Evaluation;
use crate::{
    record::{MalformedRecord, Record, Sample, FEATURE_COUNT},
    settings::TrainingSettings,
};

#[derive(Debug, Error, PartialEq)]
/// Errors of the [`LinearRegression`] trainer.
pub enum TrainingError {
    #[error("no usable records to train on")]
    EmptyDataset,
    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
/// The mean squared error after an epoch.
pub struct HistoryEntry {
    pub epoch: u32,
    pub mse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
/// The parameters of a fitted model together with its convergence history.
pub struct TrainingOutcome {
    /// The weights, in feature order.
    pub weights: [f64; FEATURE_COUNT],
    pub bias: f64,
    /// The error after every `history_interval`-th epoch, starting with epoch 0.
    pub history: Vec<HistoryEntry>,
    /// The error of the final parameters.
    #[serde(rename = "finalMSE")]
    pub final_mse: f64,
    /// The number of epochs that ran.
    pub epochs: u32,
    /// The fit metrics over the training samples.
    pub evaluation: Option<Evaluation>,
    /// The number of samples the model was fitted to.
    #[serde(skip)]
    pub sample_count: usize,
}

/// Linear parameters `(weights, bias)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Parameters {
    pub weights: [f64; FEATURE_COUNT],
    pub bias: f64,
}

impl Parameters {
    /// Computes `bias + Σ wᵢ·fᵢ`, accumulated in feature order.
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(features)
            .fold(self.bias, |acc, (w, f)| acc + w * f)
    }

    fn mse(&self, samples: &[Sample]) -> f64 {
        let sum: f64 = samples
            .iter()
            .map(|s| (self.predict(s.features.as_slice()) - s.target).powi(2))
            .sum();
        sum / samples.len() as f64
    }
}

#[derive(Debug, Clone)]
/// A linear regression trainer.
pub struct LinearRegression {
    settings: TrainingSettings,
}

impl LinearRegression {
    pub fn new(settings: TrainingSettings) -> Self {
        Self { settings }
    }

    /// Fits a model to the records, in the given order.
    ///
    /// The result is deterministic for a given record sequence and settings.
    ///
    /// # Errors
    /// Fails if there are no records or if a record lacks a finite feature or target value.
    pub fn train(&self, records: &[Record]) -> Result<TrainingOutcome, TrainingError> {
        let samples = records
            .iter()
            .map(Sample::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        self.train_samples(&samples)
    }

    fn train_samples(&self, samples: &[Sample]) -> Result<TrainingOutcome, TrainingError> {
        if samples.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        let n = samples.len() as f64;
        let lr = self.settings.learning_rate;
        let interval = self.settings.history_interval.max(1);

        let mut params = Parameters::default();
        let mut history = Vec::new();
        for epoch in 0..self.settings.epochs {
            let mut weight_gradients = [0_f64; FEATURE_COUNT];
            let mut bias_gradient = 0_f64;
            for sample in samples {
                let features = sample.features.as_slice();
                let error = params.predict(features) - sample.target;
                bias_gradient += error;
                for (gradient, feature) in weight_gradients.iter_mut().zip(features) {
                    *gradient += error * feature;
                }
            }

            params.bias -= lr * bias_gradient / n;
            for (weight, gradient) in params.weights.iter_mut().zip(&weight_gradients) {
                *weight -= lr * gradient / n;
            }

            if epoch % interval == 0 {
                history.push(HistoryEntry {
                    epoch,
                    mse: params.mse(samples),
                });
            }
        }

        Ok(TrainingOutcome {
            weights: params.weights,
            bias: params.bias,
            history,
            final_mse: params.mse(samples),
            epochs: self.settings.epochs,
            evaluation: evaluation::evaluate(&params, samples),
            sample_count: samples.len(),
        })
    }
}
