use thiserror::Error;
use tokio::task::JoinError;

use crate::{
    aggregation::AggregationError,
    prediction::PredictionError,
    storage::{RecordAppendError, StorageError},
    training::TrainingError,
};

#[derive(Debug, Error)]
/// Errors of the [`Coordinator`](super::Coordinator).
pub enum CoordinatorError {
    #[error("{0}")]
    Conflict(#[from] RecordAppendError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error("storage failed: {0:#}")]
    Storage(StorageError),
    #[error("training task failed: {0}")]
    Task(#[from] JoinError),
}

impl CoordinatorError {
    /// Gets the machine readable kind of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "conflict",
            Self::Training(TrainingError::EmptyDataset) => "empty_dataset",
            Self::Training(TrainingError::MalformedRecord(_)) => "training_error",
            Self::Aggregation(AggregationError::SchemaMismatch { .. })
            | Self::Prediction(PredictionError::SchemaMismatch(_)) => "schema_mismatch",
            Self::Aggregation(_) => "no_contributors",
            Self::Prediction(PredictionError::ModelNotReady) => "model_not_ready",
            Self::Storage(_) => "storage_error",
            Self::Task(_) => "internal_error",
        }
    }
}
