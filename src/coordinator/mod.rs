//! The coordinator service.
//!
//! The [`Coordinator`] ties the components together:
//!
//! - `compute`: appends a contributor's new records, proves all of the contributor's records
//!   against the ledger, trains a local model on the verified ones, stores it and re-aggregates.
//! - `aggregate`: merges all stored contributor models into the global model.
//! - `predict`: applies the stored global model to a feature vector.
//!
//! Computations of the same contributor are serialized, computations of different contributors
//! run in parallel. Aggregations are serialized, so the stored global model always corresponds to
//! a complete read of the contributor models.

mod error;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn};
use tracing_futures::Instrument;

pub use self::error::CoordinatorError;
use crate::{
    aggregation,
    locks::KeyedLocks,
    model::{ContributorModel, GlobalModel},
    prediction,
    proof::{ProofReport, ProofVerifier, VerificationMode},
    record::{ContributorId, FeatureVector, Record},
    storage::Storage,
    training::{LinearRegression, TrainingError, TrainingOutcome},
};

#[derive(Debug)]
/// The result of a contributor computation.
pub struct ComputeOutcome {
    pub contributor: ContributorId,
    /// The number of stored records of the contributor, including the new ones.
    pub total_records: usize,
    pub proofs: ProofReport,
    pub training: TrainingOutcome,
    pub global_model: GlobalModel,
}

#[derive(Clone)]
/// The coordinator service. Clones share the same state.
pub struct Coordinator<S>
where
    S: Storage,
{
    store: S,
    verifier: ProofVerifier,
    trainer: Arc<LinearRegression>,
    contributor_locks: Arc<KeyedLocks<ContributorId>>,
    aggregation_lock: Arc<Mutex<()>>,
}

impl<S> Coordinator<S>
where
    S: Storage,
{
    /// Creates a new coordinator.
    pub fn new(store: S, verifier: ProofVerifier, trainer: LinearRegression) -> Self {
        Self {
            store,
            verifier,
            trainer: Arc::new(trainer),
            contributor_locks: Arc::new(KeyedLocks::new()),
            aggregation_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Gets the verification mode of the records.
    pub fn verification_mode(&self) -> VerificationMode {
        self.verifier.mode()
    }

    /// Appends the new records of a contributor, retrains its model and re-aggregates.
    ///
    /// # Errors
    /// - [`CoordinatorError::Conflict`] if a new record collides with a stored one. Nothing is
    ///   written in this case.
    /// - [`CoordinatorError::Training`] if no record could be verified. The previous model of the
    ///   contributor is kept.
    /// - [`CoordinatorError::Aggregation`] if the stored models can't be aggregated. The previous
    ///   global model is kept.
    /// - [`CoordinatorError::Storage`] if the storage failed.
    pub async fn compute(
        &self,
        contributor: ContributorId,
        new_records: Vec<Record>,
    ) -> Result<ComputeOutcome, CoordinatorError> {
        let span = info_span!("compute", contributor = %contributor);
        async move {
            let (total_records, proofs, training) =
                self.train_contributor(&contributor, new_records).await?;
            let global_model = self.aggregate().await?;
            Ok(ComputeOutcome {
                contributor,
                total_records,
                proofs,
                training,
                global_model,
            })
        }
        .instrument(span)
        .await
    }

    async fn train_contributor(
        &self,
        contributor: &ContributorId,
        new_records: Vec<Record>,
    ) -> Result<(usize, ProofReport, TrainingOutcome), CoordinatorError> {
        let _guard = self.contributor_locks.lock(contributor).await;
        let mut store = self.store.clone();

        if !new_records.is_empty() {
            store
                .append_records(contributor, &new_records)
                .await
                .map_err(CoordinatorError::Storage)?
                .into_inner()?;
            info!("appended {} records", new_records.len());
        }

        let records = store
            .records(contributor)
            .await
            .map_err(CoordinatorError::Storage)?;
        let total_records = records.len();

        let proofs = self.verifier.verify(records).await;
        if !proofs.mismatched.is_empty() {
            warn!("{} records with invalid proofs", proofs.mismatched.len());
        }
        if !proofs.errored.is_empty() {
            warn!("{} records could not be verified", proofs.errored.len());
        }
        let verified: Vec<Record> = proofs.verified_records().cloned().collect();
        if verified.is_empty() {
            return Err(TrainingError::EmptyDataset.into());
        }
        info!(
            "training on {}/{} verified records",
            verified.len(),
            total_records
        );

        let trainer = self.trainer.clone();
        let training = tokio::task::spawn_blocking(move || trainer.train(&verified)).await??;
        debug!("final mse: {}", training.final_mse);

        let model = ContributorModel {
            contributor: contributor.clone(),
            weights: training.weights.to_vec(),
            bias: training.bias,
            sample_count: training.sample_count as u64,
            timestamp: Utc::now(),
        };
        store
            .set_contributor_model(&model)
            .await
            .map_err(CoordinatorError::Storage)?;
        info!("stored the model of contributor {}", contributor);

        Ok((total_records, proofs, training))
    }

    /// Aggregates all stored contributor models and stores the result as the global model.
    ///
    /// # Errors
    /// Fails if there are no contributor models, if they can't be aggregated or if the storage
    /// failed. The previous global model is kept in any of these cases.
    pub async fn aggregate(&self) -> Result<GlobalModel, CoordinatorError> {
        async move {
            let _guard = self.aggregation_lock.lock().await;
            let mut store = self.store.clone();

            let models = store
                .contributor_models()
                .await
                .map_err(CoordinatorError::Storage)?;
            let global_model = aggregation::aggregate(&models)?;
            store
                .set_global_model(&global_model)
                .await
                .map_err(CoordinatorError::Storage)?;
            info!(
                "aggregated {} contributor models covering {} samples",
                global_model.contributors, global_model.total_samples
            );
            Ok(global_model)
        }
        .instrument(info_span!("aggregate"))
        .await
    }

    /// Predicts the target for the features with the stored global model.
    ///
    /// # Errors
    /// Fails if there is no global model, if it doesn't fit the feature schema or if the storage
    /// failed.
    pub async fn predict(&self, features: FeatureVector) -> Result<f64, CoordinatorError> {
        async move {
            let global_model = self
                .store
                .clone()
                .global_model()
                .await
                .map_err(CoordinatorError::Storage)?;
            let prediction = prediction::predict(global_model.as_ref(), &features)?;
            debug!("predicted {}", prediction);
            Ok(prediction)
        }
        .instrument(info_span!("predict"))
        .await
    }
}
