//! Storage API.

use async_trait::async_trait;
use derive_more::Deref;
use displaydoc::Display;
use thiserror::Error;

use crate::{
    model::{ContributorModel, GlobalModel},
    record::{ContributorId, Record},
};

/// The error type for storage operations that are not directly related to application domain.
/// These include, for example IO errors like broken pipe, file not found, out-of-memory, etc.
pub type StorageError = anyhow::Error;

/// The result of the storage operation.
pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
/// An abstract record storage.
pub trait RecordStorage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Returns the records of a contributor, in the order in which they were appended.
    ///
    /// # Behavior
    ///
    /// - If the contributor has no records yet, return `StorageResult::Ok(Vec::new())`.
    /// - Otherwise, return `StorageResult::Ok(Vec<Record>)`.
    async fn records(&mut self, contributor: &ContributorId) -> StorageResult<Vec<Record>>;

    /// Appends records to the records of a contributor.
    ///
    /// # Behavior
    ///
    /// - If the records have been successfully appended, return `StorageResult::Ok(RecordAppend)`
    ///   containing a `Result::Ok(())`.
    /// - If an identifier of the new records already exists in the stored records or occurs twice
    ///   in the new records, nothing is written and `StorageResult::Ok(RecordAppend)` containing a
    ///   `Result::Err(RecordAppendError)` is returned.
    async fn append_records(
        &mut self,
        contributor: &ContributorId,
        records: &[Record],
    ) -> StorageResult<RecordAppend>;

    /// Checks if the [`RecordStorage`] is ready to process requests.
    ///
    /// # Behavior
    ///
    /// If the [`RecordStorage`] is ready to process requests, return `StorageResult::Ok(())`.
    /// If the [`RecordStorage`] cannot process requests because of an IO error,
    /// for example, return `StorageResult::Err(error)`.
    async fn is_ready(&mut self) -> StorageResult<()>;
}

#[async_trait]
/// An abstract model storage.
pub trait ModelStorage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Returns the model of a contributor.
    ///
    /// # Behavior
    ///
    /// - If the contributor has no model yet, return `StorageResult::Ok(Option::None)`.
    /// - If the model exists, return `StorageResult::Ok(Option::Some(ContributorModel))`.
    async fn contributor_model(
        &mut self,
        contributor: &ContributorId,
    ) -> StorageResult<Option<ContributorModel>>;

    /// Sets the model of a contributor.
    ///
    /// # Behavior
    ///
    /// Replaces any previous model of the contributor. The replacement is atomic, readers see
    /// either the previous or the new model.
    async fn set_contributor_model(&mut self, model: &ContributorModel) -> StorageResult<()>;

    /// Returns the models of all contributors.
    ///
    /// # Behavior
    ///
    /// - If no contributor has a model yet, return `StorageResult::Ok(Vec::new())`.
    /// - Otherwise, return `StorageResult::Ok(Vec<ContributorModel>)` in no particular order.
    async fn contributor_models(&mut self) -> StorageResult<Vec<ContributorModel>>;

    /// Returns the global model.
    ///
    /// # Behavior
    ///
    /// - If no global model has been set yet, return `StorageResult::Ok(Option::None)`.
    /// - If the global model exists, return `StorageResult::Ok(Option::Some(GlobalModel))`.
    async fn global_model(&mut self) -> StorageResult<Option<GlobalModel>>;

    /// Sets the global model.
    ///
    /// # Behavior
    ///
    /// Replaces any previous global model. The replacement is atomic, readers see either the
    /// previous or the new model.
    async fn set_global_model(&mut self, model: &GlobalModel) -> StorageResult<()>;

    /// Checks if the [`ModelStorage`] is ready to process requests.
    ///
    /// # Behavior
    ///
    /// If the [`ModelStorage`] is ready to process requests, return `StorageResult::Ok(())`.
    /// If the [`ModelStorage`] cannot process requests because of an IO error,
    /// for example, return `StorageResult::Err(error)`.
    async fn is_ready(&mut self) -> StorageResult<()>;
}

#[async_trait]
pub trait Storage: RecordStorage + ModelStorage {
    /// Checks if the [`RecordStorage`] and [`ModelStorage`] are ready to process requests.
    ///
    /// # Behavior
    ///
    /// If all inner services are ready to process requests,
    /// return `StorageResult::Ok(())`.
    /// If any inner service cannot process requests because of an IO error,
    /// for example, return `StorageResult::Err(error)`.
    async fn is_ready(&mut self) -> StorageResult<()>;
}

/// A wrapper that contains the result of the "append records" operation.
#[derive(Deref, Debug)]
pub struct RecordAppend(pub(crate) Result<(), RecordAppendError>);

impl RecordAppend {
    /// Unwraps this wrapper, returning the underlying result.
    pub fn into_inner(self) -> Result<(), RecordAppendError> {
        self.0
    }
}

/// Error that can occur when appending records.
#[derive(Display, Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordAppendError {
    /// record identifier {0} already exists
    DuplicateIdentifier(String),
}

/// Checks that the new records don't collide with the stored ones or with each other.
pub(crate) fn check_duplicates(stored: &[Record], new: &[Record]) -> RecordAppend {
    let mut seen: std::collections::HashSet<&str> =
        stored.iter().filter_map(Record::owner_id).collect();
    for id in new.iter().filter_map(Record::owner_id) {
        if !seen.insert(id) {
            return RecordAppend(Err(RecordAppendError::DuplicateIdentifier(id.to_string())));
        }
    }
    RecordAppend(Ok(()))
}
