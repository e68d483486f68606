//! A generic store.

use async_trait::async_trait;

use crate::{
    model::{ContributorModel, GlobalModel},
    record::{ContributorId, Record},
    storage::{ModelStorage, RecordAppend, RecordStorage, Storage, StorageResult},
};

#[derive(Clone)]
/// A generic store.
pub struct Store<R, M>
where
    R: RecordStorage,
    M: ModelStorage,
{
    /// A record store.
    records: R,
    /// A model store.
    models: M,
}

impl<R, M> Store<R, M>
where
    R: RecordStorage,
    M: ModelStorage,
{
    /// Creates a new [`Store`].
    pub fn new(records: R, models: M) -> Self {
        Self { records, models }
    }
}

#[async_trait]
impl<R, M> RecordStorage for Store<R, M>
where
    R: RecordStorage,
    M: ModelStorage,
{
    async fn records(&mut self, contributor: &ContributorId) -> StorageResult<Vec<Record>> {
        self.records.records(contributor).await
    }

    async fn append_records(
        &mut self,
        contributor: &ContributorId,
        records: &[Record],
    ) -> StorageResult<RecordAppend> {
        self.records.append_records(contributor, records).await
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        self.records.is_ready().await
    }
}

#[async_trait]
impl<R, M> ModelStorage for Store<R, M>
where
    R: RecordStorage,
    M: ModelStorage,
{
    async fn contributor_model(
        &mut self,
        contributor: &ContributorId,
    ) -> StorageResult<Option<ContributorModel>> {
        self.models.contributor_model(contributor).await
    }

    async fn set_contributor_model(&mut self, model: &ContributorModel) -> StorageResult<()> {
        self.models.set_contributor_model(model).await
    }

    async fn contributor_models(&mut self) -> StorageResult<Vec<ContributorModel>> {
        self.models.contributor_models().await
    }

    async fn global_model(&mut self) -> StorageResult<Option<GlobalModel>> {
        self.models.global_model().await
    }

    async fn set_global_model(&mut self, model: &GlobalModel) -> StorageResult<()> {
        self.models.set_global_model(model).await
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        self.models.is_ready().await
    }
}

#[async_trait]
impl<R, M> Storage for Store<R, M>
where
    R: RecordStorage,
    M: ModelStorage,
{
    async fn is_ready(&mut self) -> StorageResult<()> {
        tokio::try_join!(self.records.is_ready(), self.models.is_ready()).map(|_| ())
    }
}
