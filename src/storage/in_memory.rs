//! A storage backend that keeps everything in process memory.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    model::{ContributorModel, GlobalModel},
    record::{ContributorId, Record},
    storage::{check_duplicates, ModelStorage, RecordAppend, RecordStorage, StorageResult},
};

#[derive(Default)]
struct Inner {
    records: HashMap<ContributorId, Vec<Record>>,
    models: HashMap<ContributorId, ContributorModel>,
    global: Option<GlobalModel>,
}

#[derive(Clone, Default)]
/// An in-memory store. Clones share the same state.
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStorage for InMemoryStore {
    async fn records(&mut self, contributor: &ContributorId) -> StorageResult<Vec<Record>> {
        let inner = self.inner.read().await;
        Ok(inner.records.get(contributor).cloned().unwrap_or_default())
    }

    async fn append_records(
        &mut self,
        contributor: &ContributorId,
        records: &[Record],
    ) -> StorageResult<RecordAppend> {
        let mut inner = self.inner.write().await;
        let stored = inner.records.entry(contributor.clone()).or_default();
        let append = check_duplicates(stored, records);
        if append.is_ok() {
            stored.extend_from_slice(records);
        }
        Ok(append)
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ModelStorage for InMemoryStore {
    async fn contributor_model(
        &mut self,
        contributor: &ContributorId,
    ) -> StorageResult<Option<ContributorModel>> {
        Ok(self.inner.read().await.models.get(contributor).cloned())
    }

    async fn set_contributor_model(&mut self, model: &ContributorModel) -> StorageResult<()> {
        self.inner
            .write()
            .await
            .models
            .insert(model.contributor.clone(), model.clone());
        Ok(())
    }

    async fn contributor_models(&mut self) -> StorageResult<Vec<ContributorModel>> {
        Ok(self.inner.read().await.models.values().cloned().collect())
    }

    async fn global_model(&mut self) -> StorageResult<Option<GlobalModel>> {
        Ok(self.inner.read().await.global.clone())
    }

    async fn set_global_model(&mut self, model: &GlobalModel) -> StorageResult<()> {
        self.inner.write().await.global = Some(model.clone());
        Ok(())
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
