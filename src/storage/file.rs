//! A storage backend that keeps JSON files in a directory.
//!
//! ```text
//! <root>/samples/<contributor>.json   records of a contributor
//! <root>/weights/<contributor>.json   model of a contributor
//! <root>/model.json                   global model
//! ```
//!
//! Files are replaced atomically: the new content is written to a temporary file in the same
//! directory, synced and then renamed over the old file.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::{
    locks::KeyedLocks,
    model::{ContributorModel, GlobalModel},
    record::{ContributorId, Record},
    storage::{
        check_duplicates,
        ModelStorage,
        RecordAppend,
        RecordStorage,
        StorageResult,
    },
};

const SAMPLES_DIR: &str = "samples";
const WEIGHTS_DIR: &str = "weights";
const GLOBAL_MODEL_FILE: &str = "model.json";

#[derive(Clone)]
/// A file based store. Clones share the same locks.
pub struct FileStore {
    root: Arc<PathBuf>,
    /// Serializes the read-check-write cycle of record appends per contributor.
    record_locks: Arc<KeyedLocks<ContributorId>>,
}

impl FileStore {
    /// Creates a store below the given directory.
    ///
    /// # Errors
    /// Fails if the directories can't be created.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        for dir in &[SAMPLES_DIR, WEIGHTS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
        }
        Ok(Self {
            root: Arc::new(root),
            record_locks: Arc::new(KeyedLocks::new()),
        })
    }

    fn samples_path(&self, contributor: &ContributorId) -> PathBuf {
        self.root
            .join(SAMPLES_DIR)
            .join(format!("{}.json", contributor))
    }

    fn weights_path(&self, contributor: &ContributorId) -> PathBuf {
        self.root
            .join(WEIGHTS_DIR)
            .join(format!("{}.json", contributor))
    }

    fn global_model_path(&self) -> PathBuf {
        self.root.join(GLOBAL_MODEL_FILE)
    }
}

/// Reads and parses a JSON file. A missing file is `None`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Atomically replaces a file with the JSON serialization of `value`.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid file name {}", path.display()))?;
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let write = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await
    };
    if let Err(err) = write.await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err).with_context(|| format!("failed to write {}", path.display()));
    }
    debug!("wrote {}", path.display());
    Ok(())
}

async fn check_dir(path: &Path) -> StorageResult<()> {
    let metadata = fs::metadata(path)
        .await
        .with_context(|| format!("{} is not accessible", path.display()))?;
    anyhow::ensure!(metadata.is_dir(), "{} is not a directory", path.display());
    Ok(())
}

#[async_trait]
impl RecordStorage for FileStore {
    async fn records(&mut self, contributor: &ContributorId) -> StorageResult<Vec<Record>> {
        Ok(read_json(&self.samples_path(contributor))
            .await?
            .unwrap_or_default())
    }

    async fn append_records(
        &mut self,
        contributor: &ContributorId,
        records: &[Record],
    ) -> StorageResult<RecordAppend> {
        let _guard = self.record_locks.lock(contributor).await;
        let path = self.samples_path(contributor);
        let mut stored: Vec<Record> = read_json(&path).await?.unwrap_or_default();

        let append = check_duplicates(&stored, records);
        if append.is_ok() {
            stored.extend_from_slice(records);
            write_json(&path, &stored).await?;
        }
        Ok(append)
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        check_dir(&self.root.join(SAMPLES_DIR)).await
    }
}

#[async_trait]
impl ModelStorage for FileStore {
    async fn contributor_model(
        &mut self,
        contributor: &ContributorId,
    ) -> StorageResult<Option<ContributorModel>> {
        read_json(&self.weights_path(contributor)).await
    }

    async fn set_contributor_model(&mut self, model: &ContributorModel) -> StorageResult<()> {
        write_json(&self.weights_path(&model.contributor), model).await
    }

    async fn contributor_models(&mut self) -> StorageResult<Vec<ContributorModel>> {
        let dir = self.root.join(WEIGHTS_DIR);
        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to list {}", dir.display()))?;

        let mut models = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // skips temporary files of writes in progress
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(model) = read_json(&path).await? {
                models.push(model);
            }
        }
        Ok(models)
    }

    async fn global_model(&mut self) -> StorageResult<Option<GlobalModel>> {
        read_json(&self.global_model_path()).await
    }

    async fn set_global_model(&mut self, model: &GlobalModel) -> StorageResult<()> {
        write_json(&self.global_model_path(), model).await
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        check_dir(&self.root.join(WEIGHTS_DIR)).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{record::tests::record, storage::RecordAppendError};

    /// A unique directory below the system temp dir, removed on drop.
    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            Self(std::env::temp_dir().join(format!("ledger-fl-{}", Uuid::new_v4())))
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn contributor(uuid: &str) -> ContributorId {
        uuid.parse().unwrap()
    }

    fn model(uuid: &str, bias: f64) -> ContributorModel {
        ContributorModel {
            contributor: contributor(uuid),
            weights: vec![0.5, -0.5, 0.25, 0.],
            bias,
            sample_count: 4,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_records_persist_across_instances() {
        let dir = TempDir::new();
        let id = contributor("3f2504e0-4f89-41d3-9a0c-0305e82c3301");
        let records = vec![record("1", [72., 80., 120., 45.], 80.)];

        let mut store = FileStore::new(&dir.0).await.unwrap();
        assert!(RecordStorage::is_ready(&mut store).await.is_ok());
        assert!(store.records(&id).await.unwrap().is_empty());
        assert!(store.append_records(&id, &records).await.unwrap().is_ok());

        let mut reopened = FileStore::new(&dir.0).await.unwrap();
        assert_eq!(reopened.records(&id).await.unwrap(), records);
        assert!(dir.0.join("samples").join(format!("{}.json", id)).exists());
    }

    #[tokio::test]
    async fn test_duplicate_identifier_leaves_file_unchanged() {
        let dir = TempDir::new();
        let id = contributor("3f2504e0-4f89-41d3-9a0c-0305e82c3301");
        let mut store = FileStore::new(&dir.0).await.unwrap();
        let stored = vec![record("1", [1.; 4], 1.), record("2", [2.; 4], 2.)];
        store.append_records(&id, &stored).await.unwrap();
        let path = store.samples_path(&id);
        let before = std::fs::read(&path).unwrap();

        let append = store
            .append_records(&id, &[record("3", [3.; 4], 3.), record("2", [4.; 4], 4.)])
            .await
            .unwrap();
        assert_eq!(
            append.into_inner(),
            Err(RecordAppendError::DuplicateIdentifier("2".to_string()))
        );
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let dir = TempDir::new();
        let id = contributor("3f2504e0-4f89-41d3-9a0c-0305e82c3301");
        let store = FileStore::new(&dir.0).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let mut store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    store
                        .append_records(&id, &[record(&i.to_string(), [1.; 4], 1.)])
                        .await
                        .unwrap()
                        .into_inner()
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut store = store;
        assert_eq!(store.records(&id).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_models() {
        let dir = TempDir::new();
        let mut store = FileStore::new(&dir.0).await.unwrap();
        assert!(ModelStorage::is_ready(&mut store).await.is_ok());
        assert!(store.contributor_models().await.unwrap().is_empty());
        assert!(store.global_model().await.unwrap().is_none());

        let a = model("3f2504e0-4f89-41d3-9a0c-0305e82c3301", 1.);
        let b = model("0c8f2b3e-54a1-4b0c-8a5e-2d6f4c1a9b7d", 2.);
        store.set_contributor_model(&a).await.unwrap();
        store.set_contributor_model(&b).await.unwrap();
        let updated = model("3f2504e0-4f89-41d3-9a0c-0305e82c3301", 3.);
        store.set_contributor_model(&updated).await.unwrap();

        assert_eq!(
            store.contributor_model(&a.contributor).await.unwrap(),
            Some(updated.clone())
        );
        let mut models = store.contributor_models().await.unwrap();
        models.sort_by(|x, y| x.contributor.cmp(&y.contributor));
        assert_eq!(models, vec![b, updated]);

        let global = GlobalModel {
            weights: vec![0.5; 4],
            bias: 2.,
            total_samples: 8,
            contributors: 2,
            timestamp: Utc::now(),
        };
        store.set_global_model(&global).await.unwrap();
        assert_eq!(store.global_model().await.unwrap(), Some(global));

        // no temporary files are left behind
        let leftovers = std::fs::read_dir(dir.0.join("weights"))
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new();
        let mut store = FileStore::new(&dir.0).await.unwrap();
        std::fs::write(dir.0.join("model.json"), b"{ not json").unwrap();
        assert!(store.global_model().await.is_err());
    }
}
