//! Storage backends for records and models.

pub mod file;
pub mod in_memory;
pub(crate) mod store;
pub mod traits;

pub(crate) use self::traits::check_duplicates;
pub use self::{
    file::FileStore,
    in_memory::InMemoryStore,
    store::Store,
    traits::{
        ModelStorage,
        RecordAppend,
        RecordAppendError,
        RecordStorage,
        Storage,
        StorageError,
        StorageResult,
    },
};
