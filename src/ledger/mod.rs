//! Ledger API.
//!
//! The ledger is an external, append-only source of truth that maps an [`OwnerKey`] to the digest
//! anchored for the record with that owner identifier. The coordinator only ever reads from it.

pub mod rpc;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::rpc::{RpcLedger, RpcLedgerError};
use crate::proof::OwnerKey;

/// The error type for ledger operations, e.g. transport failures or contract errors.
pub type LedgerError = anyhow::Error;

/// The result of the ledger operation.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
/// A digest as anchored in the ledger.
///
/// The ledger stores opaque strings, so the anchored digest is compared verbatim with the
/// recomputed one.
pub struct AnchoredDigest(String);

impl AnchoredDigest {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnchoredDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
/// An abstract ledger client.
pub trait Ledger: Send + Sync + 'static {
    /// Returns the digest anchored for the given key.
    ///
    /// # Behavior
    ///
    /// - If a digest is anchored for the key, return `LedgerResult::Ok(Some(AnchoredDigest))`.
    /// - If no digest is anchored for the key, return `LedgerResult::Ok(None)`. This is not an
    ///   error, the record is simply not anchored.
    /// - If the ledger could not be queried, return `LedgerResult::Err(error)`.
    async fn anchored_digest(&self, key: OwnerKey) -> LedgerResult<Option<AnchoredDigest>>;

    /// Checks if the [`Ledger`] is ready to process requests.
    ///
    /// # Behavior
    ///
    /// If the [`Ledger`] is ready to process requests, return `LedgerResult::Ok(())`.
    /// If the [`Ledger`] cannot process requests because of a connection error,
    /// for example, return `LedgerResult::Err(error)`.
    async fn is_ready(&self) -> LedgerResult<()>;
}
