//! Wrapper around the [sodiumoxide] `SHA256` hash function.
//!
//! See the [crypto module] documentation since this is a private module anyways.
//!
//! [sodiumoxide]: https://docs.rs/sodiumoxide/
//! [crypto module]: crate::crypto

use std::{convert::TryFrom, fmt, str::FromStr};

use derive_more::{AsRef, From};
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::hash::sha256;
use thiserror::Error;

#[derive(AsRef, From, Hash, Eq, Ord, PartialEq, Copy, Clone, PartialOrd, Debug)]
/// A digest of the `SHA256` hash function.
///
/// Digests are displayed and serialized as 64 lowercase hexadecimal characters, which is also the
/// representation under which they are anchored in the ledger.
pub struct Sha256(sha256::Digest);

impl Sha256 {
    /// The length of a digest in bytes.
    pub const LENGTH: usize = sha256::DIGESTBYTES;

    /// Computes the digest of the message `m`.
    pub fn hash(m: &[u8]) -> Self {
        Self(sha256::hash(m))
    }

    /// Gets the digest byte representation.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Creates a digest from the given buffer.
    ///
    /// Returns `None` if the length of the buffer isn't [`Sha256::LENGTH`].
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        sha256::Digest::from_slice(bytes).map(Self)
    }
}

impl fmt::Display for Sha256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_slice()))
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid SHA256 digest: {0}")]
/// Error that occurs when parsing a hex encoded digest.
pub struct InvalidDigest(String);

impl FromStr for Sha256 {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| InvalidDigest(e.to_string()))?;
        Self::from_slice(&bytes).ok_or_else(|| {
            InvalidDigest(format!(
                "expected {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            ))
        })
    }
}

impl TryFrom<String> for Sha256 {
    type Error = InvalidDigest;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Serialize for Sha256 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sha256 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
