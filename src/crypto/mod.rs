//! Record canonicalization and hashing.
//!
//! The digest of a record is the `SHA256` hash of its canonical string. The coordinator and
//! whoever anchors digests in the ledger must agree on both the field order of the canonical
//! string and the hash function, so neither is configurable.
//!
//! # Examples
//! ```
//! # use ledger_fl::{crypto::{canonicalize, Sha256}, record::Record};
//! let record = Record {
//!     first_name: Some("Ada".into()),
//!     last_name: Some("Lovelace".into()),
//!     birthdate: Some("1815-12-10".into()),
//!     ..Default::default()
//! };
//! // the numeric fields are missing
//! assert!(canonicalize(&record).is_err());
//! assert_eq!(Sha256::hash(b"").to_string().len(), 64);
//! ```

pub(crate) mod canonical;
pub(crate) mod hash;

pub use self::{
    canonical::{canonicalize, digest, MissingFieldError, CANONICAL_FIELDS, DELIMITER},
    hash::{InvalidDigest, Sha256},
};
