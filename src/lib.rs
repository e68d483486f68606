//! # ledger-fl: federated averaging over ledger-verified records
//!
//! Independent data holders ("contributors", e.g. hospitals) submit labeled records to the
//! coordinator. The coordinator proves every record of a contributor against an external ledger,
//! trains a local linear model on the verified records and merges all local models into one global
//! model by sample weighted averaging. The global model is then used to answer prediction requests.
//!
//! ## Proofs
//! The digest of a record's canonical string is anchored in the ledger under the record's owner
//! identifier. A record whose recomputed digest differs from the anchored one has been tampered
//! with and is excluded from training. See [`proof`] for the details and for the explicit
//! `trust_all` mode, which skips the ledger.
//!
//! ## Components
//! - [`crypto`]: canonicalization and hashing of records.
//! - [`ledger`]: the ledger client.
//! - [`proof`]: the proof verifier.
//! - [`training`]: the local linear regression trainer.
//! - [`aggregation`]: federated averaging.
//! - [`prediction`]: predictions of the global model.
//! - [`storage`]: record and model storage.
//! - [`coordinator`]: the service combining all of the above.
//! - [`rest`]: the HTTP API.

pub mod aggregation;
pub mod coordinator;
pub mod crypto;
pub mod ledger;
pub(crate) mod locks;
pub mod model;
pub mod prediction;
pub mod proof;
pub mod record;
pub mod rest;
pub mod settings;
pub mod storage;
pub mod training;
