//! Ledger proofs of contributor records.
//!
//! A record is *proven* if the digest of its canonical string equals the digest anchored in the
//! ledger under the record's owner identifier. The [`ProofVerifier`] checks a batch of records and
//! partitions it into a [`ProofReport`]: every record of the batch ends up in exactly one of the
//! `verified`, `mismatched` or `errored` sequences, and each sequence keeps the batch order.
//!
//! Per-record failures, including ledger failures and timeouts, never fail the batch.
//!
//! # Verification modes
//!
//! The verifier runs in one of two explicitly configured [`VerificationMode`]s:
//! - [`VerificationMode::Verified`]: every record is checked against the ledger.
//! - [`VerificationMode::TrustAll`]: the ledger is not consulted and every record that has an
//!   identifier and a canonical form is accepted. This removes the tamper protection and must be a
//!   deliberate choice of the operator.

mod owner_key;

use std::{fmt, sync::Arc, time::Duration};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use self::owner_key::{OwnerKey, OwnerKeyError};
use crate::{
    crypto::{canonicalize, digest, Sha256},
    ledger::{AnchoredDigest, Ledger},
    record::Record,
};

/// The reason attached to records whose digest differs from the anchored one.
pub const HASH_MISMATCH: &str = "hash mismatch with ledger data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How records are proven.
pub enum VerificationMode {
    /// Records are checked against the ledger.
    Verified,
    /// The ledger is not consulted.
    TrustAll,
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => f.write_str("verified"),
            Self::TrustAll => f.write_str("trust_all"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// A record whose digest is anchored in the ledger.
pub struct VerifiedRecord {
    pub record: Record,
    pub digest: Sha256,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// A record whose digest differs from the anchored one.
pub struct MismatchedRecord {
    pub record: Record,
    pub digest: Sha256,
    pub anchored: AnchoredDigest,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// A record that could not be checked.
pub struct ErroredRecord {
    pub record: Record,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
/// The classification of a single record.
pub enum ProofOutcome {
    Verified(VerifiedRecord),
    Mismatched(MismatchedRecord),
    Errored(ErroredRecord),
}

impl ProofOutcome {
    fn errored(record: Record, error: impl ToString) -> Self {
        Self::Errored(ErroredRecord {
            record,
            error: error.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
/// The partition of a batch of records.
pub struct ProofReport {
    pub verified: Vec<VerifiedRecord>,
    pub mismatched: Vec<MismatchedRecord>,
    pub errored: Vec<ErroredRecord>,
}

impl ProofReport {
    /// Gets the number of classified records.
    pub fn len(&self) -> usize {
        self.verified.len() + self.mismatched.len() + self.errored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets the verified records, in batch order.
    pub fn verified_records(&self) -> impl Iterator<Item = &Record> {
        self.verified.iter().map(|verified| &verified.record)
    }
}

impl Extend<ProofOutcome> for ProofReport {
    fn extend<I: IntoIterator<Item = ProofOutcome>>(&mut self, outcomes: I) {
        for outcome in outcomes {
            match outcome {
                ProofOutcome::Verified(r) => self.verified.push(r),
                ProofOutcome::Mismatched(r) => self.mismatched.push(r),
                ProofOutcome::Errored(r) => self.errored.push(r),
            }
        }
    }
}

impl std::iter::FromIterator<ProofOutcome> for ProofReport {
    fn from_iter<I: IntoIterator<Item = ProofOutcome>>(outcomes: I) -> Self {
        let mut report = Self::default();
        report.extend(outcomes);
        report
    }
}

#[derive(Clone)]
/// Checks records against the ledger.
pub struct ProofVerifier {
    /// The ledger, absent in [`VerificationMode::TrustAll`]
    ledger: Option<Arc<dyn Ledger>>,
    /// The deadline of a single ledger lookup
    timeout: Duration,
    /// The maximal number of concurrent ledger lookups
    concurrency: usize,
}

impl fmt::Debug for ProofVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofVerifier")
            .field("mode", &self.mode())
            .field("timeout", &self.timeout)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ProofVerifier {
    /// Creates a verifier that checks every record against the `ledger`.
    ///
    /// Each ledger lookup is aborted after `timeout`, and at most `concurrency` lookups are in
    /// flight at the same time.
    pub fn with_ledger(ledger: Arc<dyn Ledger>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            ledger: Some(ledger),
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Creates a verifier that accepts records without consulting a ledger.
    pub fn trust_all() -> Self {
        Self {
            ledger: None,
            timeout: Duration::default(),
            concurrency: 1,
        }
    }

    /// Gets the verification mode.
    pub fn mode(&self) -> VerificationMode {
        if self.ledger.is_some() {
            VerificationMode::Verified
        } else {
            VerificationMode::TrustAll
        }
    }

    /// Checks a batch of records.
    pub async fn verify(&self, records: Vec<Record>) -> ProofReport {
        let report: ProofReport = stream::iter(records)
            .map(|record| self.verify_record(record))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();
        debug!(
            "proof report: {} verified, {} mismatched, {} errored",
            report.verified.len(),
            report.mismatched.len(),
            report.errored.len()
        );
        report
    }

    /// Checks a single record.
    pub async fn verify_record(&self, record: Record) -> ProofOutcome {
        let id = match record.owner_id() {
            Some(id) => id.to_string(),
            None => return ProofOutcome::errored(record, "identifier missing"),
        };

        let digest = match canonicalize(&record) {
            Ok(canonical) => digest(&canonical),
            Err(err) => {
                warn!("record {} can't be canonicalized: {}", id, err);
                return ProofOutcome::errored(record, err);
            }
        };

        let ledger = match &self.ledger {
            Some(ledger) => ledger,
            None => return ProofOutcome::Verified(VerifiedRecord { record, digest }),
        };

        let key = match id.parse::<OwnerKey>() {
            Ok(key) => key,
            Err(err) => {
                warn!("record {} has no ledger key: {}", id, err);
                return ProofOutcome::errored(record, err);
            }
        };

        let anchored = match tokio::time::timeout(self.timeout, ledger.anchored_digest(key)).await
        {
            Ok(Ok(Some(anchored))) => anchored,
            Ok(Ok(None)) => {
                warn!("no anchored hash for record {}", id);
                return ProofOutcome::errored(record, "no anchored hash for identifier");
            }
            Ok(Err(err)) => {
                warn!("ledger lookup for record {} failed: {}", id, err);
                return ProofOutcome::errored(record, format!("ledger lookup failed: {}", err));
            }
            Err(_) => {
                warn!("ledger lookup for record {} timed out", id);
                return ProofOutcome::errored(
                    record,
                    format!("ledger lookup timed out after {:?}", self.timeout),
                );
            }
        };

        if anchored.as_str() == digest.to_string() {
            ProofOutcome::Verified(VerifiedRecord { record, digest })
        } else {
            warn!("record {}: {}", id, HASH_MISMATCH);
            ProofOutcome::Mismatched(MismatchedRecord {
                record,
                digest,
                anchored,
                reason: HASH_MISMATCH,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger::MockLedger, record::tests::record};

    fn anchored(record: &Record) -> AnchoredDigest {
        AnchoredDigest::new(digest(&canonicalize(record).unwrap()).to_string())
    }

    fn verifier(ledger: MockLedger) -> ProofVerifier {
        ProofVerifier::with_ledger(Arc::new(ledger), Duration::from_secs(1), 4)
    }

    #[tokio::test]
    async fn test_verified_record() {
        let rec = record("0x2a", [72., 80., 120., 45.], 80.);
        let expected = anchored(&rec);

        let mut ledger = MockLedger::new();
        ledger
            .expect_anchored_digest()
            .withf(|key| *key == OwnerKey::new(42))
            .return_once(move |_| Ok(Some(expected)));

        match verifier(ledger).verify_record(rec.clone()).await {
            ProofOutcome::Verified(verified) => {
                assert_eq!(verified.record, rec);
                assert_eq!(verified.digest, digest(&canonicalize(&rec).unwrap()));
            }
            outcome => panic!("expected a verified record, got {:?}", outcome),
        }
    }

    #[tokio::test]
    async fn test_mismatched_record() {
        let rec = record("7", [72., 80., 120., 45.], 80.);
        let mut tampered = rec.clone();
        tampered.target.life_expectancy = Some(99.);
        let original = anchored(&rec);

        let mut ledger = MockLedger::new();
        ledger
            .expect_anchored_digest()
            .return_once(move |_| Ok(Some(original)));

        match verifier(ledger).verify_record(tampered).await {
            ProofOutcome::Mismatched(mismatched) => {
                assert_eq!(mismatched.reason, HASH_MISMATCH);
                assert_eq!(mismatched.anchored, anchored(&rec));
                assert_ne!(mismatched.anchored.as_str(), mismatched.digest.to_string());
            }
            outcome => panic!("expected a mismatched record, got {:?}", outcome),
        }
    }

    #[tokio::test]
    async fn test_errored_records() {
        let mut ledger = MockLedger::new();
        ledger
            .expect_anchored_digest()
            .withf(|key| *key == OwnerKey::new(1))
            .returning(|_| Ok(None));
        ledger
            .expect_anchored_digest()
            .withf(|key| *key == OwnerKey::new(2))
            .returning(|_| Err(anyhow::anyhow!("connection refused")));
        let verifier = verifier(ledger);

        let mut no_id = record("", [72., 80., 120., 45.], 80.);
        no_id.id = None;
        let mut no_birthdate = record("3", [72., 80., 120., 45.], 80.);
        no_birthdate.birthdate = None;
        let cases = vec![
            (no_id, "identifier missing".to_string()),
            (no_birthdate, "missing field `birthdate`".to_string()),
            (
                record("abc", [72., 80., 120., 45.], 80.),
                OwnerKeyError::InvalidDigits("abc".into()).to_string(),
            ),
            (
                record("1", [72., 80., 120., 45.], 80.),
                "no anchored hash for identifier".to_string(),
            ),
            (
                record("2", [72., 80., 120., 45.], 80.),
                "ledger lookup failed: connection refused".to_string(),
            ),
        ];

        for (rec, expected) in cases {
            match verifier.verify_record(rec).await {
                ProofOutcome::Errored(errored) => assert_eq!(errored.error, expected),
                outcome => panic!("expected an errored record, got {:?}", outcome),
            }
        }
    }

    #[tokio::test]
    async fn test_ledger_timeout_is_a_record_error() {
        struct SlowLedger;

        #[async_trait::async_trait]
        impl Ledger for SlowLedger {
            async fn anchored_digest(
                &self,
                _key: OwnerKey,
            ) -> crate::ledger::LedgerResult<Option<AnchoredDigest>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(None)
            }

            async fn is_ready(&self) -> crate::ledger::LedgerResult<()> {
                Ok(())
            }
        }

        let verifier =
            ProofVerifier::with_ledger(Arc::new(SlowLedger), Duration::from_millis(10), 2);
        let report = verifier
            .verify(vec![
                record("1", [72., 80., 120., 45.], 80.),
                record("2", [72., 80., 120., 45.], 80.),
            ])
            .await;
        assert_eq!(report.errored.len(), 2);
        assert!(report.errored[0].error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_batch_partition_keeps_order() {
        let records: Vec<Record> = (0..12)
            .map(|i| record(&i.to_string(), [60. + i as f64, 80., 120., 45.], 80.))
            .collect();
        let anchors: Vec<AnchoredDigest> = records.iter().map(anchored).collect();

        let mut ledger = MockLedger::new();
        ledger.expect_anchored_digest().returning(move |key| {
            let i = key.get() as usize;
            match i % 3 {
                0 => Ok(Some(anchors[i].clone())),
                1 => Ok(Some(AnchoredDigest::new("deadbeef"))),
                _ => Ok(None),
            }
        });

        let report = verifier(ledger).verify(records.clone()).await;
        assert_eq!(report.len(), records.len());

        let ids = |records: Vec<&Record>| -> Vec<String> {
            records.iter().map(|r| r.id.clone().unwrap()).collect()
        };
        assert_eq!(
            ids(report.verified.iter().map(|r| &r.record).collect()),
            vec!["0", "3", "6", "9"]
        );
        assert_eq!(
            ids(report.mismatched.iter().map(|r| &r.record).collect()),
            vec!["1", "4", "7", "10"]
        );
        assert_eq!(
            ids(report.errored.iter().map(|r| &r.record).collect()),
            vec!["2", "5", "8", "11"]
        );
    }

    #[tokio::test]
    async fn test_trust_all_skips_the_ledger() {
        let verifier = ProofVerifier::trust_all();
        assert_eq!(verifier.mode(), VerificationMode::TrustAll);

        let mut incomplete = record("4", [72., 80., 120., 45.], 80.);
        incomplete.first_name = None;
        let report = verifier
            .verify(vec![
                record("not-a-number", [72., 80., 120., 45.], 80.),
                incomplete,
            ])
            .await;
        assert_eq!(report.verified.len(), 1);
        assert_eq!(report.errored.len(), 1);
        assert!(report.mismatched.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = verifier(MockLedger::new()).verify(Vec::new()).await;
        assert!(report.is_empty());
    }
}
