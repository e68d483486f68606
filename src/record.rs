//! Contributor records and the fixed feature schema.
//!
//! A [`Record`] is one labeled training example submitted by a contributor. Every field is kept
//! optional on the type itself: records are persisted as they were submitted, and the absence of a
//! field is only an error for the component that needs it (canonicalization needs the identity
//! fields, training needs the numeric ones).

use std::{convert::TryFrom, fmt, str::FromStr};

use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};
use uuid::{Uuid, Variant};

/// The number of features of the linear model.
pub const FEATURE_COUNT: usize = 4;

/// The wire names of the features, in the order in which the model weights are stored.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "heartrate_average_last_3_days",
    "blood_pressure_diastolic",
    "blood_pressure_sistolic",
    "age",
];

#[derive(
    AsRef, Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
/// The identifier of a contributor (e.g. a hospital UUID).
///
/// Contributor identifiers are used as storage keys, so they are restricted to RFC 4122 version 4
/// UUIDs in their hyphenated form.
pub struct ContributorId(String);

#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid version 4 UUID")]
/// Error that occurs when parsing a [`ContributorId`].
pub struct InvalidContributorId(String);

impl FromStr for ContributorId {
    type Err = InvalidContributorId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Uuid::parse_str(s) {
            Ok(uuid)
                if uuid.get_version_num() == 4
                    && uuid.get_variant() == Some(Variant::RFC4122) =>
            {
                Ok(Self(uuid.to_hyphenated().to_string()))
            }
            _ => Err(InvalidContributorId(s.to_string())),
        }
    }
}

impl ContributorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// The feature values of a record.
pub struct RecordFeatures {
    #[serde(default)]
    pub heartrate_average_last_3_days: Option<f64>,
    #[serde(default)]
    pub blood_pressure_diastolic: Option<f64>,
    #[serde(default)]
    pub blood_pressure_sistolic: Option<f64>,
    #[serde(default)]
    pub age: Option<f64>,
}

impl RecordFeatures {
    /// Returns the feature values in model order, paired with their names.
    pub fn named(&self) -> [(&'static str, Option<f64>); FEATURE_COUNT] {
        [
            (FEATURE_NAMES[0], self.heartrate_average_last_3_days),
            (FEATURE_NAMES[1], self.blood_pressure_diastolic),
            (FEATURE_NAMES[2], self.blood_pressure_sistolic),
            (FEATURE_NAMES[3], self.age),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// The target value of a record.
pub struct RecordTarget {
    #[serde(default)]
    pub life_expectancy: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// A labeled training example of a contributor.
pub struct Record {
    /// The owner identifier. It is the record key within a contributor's record set and the key
    /// under which the record's digest is anchored in the ledger.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub features: RecordFeatures,
    #[serde(default)]
    pub target: RecordTarget,
}

impl Record {
    /// Returns the owner identifier if it is present and not blank.
    pub fn owner_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, From, Into, Serialize, Deserialize)]
/// A feature vector in model order.
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(
        heartrate_average_last_3_days: f64,
        blood_pressure_diastolic: f64,
        blood_pressure_sistolic: f64,
        age: f64,
    ) -> Self {
        Self([
            heartrate_average_last_3_days,
            blood_pressure_diastolic,
            blood_pressure_sistolic,
            age,
        ])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// A record reduced to the numbers the trainer works with.
pub struct Sample {
    pub features: FeatureVector,
    pub target: f64,
}

#[derive(Debug, PartialEq, thiserror::Error)]
/// A record that lacks a numeric value or carries a non-finite one.
pub struct MalformedRecord {
    /// The owner identifier of the record, if it has one.
    pub id: Option<String>,
    /// The name of the offending field.
    pub field: &'static str,
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(
                f,
                "record {} has a missing or non-finite `{}` value",
                id, self.field
            ),
            None => write!(
                f,
                "record without identifier has a missing or non-finite `{}` value",
                self.field
            ),
        }
    }
}

impl TryFrom<&Record> for Sample {
    type Error = MalformedRecord;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let malformed = |field| MalformedRecord {
            id: record.owner_id().map(str::to_string),
            field,
        };
        let finite = |(name, value): (&'static str, Option<f64>)| {
            value.filter(|v| v.is_finite()).ok_or_else(|| malformed(name))
        };

        let [f1, f2, f3, f4] = record.features.named();
        let features = FeatureVector([finite(f1)?, finite(f2)?, finite(f3)?, finite(f4)?]);
        let target = finite(("life_expectancy", record.target.life_expectancy))?;
        Ok(Sample { features, target })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn record(id: &str, features: [f64; FEATURE_COUNT], target: f64) -> Record {
        Record {
            id: Some(id.to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            birthdate: Some("1815-12-10".to_string()),
            features: RecordFeatures {
                heartrate_average_last_3_days: Some(features[0]),
                blood_pressure_diastolic: Some(features[1]),
                blood_pressure_sistolic: Some(features[2]),
                age: Some(features[3]),
            },
            target: RecordTarget {
                life_expectancy: Some(target),
            },
        }
    }

    #[test]
    fn test_contributor_id_accepts_uuid_v4() {
        let id: ContributorId = "3F2504E0-4F89-41D3-9A0C-0305E82C3301".parse().unwrap();
        assert_eq!(id.as_str(), "3f2504e0-4f89-41d3-9a0c-0305e82c3301");
    }

    #[test]
    fn test_contributor_id_rejects_other_versions_and_paths() {
        // version 1
        assert!("e4eaaaf2-d142-11e1-b3e4-080027620cdd"
            .parse::<ContributorId>()
            .is_err());
        assert!("../model".parse::<ContributorId>().is_err());
        // variant bits `11`
        assert!("3f2504e0-4f89-41d3-ca0c-0305e82c3301"
            .parse::<ContributorId>()
            .is_err());
    }

    #[test]
    fn test_record_rejects_unknown_shapes() {
        let json = r#"{ "id": "1", "x": [1, 2, 3, 4], "y": 80 }"#;
        assert!(serde_json::from_str::<Record>(json).is_err());
    }

    #[test]
    fn test_record_deserializes_canonical_schema() {
        let json = r#"{
            "id": "0x2a",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "birthdate": "1815-12-10",
            "features": {
                "heartrate_average_last_3_days": 72,
                "blood_pressure_diastolic": 80,
                "blood_pressure_sistolic": 120,
                "age": 45
            },
            "target": { "life_expectancy": 80.5 }
        }"#;
        let parsed: Record = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, record("0x2a", [72., 80., 120., 45.], 80.5));
    }

    #[test]
    fn test_owner_id_ignores_blank_identifiers() {
        let mut rec = record(" ", [1., 2., 3., 4.], 5.);
        assert_eq!(rec.owner_id(), None);
        rec.id = None;
        assert_eq!(rec.owner_id(), None);
    }

    #[test]
    fn test_sample_from_record() {
        let sample = Sample::try_from(&record("7", [72., 80., 120., 45.], 80.5)).unwrap();
        assert_eq!(sample.features, FeatureVector::new(72., 80., 120., 45.));
        assert_eq!(sample.target, 80.5);
    }

    #[test]
    fn test_sample_from_malformed_record() {
        let mut rec = record("7", [72., 80., 120., 45.], 80.5);
        rec.features.blood_pressure_sistolic = None;
        assert_eq!(
            Sample::try_from(&rec).unwrap_err(),
            MalformedRecord {
                id: Some("7".to_string()),
                field: "blood_pressure_sistolic"
            }
        );

        let mut rec = record("8", [72., 80., 120., 45.], 80.5);
        rec.target.life_expectancy = Some(f64::NAN);
        assert_eq!(Sample::try_from(&rec).unwrap_err().field, "life_expectancy");
    }
}
