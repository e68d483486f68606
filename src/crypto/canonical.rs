//! Canonical string representation of records.

use thiserror::Error;

use super::Sha256;
use crate::record::Record;

/// The delimiter between the values of the canonical string.
pub const DELIMITER: &str = ",";

/// The fields of the canonical string, in order.
pub const CANONICAL_FIELDS: [&str; 8] = [
    "first_name",
    "last_name",
    "heartrate_average_last_3_days",
    "blood_pressure_diastolic",
    "blood_pressure_sistolic",
    "age",
    "life_expectancy",
    "birthdate",
];

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("missing field `{0}`")]
/// A field that is required for the canonical string is absent.
pub struct MissingFieldError(pub &'static str);

/// Serializes a record into its canonical string.
///
/// The values of the fields in [`CANONICAL_FIELDS`] are joined by [`DELIMITER`]. Numbers use the
/// shortest representation that round-trips, without a trailing `.0` for integral values.
///
/// # Errors
/// Fails with the first absent field in canonical order.
pub fn canonicalize(record: &Record) -> Result<String, MissingFieldError> {
    fn text<'a>(
        value: &'a Option<String>,
        field: &'static str,
    ) -> Result<&'a str, MissingFieldError> {
        value.as_deref().ok_or(MissingFieldError(field))
    }
    fn number(value: Option<f64>, field: &'static str) -> Result<String, MissingFieldError> {
        value.map(|v| v.to_string()).ok_or(MissingFieldError(field))
    }

    let features = &record.features;
    let values = [
        text(&record.first_name, CANONICAL_FIELDS[0])?.to_string(),
        text(&record.last_name, CANONICAL_FIELDS[1])?.to_string(),
        number(features.heartrate_average_last_3_days, CANONICAL_FIELDS[2])?,
        number(features.blood_pressure_diastolic, CANONICAL_FIELDS[3])?,
        number(features.blood_pressure_sistolic, CANONICAL_FIELDS[4])?,
        number(features.age, CANONICAL_FIELDS[5])?,
        number(record.target.life_expectancy, CANONICAL_FIELDS[6])?,
        text(&record.birthdate, CANONICAL_FIELDS[7])?.to_string(),
    ];
    Ok(values.join(DELIMITER))
}

/// Computes the digest of a canonical string.
pub fn digest(canonical: &str) -> Sha256 {
    Sha256::hash(canonical.as_bytes())
}
