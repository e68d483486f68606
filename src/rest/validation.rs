//! Validation of request bodies.
//!
//! Bodies are checked field by field and every violation is reported, not just the first one.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::record::{ContributorId, FeatureVector, Record};

/// A validated `/compute` request.
#[derive(Debug)]
pub struct ComputeRequest {
    pub contributor: ContributorId,
    pub records: Vec<Record>,
}

/// The prediction inputs and their upper bounds, in feature order.
const PREDICT_FIELDS: [(&str, f64); 4] = [
    ("heartrate_average_last_3_days", 300.),
    ("blood_pressure_diastolic", 200.),
    ("blood_pressure_sistolic", 300.),
    ("age", 150.),
];

fn as_object(body: &Value) -> Result<&Map<String, Value>, Vec<String>> {
    body.as_object()
        .ok_or_else(|| vec!["request body must be a JSON object".to_string()])
}

/// Validates the body of a `/compute` request.
pub fn compute_request(body: &Value) -> Result<ComputeRequest, Vec<String>> {
    let body = as_object(body)?;
    let mut errors = Vec::new();

    let contributor = match body.get("hospitalUUID") {
        None | Some(Value::Null) => {
            errors.push("hospitalUUID is required".to_string());
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            errors.push("hospitalUUID is required".to_string());
            None
        }
        Some(value) => {
            let parsed = value.as_str().and_then(|s| s.parse::<ContributorId>().ok());
            if parsed.is_none() {
                errors.push(
                    "hospitalUUID must be a valid UUID (format: xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx)"
                        .to_string(),
                );
            }
            parsed
        }
    };

    let records = match body.get("patients") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(patients)) => patients
            .iter()
            .enumerate()
            .filter_map(|(i, patient)| match record(patient) {
                Ok(record) => Some(record),
                Err(error) => {
                    errors.push(format!("patients[{}]: {}", i, error));
                    None
                }
            })
            .collect(),
        Some(_) => {
            errors.push("patients must be an array".to_string());
            Vec::new()
        }
    };

    match contributor {
        Some(contributor) if errors.is_empty() => Ok(ComputeRequest {
            contributor,
            records,
        }),
        _ => Err(errors),
    }
}

fn record(value: &Value) -> Result<Record, String> {
    let record = Record::deserialize(value).map_err(|e| e.to_string())?;
    if record.owner_id().is_none() {
        return Err("id is required".to_string());
    }
    Ok(record)
}

/// Validates the body of a `/predict-result` request.
pub fn predict_request(body: &Value) -> Result<FeatureVector, Vec<String>> {
    let body = as_object(body)?;
    let mut errors = Vec::new();
    let mut values = [0_f64; 4];

    for ((name, max), value) in PREDICT_FIELDS.iter().zip(values.iter_mut()) {
        match body.get(*name) {
            None | Some(Value::Null) => errors.push(format!("{} is required", name)),
            Some(Value::Number(number)) => match number.as_f64() {
                Some(v) if v > 0. && v <= *max => *value = v,
                _ => errors.push(format!("{} must be between 1 and {}", name, max)),
            },
            Some(_) => errors.push(format!("{} must be a number", name)),
        }
    }

    if errors.is_empty() {
        Ok(FeatureVector::from(values))
    } else {
        Err(errors)
    }
}
