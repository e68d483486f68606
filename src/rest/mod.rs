//! A HTTP API for contributors and prediction clients.
//!
//! | route | body | reply |
//! |---|---|---|
//! | `POST /compute` | `{ hospitalUUID, patients? }` | the training and aggregation result |
//! | `POST /compute-aggregate` | none | the global model |
//! | `POST /predict-result` | the four features | the rounded prediction |
//!
//! Errors are replied as `{ error, message, errors?, success: false }` where `error` is a machine
//! readable kind.

pub mod validation;

use std::convert::Infallible;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};
use warp::{
    http::StatusCode,
    reply::{self, Reply},
    Filter,
};

use crate::{
    aggregation::AggregationError,
    coordinator::{ComputeOutcome, Coordinator, CoordinatorError},
    model::GlobalModel,
    prediction::PredictionError,
    proof::{ErroredRecord, MismatchedRecord, VerificationMode},
    settings::ApiSettings,
    storage::Storage,
    training::{Evaluation, HistoryEntry},
};

/// The maximal size of a request body.
const BODY_LIMIT: u64 = 10 * 1024 * 1024;

/// Starts a HTTP server at the given address.
///
/// # Errors
/// Fails if the server can't be bound to the address.
pub async fn serve<S>(
    api_settings: ApiSettings,
    coordinator: Coordinator<S>,
) -> Result<(), RestError>
where
    S: Storage,
{
    let (addr, server) = warp::serve(routes(coordinator))
        .try_bind_ephemeral(api_settings.bind_address)
        .map_err(|e| RestError::Bind(e.to_string()))?;
    tracing::info!("listening on http://{}", addr);
    server.await;
    Ok(())
}

/// Builds the routes of the API.
pub fn routes<S>(
    coordinator: Coordinator<S>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone
where
    S: Storage,
{
    let compute = warp::path!("compute")
        .and(warp::post())
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::json())
        .and(with_coordinator(coordinator.clone()))
        .and_then(handle_compute);

    let aggregate = warp::path!("compute-aggregate")
        .and(warp::post())
        .and(with_coordinator(coordinator.clone()))
        .and_then(handle_aggregate);

    let predict = warp::path!("predict-result")
        .and(warp::post())
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::json())
        .and(with_coordinator(coordinator))
        .and_then(handle_predict);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allow_headers(vec!["Content-Type", "Authorization"]);

    compute
        .or(aggregate)
        .or(predict)
        .recover(handle_reject)
        .with(cors)
        .with(warp::log("http"))
}

#[derive(Serialize)]
struct ErrorReply<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
    success: bool,
}

fn error_reply(
    status: StatusCode,
    kind: &str,
    message: String,
    errors: Option<Vec<String>>,
) -> reply::WithStatus<reply::Json> {
    let body = ErrorReply {
        error: kind,
        message,
        errors,
        success: false,
    };
    reply::with_status(reply::json(&body), status)
}

fn validation_reply(errors: Vec<String>) -> reply::WithStatus<reply::Json> {
    error_reply(
        StatusCode::BAD_REQUEST,
        "validation_error",
        "Errors in the parameters validation".to_string(),
        Some(errors),
    )
}

fn coordinator_error_reply(err: CoordinatorError) -> reply::WithStatus<reply::Json> {
    let status = match &err {
        CoordinatorError::Conflict(_) => StatusCode::CONFLICT,
        CoordinatorError::Training(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoordinatorError::Aggregation(AggregationError::SchemaMismatch { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        CoordinatorError::Aggregation(_) => StatusCode::NOT_FOUND,
        CoordinatorError::Prediction(PredictionError::ModelNotReady) => StatusCode::NOT_FOUND,
        CoordinatorError::Prediction(PredictionError::SchemaMismatch(_)) => {
            StatusCode::BAD_REQUEST
        }
        CoordinatorError::Storage(_) | CoordinatorError::Task(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!("request failed: {}", err);
    } else {
        warn!("request rejected: {}", err);
    }
    error_reply(status, err.kind(), err.to_string(), None)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AggregatedWeight<'a> {
    weights: &'a [f64],
    bias: f64,
    number_of_samples: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AggregateReply<'a> {
    aggregated_weight: AggregatedWeight<'a>,
    number_of_hospitals: usize,
    total_samples: u64,
    timestamp: String,
}

impl<'a> From<&'a GlobalModel> for AggregateReply<'a> {
    fn from(model: &'a GlobalModel) -> Self {
        Self {
            aggregated_weight: AggregatedWeight {
                weights: &model.weights,
                bias: model.bias,
                number_of_samples: model.total_samples,
            },
            number_of_hospitals: model.contributors,
            total_samples: model.total_samples,
            timestamp: model
                .timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

#[derive(Serialize)]
struct HospitalReply<'a> {
    uuid: &'a str,
}

#[derive(Serialize)]
struct ModelReply<'a> {
    weights: &'a [f64],
    bias: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainingReply<'a> {
    #[serde(rename = "finalMSE")]
    final_mse: f64,
    epochs: u32,
    history: &'a [HistoryEntry],
    evaluation: Option<Evaluation>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataReply {
    total_rows: usize,
    valid_rows: usize,
    invalid_rows: usize,
    errors: usize,
}

#[derive(Serialize)]
struct MismatchReply<'a> {
    id: Option<&'a str>,
    digest: String,
    anchored: &'a str,
    reason: &'a str,
}

impl<'a> From<&'a MismatchedRecord> for MismatchReply<'a> {
    fn from(mismatched: &'a MismatchedRecord) -> Self {
        Self {
            id: mismatched.record.owner_id(),
            digest: mismatched.digest.to_string(),
            anchored: mismatched.anchored.as_str(),
            reason: mismatched.reason,
        }
    }
}

#[derive(Serialize)]
struct ErroredReply<'a> {
    id: Option<&'a str>,
    error: &'a str,
}

impl<'a> From<&'a ErroredRecord> for ErroredReply<'a> {
    fn from(errored: &'a ErroredRecord) -> Self {
        Self {
            id: errored.record.owner_id(),
            error: &errored.error,
        }
    }
}

#[derive(Serialize)]
struct ProofReply<'a> {
    valid: usize,
    invalid: usize,
    errors: usize,
    mode: VerificationMode,
    mismatched: Vec<MismatchReply<'a>>,
    errored: Vec<ErroredReply<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ComputeReply<'a> {
    success: bool,
    message: &'static str,
    hospital: HospitalReply<'a>,
    model: ModelReply<'a>,
    training: TrainingReply<'a>,
    data: DataReply,
    proof_verification: ProofReply<'a>,
    aggregate: AggregateReply<'a>,
}

impl<'a> ComputeReply<'a> {
    fn new(outcome: &'a ComputeOutcome, mode: VerificationMode) -> Self {
        let proofs = &outcome.proofs;
        let training = &outcome.training;
        Self {
            success: true,
            message: "Regression calculated successfully",
            hospital: HospitalReply {
                uuid: outcome.contributor.as_str(),
            },
            model: ModelReply {
                weights: &training.weights,
                bias: training.bias,
            },
            training: TrainingReply {
                final_mse: training.final_mse,
                epochs: training.epochs,
                history: &training.history,
                evaluation: training.evaluation,
            },
            data: DataReply {
                total_rows: outcome.total_records,
                valid_rows: proofs.verified.len(),
                invalid_rows: proofs.mismatched.len(),
                errors: proofs.errored.len(),
            },
            proof_verification: ProofReply {
                valid: proofs.verified.len(),
                invalid: proofs.mismatched.len(),
                errors: proofs.errored.len(),
                mode,
                mismatched: proofs.mismatched.iter().map(Into::into).collect(),
                errored: proofs.errored.iter().map(Into::into).collect(),
            },
            aggregate: AggregateReply::from(&outcome.global_model),
        }
    }
}

#[derive(Serialize)]
struct PredictReply {
    message: String,
    prediction: f64,
    success: bool,
}

/// Handles and responds to a computation request.
async fn handle_compute<S: Storage>(
    body: Value,
    coordinator: Coordinator<S>,
) -> Result<reply::WithStatus<reply::Json>, Infallible> {
    let request = match validation::compute_request(&body) {
        Ok(request) => request,
        Err(errors) => return Ok(validation_reply(errors)),
    };
    Ok(
        match coordinator
            .compute(request.contributor, request.records)
            .await
        {
            Ok(outcome) => {
                let body = ComputeReply::new(&outcome, coordinator.verification_mode());
                reply::with_status(reply::json(&body), StatusCode::OK)
            }
            Err(err) => coordinator_error_reply(err),
        },
    )
}

/// Handles and responds to an aggregation request.
async fn handle_aggregate<S: Storage>(
    coordinator: Coordinator<S>,
) -> Result<reply::WithStatus<reply::Json>, Infallible> {
    Ok(match coordinator.aggregate().await {
        Ok(model) => reply::with_status(
            reply::json(&AggregateReply::from(&model)),
            StatusCode::OK,
        ),
        Err(err) => coordinator_error_reply(err),
    })
}

/// Handles and responds to a prediction request.
async fn handle_predict<S: Storage>(
    body: Value,
    coordinator: Coordinator<S>,
) -> Result<reply::WithStatus<reply::Json>, Infallible> {
    let features = match validation::predict_request(&body) {
        Ok(features) => features,
        Err(errors) => return Ok(validation_reply(errors)),
    };
    Ok(match coordinator.predict(features).await {
        Ok(prediction) => {
            let body = PredictReply {
                message: format!("Your expected life expectancy is {} years.", prediction),
                prediction,
                success: true,
            };
            reply::with_status(reply::json(&body), StatusCode::OK)
        }
        Err(err) => coordinator_error_reply(err),
    })
}

/// Converts a coordinator into a `warp` filter.
fn with_coordinator<S: Storage>(
    coordinator: Coordinator<S>,
) -> impl Filter<Extract = (Coordinator<S>,), Error = Infallible> + Clone {
    warp::any().map(move || coordinator.clone())
}

/// Handles `warp` rejections of bad requests.
async fn handle_reject(
    err: warp::Rejection,
) -> Result<reply::WithStatus<reply::Json>, Infallible> {
    let reply = if err.is_not_found() {
        error_reply(
            StatusCode::NOT_FOUND,
            "not_found",
            "no such route".to_string(),
            None,
        )
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        validation_reply(vec![e.to_string()])
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        error_reply(
            StatusCode::PAYLOAD_TOO_LARGE,
            "validation_error",
            "request body is too large".to_string(),
            None,
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not allowed".to_string(),
            None,
        )
    } else {
        error!("unhandled rejection: {:?}", err);
        error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "unhandled rejection".to_string(),
            None,
        )
    };
    Ok(reply)
}

#[derive(Debug, Error)]
/// Errors of the rest server.
pub enum RestError {
    #[error("failed to bind the server: {0}")]
    Bind(String),
}
