use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lumen_core::{Error, StatusOutcome};
use serde_json::{json, Value};
use tracing::{error, warn};

pub const AUTH_FAILED: &str = "Authentication failed. Please check your Replicate API token.";
pub const TIMED_OUT: &str =
    "The request timed out. The image generation is taking longer than expected.";
pub const GENERATE_FAILED: &str = "Failed to generate image";
pub const STATUS_FAILED: &str = "Failed to check generation status";
pub const STILL_GENERATING: &str = "Image is still being generated";

fn body(status: StatusCode, value: Value) -> Response {
    (status, Json(value)).into_response()
}

fn job_failed(reason: &Value) -> Response {
    body(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "status": "error", "error": reason }),
    )
}

/// How a submission endpoint answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Return the job id as soon as the job exists.
    Async,
    /// Block until the image is ready or the wait ceiling is hit.
    Wait,
}

fn generate_failed(message: &str) -> Response {
    error!(%message, "generation request failed");
    body(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": GENERATE_FAILED, "details": { "message": message } }),
    )
}

/// Error bodies for the submission endpoints. Only the waiting endpoint
/// answers 504; elsewhere a timeout is an ordinary upstream failure.
pub fn generate_error(err: &Error, mode: SubmitMode) -> Response {
    match err {
        Error::Validation(message) => {
            warn!(%message, "rejected generation request");
            body(StatusCode::BAD_REQUEST, json!({ "error": message }))
        }
        Error::Auth(detail) => {
            error!(%detail, "upstream rejected credentials");
            body(StatusCode::UNAUTHORIZED, json!({ "error": AUTH_FAILED }))
        }
        Error::Timeout(message) if mode == SubmitMode::Async => generate_failed(message),
        Error::Timeout(message) => {
            error!(%message, "generation timed out");
            body(
                StatusCode::GATEWAY_TIMEOUT,
                json!({ "error": TIMED_OUT, "details": { "message": "Request timeout" } }),
            )
        }
        Error::JobFailed(reason) => {
            error!(%reason, "generation job failed");
            job_failed(reason)
        }
        Error::Upstream(message) => generate_failed(message),
    }
}

/// Error bodies for the status endpoint.
pub fn status_error(err: &Error) -> Response {
    match err {
        Error::Validation(message) => body(StatusCode::BAD_REQUEST, json!({ "error": message })),
        other => {
            error!(err = %other, "error checking prediction status");
            body(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": STATUS_FAILED, "details": other.to_string() }),
            )
        }
    }
}

pub fn status_outcome(outcome: StatusOutcome) -> Response {
    match outcome {
        StatusOutcome::Processing { status } => body(
            StatusCode::OK,
            json!({ "status": status, "message": STILL_GENERATING }),
        ),
        StatusOutcome::Success { image_url } => body(
            StatusCode::OK,
            json!({ "status": "success", "imageUrl": image_url }),
        ),
        StatusOutcome::Failed { reason } => job_failed(&reason),
    }
}
