use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::any::Any;
use thiserror::Error;

use crate::pipeline::{MalformedInputError, ProcessError, RequestError, ValidationError};

pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON";
pub const VALIDATION_MESSAGE: &str = "Validation failed";
pub const SPAWN_FAILED_MESSAGE: &str = "Failed to start AI model process";
pub const PROMPT_WRITE_MESSAGE: &str = "Error sending prompt to AI model";
pub const NOT_FOUND_MESSAGE: &str = "Resource not found. Please check the URL.";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error. Please try again later.";

/// Failures detected before any response bytes are sent.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error(transparent)]
    MalformedInput(#[from] MalformedInputError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    ProcessSpawn(ProcessError),
    #[error(transparent)]
    PromptWrite(ProcessError),
}

impl From<RequestError> for TriageError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Malformed(e) => Self::MalformedInput(e),
            RequestError::Invalid(e) => Self::Validation(e),
        }
    }
}

impl From<ProcessError> for TriageError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn { .. } => Self::ProcessSpawn(err),
            ProcessError::PromptWrite(_) => Self::PromptWrite(err),
        }
    }
}

impl TriageError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedInput(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ProcessSpawn(_) | Self::PromptWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TriageError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::MalformedInput(_) => json!({
                "message": INVALID_JSON_MESSAGE,
                "detail": INVALID_JSON_MESSAGE,
            }),
            Self::Validation(e) => json!({
                "message": VALIDATION_MESSAGE,
                "detail": e.to_string(),
                "field": e.field,
            }),
            Self::ProcessSpawn(_) => json!({
                "message": SPAWN_FAILED_MESSAGE,
                "detail": SPAWN_FAILED_MESSAGE,
            }),
            Self::PromptWrite(_) => json!({
                "message": PROMPT_WRITE_MESSAGE,
                "detail": PROMPT_WRITE_MESSAGE,
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Response for a handler that panicked.
pub fn internal_error(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&'static str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": INTERNAL_ERROR_MESSAGE })),
    )
        .into_response()
}
