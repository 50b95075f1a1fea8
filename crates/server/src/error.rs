// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use batchwright_core::{InitiateError, StoreError};
use batchwright_db::DbError;
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Initiate failed: {0}")]
    Initiate(#[from] InitiateError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Initiate(err) => {
                let (status, error_msg) = match err {
                    InitiateError::AlreadyRunning { job_id } => {
                        tracing::warn!(job_id = ?job_id, "Initiate rejected: job already running");
                        (StatusCode::CONFLICT, "Job already running")
                    }
                    InitiateError::UnrecognizedFormat { .. } => {
                        (StatusCode::BAD_REQUEST, "Unrecognized file format")
                    }
                    InitiateError::TypeMismatch { .. } => {
                        (StatusCode::BAD_REQUEST, "File type mismatch")
                    }
                    InitiateError::EmptyArtifact { .. } => (StatusCode::BAD_REQUEST, "Empty file"),
                    InitiateError::Malformed { path, message } => {
                        tracing::warn!(path = %path.display(), message = %message, "Malformed upload");
                        (StatusCode::BAD_REQUEST, "Malformed file")
                    }
                    InitiateError::Unsupported(job_type) => {
                        tracing::warn!(job_type = %job_type, "No handler configured");
                        (StatusCode::BAD_REQUEST, "Unsupported job type")
                    }
                    InitiateError::Io { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "IO error staging file");
                        (StatusCode::INTERNAL_SERVER_ERROR, "IO error staging file")
                    }
                    InitiateError::Store(store_err) => {
                        tracing::error!(error = %store_err, "Job store error during initiate");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Job store error")
                    }
                };
                (status, ErrorResponse::with_details(error_msg, err.to_string()))
            }
            ApiError::Store(store_err) => {
                tracing::error!(error = %store_err, "Job store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Job store error", store_err.to_string()),
                )
            }
            ApiError::Database(db_err) => {
                tracing::error!(error = %db_err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Database error", db_err.to_string()),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
