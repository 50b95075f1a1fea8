// crates/server/src/routes/jobs.rs
//! API routes for the single batch job.
//!
//! - POST /jobs?type=&name= - Stage the raw request body and start a job (202)
//! - POST /jobs/backup - Start a backup job over a server-side directory (202)
//! - POST /jobs/advance - Process one batch (429 while another batch runs)
//! - GET /jobs/status - Current snapshot, `{"state":"idle"}` when none
//! - DELETE /jobs - Remove the record and staged artifacts

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use batchwright_core::{Advance, ClearReport, InitiateError, JobStatus, JobType, Snapshot};
use chrono::Utc;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::StreamReader;

use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::metrics::{advance_outcome, record_advance, record_initiate};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitiateQuery {
    #[serde(rename = "type")]
    pub job_type: String,
    /// Display name of the upload; defaults to `<type>.csv`.
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    pub source_dir: PathBuf,
}

fn initiate_label(result: &Result<JobStatus, InitiateError>) -> &'static str {
    match result {
        Ok(_) => "accepted",
        Err(InitiateError::AlreadyRunning { .. }) => "conflict",
        Err(e) if e.is_validation() || matches!(e, InitiateError::Unsupported(_)) => "rejected",
        Err(_) => "failed",
    }
}

fn accepted(result: Result<JobStatus, InitiateError>) -> ApiResult<Response> {
    record_initiate(initiate_label(&result));
    let status = result?;
    Ok((StatusCode::ACCEPTED, Json(status)).into_response())
}

/// POST /api/jobs - Stream the body into staging and start an import job.
async fn initiate_job(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InitiateQuery>,
    body: Body,
) -> ApiResult<Response> {
    let job_type: JobType = query
        .job_type
        .parse()
        .map_err(|e: batchwright_core::UnknownJobType| ApiError::BadRequest(e.to_string()))?;
    if !job_type.is_import() {
        return Err(ApiError::BadRequest(
            "backup jobs are started with POST /api/jobs/backup".into(),
        ));
    }
    let name = query
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("{job_type}.csv"));

    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let reader = StreamReader::new(stream);
    accepted(state.engine.initiate(job_type, &name, reader).await)
}

/// POST /api/jobs/backup - Start a backup job over `sourceDir`.
async fn initiate_backup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BackupRequest>,
) -> ApiResult<Response> {
    accepted(state.engine.initiate_backup(&request.source_dir).await)
}

/// POST /api/jobs/advance - Run at most one batch of the current job.
async fn advance_job(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let called_at = Utc::now();
    let started = Instant::now();
    let (advance, counts) = state.engine.advance_counted().await?;
    record_advance(advance_outcome(&advance, called_at), started.elapsed(), counts);

    match advance {
        Advance::Busy => Ok((
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "1")],
            Json(ErrorResponse::with_details(
                "Job busy",
                "Another batch is in progress; retry shortly",
            )),
        )
            .into_response()),
        Advance::Snapshot(snapshot) => Ok(Json(snapshot).into_response()),
    }
}

/// GET /api/jobs/status - Read the stored record without locking.
async fn job_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<Snapshot>> {
    Ok(Json(state.engine.snapshot()?))
}

/// DELETE /api/jobs - Clear the record and every staged artifact.
async fn clear_job(State(state): State<Arc<AppState>>) -> ApiResult<Json<ClearReport>> {
    Ok(Json(state.engine.clear().await?))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(initiate_job).delete(clear_job))
        .route("/jobs/backup", post(initiate_backup))
        .route("/jobs/advance", post(advance_job))
        .route("/jobs/status", get(job_status))
}
