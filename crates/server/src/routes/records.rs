// crates/server/src/routes/records.rs
//! Read-only views over the record store written by import jobs.
//!
//! - GET /records/counts - Row counts for every table
//! - GET /records/{type}/count - Row count for one import type

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use batchwright_core::JobType;
use batchwright_db::RecordCounts;
use serde::Serialize;
use ts_rs::TS;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct RecordCountResponse {
    pub job_type: JobType,
    #[ts(type = "number")]
    pub count: i64,
}

/// GET /api/records/counts
async fn all_counts(State(state): State<Arc<AppState>>) -> ApiResult<Json<RecordCounts>> {
    Ok(Json(state.db.record_counts().await?))
}

/// GET /api/records/{type}/count
async fn count_for_type(
    State(state): State<Arc<AppState>>,
    Path(raw_type): Path<String>,
) -> ApiResult<Json<RecordCountResponse>> {
    let job_type: JobType = raw_type
        .parse()
        .map_err(|e: batchwright_core::UnknownJobType| ApiError::BadRequest(e.to_string()))?;
    let count = state
        .db
        .count_records(job_type)
        .await?
        .ok_or_else(|| ApiError::BadRequest(format!("{job_type} jobs do not store records")))?;
    Ok(Json(RecordCountResponse { job_type, count }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/records/counts", get(all_counts))
        .route("/records/{job_type}/count", get(count_for_type))
}
