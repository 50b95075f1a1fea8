// crates/server/src/routes/health.rs
//! Liveness plus a lock-free view of the job slot.
//!
//! A poller can tell from one call whether the server is up and whether a
//! job currently occupies the slot. An unreadable status record still
//! answers 200, with `status: "degraded"` and no job fields.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use batchwright_core::JobState;
use serde::Serialize;
use ts_rs::TS;

use crate::state::AppState;

#[derive(Debug, Serialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the status record cannot be read.
    pub status: String,
    pub version: String,
    #[ts(type = "number")]
    pub uptime_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_state: Option<JobState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (status, job_state, job_id) = match state.engine.snapshot() {
        Ok(snapshot) => (
            "ok",
            Some(snapshot.state()),
            snapshot.status().map(|s| s.job_id.clone()),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "Health check could not read the job status");
            ("degraded", None, None)
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        job_state,
        job_id,
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}
