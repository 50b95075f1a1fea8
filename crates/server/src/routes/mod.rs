//! API route handlers for the batchwright server.

pub mod health;
pub mod jobs;
pub mod metrics;
pub mod records;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET    /api/health - Health check
/// - POST   /api/jobs?type=&name= - Start an import job from the request body
/// - POST   /api/jobs/backup - Start a backup job over a directory
/// - POST   /api/jobs/advance - Process one batch
/// - GET    /api/jobs/status - Current job snapshot
/// - DELETE /api/jobs - Clear the job record and staged files
/// - GET    /api/records/counts - Row counts for every record table
/// - GET    /api/records/{type}/count - Row count for one import type
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", records::router())
        .merge(metrics::router())
        .with_state(state)
}
