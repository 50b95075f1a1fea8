// crates/server/src/lib.rs
//! Batchwright server library.
//!
//! Axum HTTP front end for the job engine plus the HTTP client the CLI uses
//! to drive a running server.

pub mod cli;
pub mod client;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use client::{ClientError, HttpEndpoint};
pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - Job, record and health routes under `/api`
/// - The Prometheus scrape endpoint at `/metrics`
/// - CORS (allows any origin) and request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
