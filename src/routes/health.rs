// src/routes/health.rs
//! Root and health check endpoints for the fitsync backend.
//!
//! `/health` is used by container orchestrators and CI pipelines to verify
//! that the service is running and able to respond to HTTP requests; `/` is
//! a friendly landing route for webhook subscription setup. This is a
//! sibling module in the `routes` directory following the Explicit Module
//! Boundary Pattern (EMBP):
//! - Internal to this file: endpoint handler(s) and related types
//! - Exports to the gateway (`mod.rs`): a subrouter with both routes
//!
//! Neither endpoint touches the database or the Strava API.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// JSON response body for the `/` endpoint.
#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

/// Handle `GET /`.
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Welcome to the fitsync webhook server!",
    })
}

/// Handle `GET /health`.
///
/// Returns a static JSON object indicating the API is reachable and
/// functioning.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Create a subrouter containing the `/` and `/health` routes.
///
/// Generic over the application state so it merges cleanly with the gateway
/// router, regardless of the state type (e.g., `(PgPool, Config)`).
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}
