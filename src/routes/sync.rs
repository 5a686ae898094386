//! Batch sync pipeline endpoint.
//!
//! `POST /sync` runs the full bulk path in one request: refresh the access
//! token, fetch every activity page, transform, optionally export a CSV
//! snapshot, then load into the `activities` table with composite-key
//! deduplication. The response reports how many records were fetched and how
//! many rows were actually written (zero written is a normal outcome when
//! nothing new happened).

use std::path::PathBuf;

use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::post, Json,
    Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::{export, load, strava, transform, Config};

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new().route("/sync", post(handler))
}

#[derive(Deserialize)]
struct SyncQuery {
    /// Optional path for a CSV snapshot of the transformed batch.
    export: Option<PathBuf>,
}

#[derive(Serialize)]
struct SyncResponse {
    fetched: usize,
    written: u64,
}

async fn handler(
    Query(params): Query<SyncQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> impl IntoResponse {
    // ---
    info!("POST /sync - starting batch pipeline");

    // Step 1: authenticate and fetch from the Strava API
    let client = reqwest::Client::new();
    let access_token = match strava::get_access_token(&client, &config).await {
        Ok(token) => token,
        Err(e) => {
            error!("failed to get access token: {:#}", e);
            return (StatusCode::BAD_GATEWAY, Json("Failed to authenticate")).into_response();
        }
    };

    let raw_activities = match strava::fetch_activities(&client, &access_token, &config).await {
        Ok(activities) => activities,
        Err(e) => {
            error!("failed to fetch activities: {:#}", e);
            return (StatusCode::BAD_GATEWAY, Json("Failed to fetch activities")).into_response();
        }
    };

    // Step 2: transform
    let normalized = match transform::transform(&raw_activities) {
        Ok(batch) => batch,
        Err(e) => {
            error!("transform failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, Json("Transform failed")).into_response();
        }
    };

    // Step 3: optional CSV snapshot; failure here never sinks the load
    if let Some(path) = params.export {
        if let Err(e) = export::save_to_csv(&normalized, &path) {
            warn!("CSV export to {} failed: {:#}", path.display(), e);
        }
    }

    // Step 4: deduplicating load
    let written = match load::load(
        &pool,
        &normalized,
        load::ACTIVITIES_TABLE,
        Some(load::ACTIVITIES_KEY),
    )
    .await
    {
        Ok(count) => count,
        Err(e) => {
            error!("load failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, Json("Load failed")).into_response();
        }
    };

    info!(
        "batch pipeline complete: fetched {}, wrote {}",
        normalized.len(),
        written
    );
    (
        StatusCode::OK,
        Json(SyncResponse {
            fetched: normalized.len(),
            written,
        }),
    )
        .into_response()
}
