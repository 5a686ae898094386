//! Strava webhook endpoints: subscription verification and event handling.
//!
//! `GET /webhook` answers the subscription handshake; `POST /webhook` takes
//! one push event and drives the single-record pipeline. Events for object
//! types other than `"activity"` and unrecognized aspect types are silently
//! ignored with a 200 — the subscription API treats non-2xx responses as
//! delivery failures and retries, so only genuine processing errors get an
//! error status.

use axum::{
    extract::Query,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::models::WebhookEvent;
use crate::{load, strava, transform, Config};

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new().route("/webhook", get(verify).post(handle_event))
}

/// Subscription verification query, as sent by the Strava callback check.
#[derive(Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    hub_mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    hub_challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    hub_verify_token: Option<String>,
}

/// Handle `GET /webhook`: echo the challenge when the verify token matches.
async fn verify(
    Query(params): Query<VerifyQuery>,
    State((_pool, config)): State<(PgPool, Config)>,
) -> impl IntoResponse {
    // ---
    let (Some(_mode), Some(challenge), Some(token)) =
        (params.hub_mode, params.hub_challenge, params.hub_verify_token)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Missing required parameters"})),
        )
            .into_response();
    };

    if token != config.webhook_verify_token {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"detail": "Invalid verify token"})),
        )
            .into_response();
    }

    (StatusCode::OK, Json(json!({"hub.challenge": challenge}))).into_response()
}

/// Handle `POST /webhook`: dispatch one push event.
async fn handle_event(
    State((pool, config)): State<(PgPool, Config)>,
    Json(event): Json<WebhookEvent>,
) -> impl IntoResponse {
    // ---
    info!(
        "webhook event: {} {} for object {} (owner {:?})",
        event.object_type, event.aspect_type, event.object_id, event.owner_id
    );

    if event.object_type != "activity" {
        debug!("ignoring event for object_type {:?}", event.object_type);
        return (StatusCode::OK, Json(json!({"status": "ignored"}))).into_response();
    }

    let outcome = match event.aspect_type.as_str() {
        "create" => process_created(&pool, &config, event.object_id).await,
        "update" => process_updated(&pool, &config, event.object_id).await,
        "delete" => process_deleted(&pool, event.object_id).await,
        other => {
            debug!("ignoring unrecognized aspect_type {:?}", other);
            Ok(())
        }
    };

    match outcome {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))).into_response(),
        Err(e) => {
            error!(
                "webhook processing failed for activity {}: {:#}",
                event.object_id, e
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error"})),
            )
                .into_response()
        }
    }
}

// ---

/// Create event: fetch, transform, insert if absent.
///
/// A concurrent create for the same id can slip past the existence check;
/// the table's unique constraint settles it and the lost insert is logged,
/// not raised.
async fn process_created(pool: &PgPool, config: &Config, activity_id: i64) -> anyhow::Result<()> {
    // ---
    let client = reqwest::Client::new();
    let access_token = strava::get_access_token(&client, config).await?;

    let Some(raw) = strava::fetch_single_activity(&client, &access_token, activity_id, config).await?
    else {
        warn!("failed to fetch new activity {}, skipping", activity_id);
        return Ok(());
    };

    let mut batch = transform::transform(&[raw])?;
    let record = batch.remove(0);

    if load::activity_exists(pool, activity_id).await? {
        info!("activity {} already exists, skipping insertion", activity_id);
        return Ok(());
    }

    if load::insert_activity(pool, &record).await? {
        info!("stored activity {} in database", activity_id);
    } else {
        info!(
            "activity {} inserted concurrently elsewhere, skipping",
            activity_id
        );
    }
    Ok(())
}

/// Update event: fetch, transform, unconditional update by activity id.
async fn process_updated(pool: &PgPool, config: &Config, activity_id: i64) -> anyhow::Result<()> {
    // ---
    let client = reqwest::Client::new();
    let access_token = strava::get_access_token(&client, config).await?;

    let Some(raw) = strava::fetch_single_activity(&client, &access_token, activity_id, config).await?
    else {
        warn!("failed to fetch updated activity {}, skipping", activity_id);
        return Ok(());
    };

    let mut batch = transform::transform(&[raw])?;
    let record = batch.remove(0);

    let affected = load::update_activity(pool, &record).await?;
    if affected == 0 {
        warn!("update for activity {} affected no rows", activity_id);
    } else {
        info!("updated activity {} in database", activity_id);
    }
    Ok(())
}

/// Delete event: remove by activity id, no transform needed.
async fn process_deleted(pool: &PgPool, activity_id: i64) -> anyhow::Result<()> {
    // ---
    let affected = load::delete_activity(pool, activity_id).await?;
    if affected == 0 {
        warn!("delete for activity {} affected no rows", activity_id);
    } else {
        info!("deleted activity {} from database", activity_id);
    }
    Ok(())
}
