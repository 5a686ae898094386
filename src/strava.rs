//! Thin Strava API client: token refresh, paginated activity listing, and
//! single-activity fetch. No retries here — retry policy, if any, belongs to
//! the caller's network layer.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{Config, RawActivity};

// ---

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchange the long-lived refresh token for a fresh access token.
pub async fn get_access_token(client: &Client, cfg: &Config) -> Result<String> {
    // ---
    debug!("requesting access token from {}", cfg.token_url);

    let response = client
        .post(&cfg.token_url)
        .query(&[
            ("client_id", cfg.client_id.as_str()),
            ("client_secret", cfg.client_secret.as_str()),
            ("refresh_token", cfg.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .context("token request failed")?
        .error_for_status()
        .context("token endpoint returned an error status")?;

    let token: TokenResponse = response
        .json()
        .await
        .context("token response was not valid JSON")?;

    debug!("access token received");
    Ok(token.access_token)
}

/// Fetch the athlete's activities page by page.
///
/// Stops on the first empty or short page, or at the configured page safety
/// limit. Individual records that fail to decode are logged and skipped so
/// one malformed element cannot sink a whole bulk sync.
pub async fn fetch_activities(
    client: &Client,
    access_token: &str,
    cfg: &Config,
) -> Result<Vec<RawActivity>> {
    // ---
    let url = format!("{}/athlete/activities", cfg.api_url);
    let mut all_activities = Vec::new();

    for page in 1..=cfg.api_max_pages {
        debug!("fetching page {} from {}", page, url);

        let items: Vec<serde_json::Value> = client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("per_page", cfg.api_per_page), ("page", page)])
            .send()
            .await
            .with_context(|| format!("activities request failed on page {page}"))?
            .error_for_status()
            .with_context(|| format!("activities endpoint errored on page {page}"))?
            .json()
            .await
            .with_context(|| format!("activities page {page} was not valid JSON"))?;

        if items.is_empty() {
            break;
        }

        let page_len = items.len();
        for (i, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<RawActivity>(item) {
                Ok(activity) => all_activities.push(activity),
                Err(e) => debug!("skipping undecodable item {} on page {}: {}", i, page, e),
            }
        }

        if (page_len as u32) < cfg.api_per_page {
            break;
        }
        if page == cfg.api_max_pages {
            debug!(
                "hit page limit of {}, stopping pagination with {} records",
                cfg.api_max_pages,
                all_activities.len()
            );
        }
    }

    if all_activities.is_empty() {
        warn!("no activities returned by the API");
    } else {
        info!("fetched {} activities", all_activities.len());
    }
    Ok(all_activities)
}

/// Fetch one activity by id.
///
/// A non-success status is soft-failed to `Ok(None)` — a webhook for an
/// activity the athlete has since hidden or deleted is routine, not an error.
pub async fn fetch_single_activity(
    client: &Client,
    access_token: &str,
    activity_id: i64,
    cfg: &Config,
) -> Result<Option<RawActivity>> {
    // ---
    let url = format!("{}/activities/{}", cfg.api_url, activity_id);

    let response = client
        .get(&url)
        .bearer_auth(access_token)
        .send()
        .await
        .with_context(|| format!("request for activity {activity_id} failed"))?;

    if !response.status().is_success() {
        warn!(
            "error fetching activity {}: status {}",
            activity_id,
            response.status()
        );
        return Ok(None);
    }

    let activity = response
        .json::<RawActivity>()
        .await
        .with_context(|| format!("activity {activity_id} response was not valid JSON"))?;
    Ok(Some(activity))
}
