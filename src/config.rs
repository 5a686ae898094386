//! Configuration loader for the `fitsync` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Parse an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Strava OAuth application client id.
    pub client_id: String,

    /// Strava OAuth application client secret.
    pub client_secret: String,

    /// Long-lived refresh token used to mint access tokens.
    pub refresh_token: String,

    /// Strava API base URL.
    pub api_url: String,

    /// Strava OAuth token endpoint.
    pub token_url: String,

    /// Activities requested per page during bulk fetch.
    pub api_per_page: u32,

    /// Maximum number of API pages to fetch (safety limit).
    pub api_max_pages: u32,

    /// Token expected in webhook subscription verification requests.
    pub webhook_verify_token: String,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `STRAVA_CLIENT_ID` / `STRAVA_CLIENT_SECRET` / `STRAVA_REFRESH_TOKEN`
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `STRAVA_API_URL` – API base (default: `https://www.strava.com/api/v3`)
/// - `STRAVA_TOKEN_URL` – OAuth endpoint (default: `https://www.strava.com/oauth/token`)
/// - `API_PER_PAGE` – activities per page (default: 200)
/// - `API_MAX_PAGES` – max API pages to fetch (default: 100)
/// - `WEBHOOK_VERIFY_TOKEN` – webhook verification token
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let client_id = require_env!("STRAVA_CLIENT_ID");
    let client_secret = require_env!("STRAVA_CLIENT_SECRET");
    let refresh_token = require_env!("STRAVA_REFRESH_TOKEN");

    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let api_per_page = parse_env_u32!("API_PER_PAGE", 200);
    let api_max_pages = parse_env_u32!("API_MAX_PAGES", 100);

    let api_url = env_or!("STRAVA_API_URL", "https://www.strava.com/api/v3");
    let token_url = env_or!("STRAVA_TOKEN_URL", "https://www.strava.com/oauth/token");
    let webhook_verify_token = env_or!("WEBHOOK_VERIFY_TOKEN", "my_verification_token");

    Ok(Config {
        db_url,
        db_pool_max,
        client_id,
        client_secret,
        refresh_token,
        api_url,
        token_url,
        api_per_page,
        api_max_pages,
        webhook_verify_token,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords and API secrets
    /// while showing all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        // Mask the password in the database URL for security
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL     : {}", masked_db_url);
        tracing::info!("  STRAVA_CLIENT_ID : {}", self.client_id);
        tracing::info!("  STRAVA_API_URL   : {}", self.api_url);
        tracing::info!("  STRAVA_TOKEN_URL : {}", self.token_url);
        tracing::info!("  DB_POOL_MAX      : {}", self.db_pool_max);
        tracing::info!("  API_PER_PAGE     : {}", self.api_per_page);
        tracing::info!("  API_MAX_PAGES    : {}", self.api_max_pages);
    }
}
