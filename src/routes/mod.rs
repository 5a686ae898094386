use axum::Router;
use sqlx::PgPool;

use crate::Config;

mod health;
mod sync;
mod webhook;

// ---

pub fn router(pool: PgPool, config: Config) -> Router {
    // ---
    Router::new()
        .merge(health::router())
        .merge(sync::router())
        .merge(webhook::router())
        .with_state((pool, config))
}
