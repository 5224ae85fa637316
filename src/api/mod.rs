//! API module for all HTTP handlers

pub mod health;
pub mod webhook;

use axum::{Router, routing};

use crate::SharedState;

// Re-export handlers
pub use health::health;
pub use webhook::{Outcome, handle_webhook};

/// Webhook endpoint on `/` (POST or PUT) and a health check on `/health`.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::post(handle_webhook).put(handle_webhook))
        .route("/health", routing::get(health))
        .with_state(state)
}
