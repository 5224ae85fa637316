//! Health check endpoint

use axum::{Json, extract::State as AxumState};
use serde_json::{Value, json};

use crate::SharedState;

/// GET /health - server identity, uptime and configured triggers
pub async fn health(AxumState(state): AxumState<SharedState>) -> Json<Value> {
    let triggers: Vec<Value> = state
        .config
        .triggers
        .iter()
        .map(|t| {
            json!({
                "event": t.event,
                "job": t.job,
                "branches": t.branches,
                "states": t.states,
            })
        })
        .collect();

    Json(json!({
        "name": "build_pipeline",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "repository": state.config.repository.full_name(),
        "started_at": state.started_at,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "triggers": triggers,
    }))
}
