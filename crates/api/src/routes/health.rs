use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::config::ServerMode;
use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// `"ui"` or `"api"`.
    pub mode: &'static str,
    /// Requests waiting for the GPU.
    pub queued: usize,
}

/// GET /health -- returns service status and queue depth.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mode: match state.config.mode {
            ServerMode::Ui => "ui",
            ServerMode::ApiOnly => "api",
        },
        queued: state.queue.tasks().queued_len(),
    })
}

/// Mount health check routes (not behind basic auth).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
