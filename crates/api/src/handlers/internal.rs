//! Small UI support endpoints.
//!
//! Routes:
//! - `GET /internal/ping`             -- liveness for the front end
//! - `GET /internal/profile-startup`  -- startup timer records
//! - `GET /file?path=...`             -- gallery files from allowed directories

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::state::AppState;
use crate::timer::StartupProfile;

/// GET /internal/ping
pub async fn ping() -> Json<Value> {
    Json(json!({}))
}

/// GET /internal/profile-startup
pub async fn profile_startup(State(state): State<AppState>) -> Json<StartupProfile> {
    Json(state.timer.dump())
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

/// GET /file?path=...
///
/// Only files inside the UI temp dir or a `--gradio-allowed-path` are served.
pub async fn file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> AppResult<impl IntoResponse> {
    let path = state.allowed_paths.resolve(&query.path)?;
    let bytes = tokio::fs::read(&path).await?;

    let content_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };

    Ok(([(CONTENT_TYPE, content_type)], bytes))
}
