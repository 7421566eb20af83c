//! UI routes.
//!
//! ```text
//! POST /internal/txt2img
//! POST /internal/txt2img/upscale
//! POST /internal/progress
//! GET  /internal/ping
//! GET  /internal/profile-startup
//! GET  /file
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{internal, progress, txt2img};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/internal/txt2img", post(txt2img::txt2img))
        .route("/internal/txt2img/upscale", post(txt2img::txt2img_upscale))
        .route("/internal/progress", post(progress::progress))
        .route("/internal/ping", get(internal::ping))
        .route("/internal/profile-startup", get(internal::profile_startup))
        .route("/file", get(internal::file))
}
