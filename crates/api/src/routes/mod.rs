pub mod health;
pub mod internal;
pub mod sdapi;

use axum::Router;

use crate::config::{ServerConfig, ServerMode};
use crate::state::AppState;

/// Build the route tree behind basic auth (everything but `/health`).
///
/// Route hierarchy:
///
/// ```text
/// /health                                          liveness (no auth)
///
/// /internal/txt2img                                generate from the form (POST)
/// /internal/txt2img/upscale                        upscale one gallery image (POST)
/// /internal/progress                               task progress (POST)
/// /internal/ping                                   ping (GET)
/// /internal/profile-startup                        startup timer (GET)
/// /file?path=...                                   gallery file (GET)
///
/// /sdapi/v1/txt2img                                generate, base64 images (POST)
/// /sdapi/v1/options                                current options (GET)
/// /sdapi/v1/server-stop                            stop (POST, --api-server-stop)
/// /sdapi/v1/server-restart                         restart (POST, --api-server-stop)
/// /sdapi/v1/server-kill                            exit now (POST, --api-server-stop)
/// ```
///
/// UI routes are only mounted outside API-only mode, `/sdapi/v1` only with
/// `--api` or `--nowebui`.
pub fn app_routes(config: &ServerConfig) -> Router<AppState> {
    let mut router = Router::new();
    if config.mode == ServerMode::Ui {
        router = router.merge(internal::router());
    }
    if config.api {
        router = router.nest("/sdapi/v1", sdapi::router(config));
    }
    router
}
