//! Programmatic API routes, nested under `/sdapi/v1`.

use axum::routing::{get, post};
use axum::Router;

use crate::config::ServerConfig;
use crate::handlers::sdapi;
use crate::state::AppState;

pub fn router(config: &ServerConfig) -> Router<AppState> {
    let router = Router::new()
        .route("/txt2img", post(sdapi::txt2img))
        .route("/options", get(sdapi::get_options));

    if !config.api_server_stop {
        return router;
    }
    router
        .route("/server-stop", post(sdapi::server_stop))
        .route("/server-restart", post(sdapi::server_restart))
        .route("/server-kill", post(sdapi::server_kill))
}
