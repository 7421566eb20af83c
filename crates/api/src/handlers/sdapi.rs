//! Programmatic API, mounted at `/sdapi/v1` with `--api`.
//!
//! Routes:
//! - `POST /txt2img`         -- generate, images returned as base64 PNG
//! - `GET  /options`         -- current options
//! - `POST /server-stop`     -- (`--api-server-stop`) stop the server
//! - `POST /server-restart`  -- (`--api-server-stop`) restart the server
//! - `POST /server-kill`     -- (`--api-server-stop`) exit the process now

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use serde_json::{Map, Value};
use webui_core::request::Txt2ImgArgs;
use webui_pipeline::txt2img::RequestContext;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::RequestUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ApiTxt2ImgResponse {
    /// Base64 PNG, no data URL header.
    pub images: Vec<String>,
    pub parameters: Txt2ImgArgs,
    /// `generation_info` JSON string.
    pub info: String,
}

/// POST /sdapi/v1/txt2img
pub async fn txt2img(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    Json(args): Json<Txt2ImgArgs>,
) -> AppResult<Json<ApiTxt2ImgResponse>> {
    let id_task = format!("task({})", uuid::Uuid::new_v4());
    let opts = state.options.read().await.clone();
    let ctx = RequestContext {
        id_task: &id_task,
        user: user.as_deref(),
        opts: &opts,
    };

    let parameters = args.clone();
    let output = state
        .queue
        .run(&id_task, async {
            Ok::<_, AppError>(state.txt2img.txt2img(ctx, args).await?)
        })
        .await?;

    Ok(Json(ApiTxt2ImgResponse {
        images: output
            .images
            .iter()
            .map(|image| STANDARD.encode(&image.png))
            .collect(),
        parameters,
        info: output.generation_info,
    }))
}

/// GET /sdapi/v1/options
pub async fn get_options(State(state): State<AppState>) -> Json<Map<String, Value>> {
    Json(state.options.read().await.to_map())
}

/// POST /sdapi/v1/server-stop
pub async fn server_stop(State(state): State<AppState>) -> StatusCode {
    state.commands.request("stop");
    StatusCode::ACCEPTED
}

/// POST /sdapi/v1/server-restart
pub async fn server_restart(State(state): State<AppState>) -> StatusCode {
    state.commands.request("restart");
    StatusCode::ACCEPTED
}

/// POST /sdapi/v1/server-kill
///
/// Exits without closing the server, after giving the response a moment to
/// go out.
pub async fn server_kill() -> StatusCode {
    tracing::warn!("Kill requested, exiting");
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::process::exit(0);
    });
    StatusCode::ACCEPTED
}
