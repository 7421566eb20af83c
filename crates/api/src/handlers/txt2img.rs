//! Handlers for the UI's txt2img form.
//!
//! Routes:
//! - `POST /internal/txt2img`          -- generate from the form
//! - `POST /internal/txt2img/upscale`  -- re-run one gallery image with hires fix

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use webui_core::gallery::GalleryEntry;
use webui_core::request::Txt2ImgArgs;
use webui_pipeline::txt2img::RequestContext;
use webui_pipeline::{Txt2ImgOutput, UpscaleSelection};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::RequestUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Txt2ImgBody {
    pub id_task: String,
    #[serde(flatten)]
    pub args: Txt2ImgArgs,
}

#[derive(Debug, Deserialize)]
pub struct Txt2ImgUpscaleBody {
    pub id_task: String,
    #[serde(default)]
    pub gallery: Vec<GalleryEntry>,
    pub gallery_index: i64,
    pub generation_info: String,
    #[serde(flatten)]
    pub args: Txt2ImgArgs,
}

/// Gallery, metadata JSON, info HTML and comments HTML.
#[derive(Debug, Serialize)]
pub struct Txt2ImgResponse {
    pub images: Vec<GalleryEntry>,
    pub generation_info: String,
    pub info_html: String,
    pub comments_html: String,
}

/// POST /internal/txt2img
pub async fn txt2img(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    Json(body): Json<Txt2ImgBody>,
) -> AppResult<Json<Txt2ImgResponse>> {
    let Txt2ImgBody { id_task, args } = body;
    let opts = state.options.read().await.clone();
    let ctx = RequestContext {
        id_task: &id_task,
        user: user.as_deref(),
        opts: &opts,
    };

    let output = state
        .queue
        .run(&id_task, async {
            Ok::<_, AppError>(state.txt2img.txt2img(ctx, args).await?)
        })
        .await?;

    Ok(Json(into_response(&state, output).await?))
}

/// POST /internal/txt2img/upscale
pub async fn txt2img_upscale(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    Json(body): Json<Txt2ImgUpscaleBody>,
) -> AppResult<Json<Txt2ImgResponse>> {
    let Txt2ImgUpscaleBody {
        id_task,
        gallery,
        gallery_index,
        generation_info,
        args,
    } = body;
    let opts = state.options.read().await.clone();
    let ctx = RequestContext {
        id_task: &id_task,
        user: user.as_deref(),
        opts: &opts,
    };
    let selection = UpscaleSelection {
        gallery: &gallery,
        gallery_index,
        generation_info: &generation_info,
    };

    let output = state
        .queue
        .run(&id_task, async {
            Ok::<_, AppError>(state
                .txt2img
                .txt2img_upscale(ctx, selection, args, &state.allowed_paths)
                .await?)
        })
        .await?;

    Ok(Json(into_response(&state, output).await?))
}

/// Store new images in the temp dir so the gallery can reference them.
async fn into_response(state: &AppState, output: Txt2ImgOutput) -> AppResult<Txt2ImgResponse> {
    let mut images = Vec::with_capacity(output.images.len());
    for image in &output.images {
        images.push(state.temp_dir.save_image(image).await?);
    }

    Ok(Txt2ImgResponse {
        images,
        generation_info: output.generation_info,
        info_html: output.info_html,
        comments_html: output.comments_html,
    })
}
