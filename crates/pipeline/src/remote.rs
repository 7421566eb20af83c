//! Engine backed by a remote diffusion worker.
//!
//! The worker speaks the `/sdapi/v1/txt2img` wire format: the request goes out
//! as JSON, images come back base64-encoded and the generation metadata as a
//! JSON string in `info`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use webui_core::images::OutputImage;
use webui_core::override_settings::OverrideSettings;
use webui_core::processed::{GenerationInfo, GenerationResult};
use webui_core::progress::ProgressTracker;
use webui_core::request::GenerationRequest;
use webui_core::types::Seed;

use crate::engine::ProcessingEngine;
use crate::error::PipelineError;

/// Path of the generation endpoint on the worker.
pub const TXT2IMG_PATH: &str = "/sdapi/v1/txt2img";

/// Body sent to the worker.
#[derive(Debug, Serialize)]
pub struct RemoteTxt2ImgPayload<'a> {
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub styles: &'a [String],
    pub seed: Seed,
    pub subseed: Seed,
    pub sampler_name: &'a str,
    pub batch_size: u32,
    pub n_iter: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub enable_hr: bool,
    pub denoising_strength: f64,
    pub hr_scale: f64,
    pub hr_upscaler: &'a str,
    pub hr_second_pass_steps: u32,
    pub hr_resize_x: u32,
    pub hr_resize_y: u32,
    pub hr_checkpoint_name: Option<&'a str>,
    pub hr_sampler_name: Option<&'a str>,
    pub hr_prompt: &'a str,
    pub hr_negative_prompt: &'a str,
    pub override_settings: &'a OverrideSettings,
    pub script_args: &'a [Value],
    /// Base64 PNG of the first pass when regenerating a single image.
    pub firstpass_image: Option<String>,
    pub send_images: bool,
    pub save_images: bool,
}

impl<'a> RemoteTxt2ImgPayload<'a> {
    pub fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            prompt: &request.prompt,
            negative_prompt: &request.negative_prompt,
            styles: &request.styles,
            seed: request.seed,
            subseed: request.subseed,
            sampler_name: &request.sampler_name,
            batch_size: request.batch_size,
            n_iter: request.n_iter,
            steps: request.steps,
            cfg_scale: request.cfg_scale,
            width: request.width,
            height: request.height,
            enable_hr: request.enable_hr,
            denoising_strength: request.hr.denoising_strength,
            hr_scale: request.hr.scale,
            hr_upscaler: &request.hr.upscaler,
            hr_second_pass_steps: request.hr.second_pass_steps,
            hr_resize_x: request.hr.resize_x,
            hr_resize_y: request.hr.resize_y,
            hr_checkpoint_name: request.hr.checkpoint_name.as_deref(),
            hr_sampler_name: request.hr.sampler_name.as_deref(),
            hr_prompt: &request.hr.prompt,
            hr_negative_prompt: &request.hr.negative_prompt,
            override_settings: &request.override_settings,
            script_args: &request.script_args,
            firstpass_image: request
                .firstpass_image
                .as_ref()
                .map(|image| STANDARD.encode(&image.png)),
            send_images: true,
            save_images: false,
        }
    }
}

/// Body returned by the worker.
#[derive(Debug, Deserialize)]
pub struct RemoteTxt2ImgResponse {
    #[serde(default)]
    pub images: Vec<String>,
    /// JSON-encoded [`GenerationInfo`].
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub comments: Option<String>,
}

impl RemoteTxt2ImgResponse {
    /// Decode images and metadata into a [`GenerationResult`].
    pub fn into_result(self) -> Result<GenerationResult, PipelineError> {
        let images = self
            .images
            .iter()
            .map(|b64| OutputImage::from_base64(b64))
            .collect::<Result<Vec<_>, _>>()?;

        let generation: GenerationInfo = if self.info.trim().is_empty() {
            GenerationInfo::default()
        } else {
            serde_json::from_str(&self.info)?
        };

        Ok(GenerationResult {
            images,
            info: generation.infotexts.first().cloned().unwrap_or_default(),
            comments: self.comments.unwrap_or_default(),
            generation,
        })
    }
}

/// HTTP client for a remote diffusion worker.
pub struct HttpEngine {
    client: reqwest::Client,
    api_url: String,
}

impl HttpEngine {
    /// * `api_url` - Base URL of the worker, e.g. `http://gpu-host:7861`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PipelineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
        Err(PipelineError::Engine {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ProcessingEngine for HttpEngine {
    async fn process_images(
        &self,
        request: &mut GenerationRequest,
        progress: &ProgressTracker,
    ) -> Result<GenerationResult, PipelineError> {
        progress.begin(request.n_iter, request.steps);
        progress.set_textinfo("Waiting for engine");

        tracing::debug!(
            id_task = %request.id_task,
            url = %self.api_url,
            images = request.expected_images(),
            "Submitting generation to remote engine",
        );

        let payload = RemoteTxt2ImgPayload::from_request(request);
        let response = self
            .client
            .post(format!("{}{TXT2IMG_PATH}", self.api_url))
            .json(&payload)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let body: RemoteTxt2ImgResponse = response.json().await?;

        progress.set_textinfo("Decoding images");
        let result = body.into_result()?;

        tracing::info!(
            id_task = %request.id_task,
            images = result.images.len(),
            "Remote engine finished",
        );
        Ok(result)
    }
}
