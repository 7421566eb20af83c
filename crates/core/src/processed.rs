//! Output of one generation call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::images::OutputImage;
use crate::request::GenerationRequest;
use crate::types::Seed;

/// Metadata describing a finished generation, serialized for the front end.
///
/// `infotexts` is index-aligned with the returned images.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationInfo {
    pub prompt: String,
    pub all_prompts: Vec<String>,
    pub negative_prompt: String,
    pub all_negative_prompts: Vec<String>,
    pub seed: Seed,
    pub all_seeds: Vec<Seed>,
    pub subseed: Seed,
    pub all_subseeds: Vec<Seed>,
    pub width: u32,
    pub height: u32,
    pub sampler_name: String,
    pub cfg_scale: f64,
    pub steps: u32,
    pub batch_size: u32,
    pub sd_model_name: Option<String>,
    pub denoising_strength: Option<f64>,
    pub extra_generation_params: Map<String, Value>,
    pub index_of_first_image: usize,
    pub infotexts: Vec<String>,
    pub styles: Vec<String>,
    pub job_timestamp: String,
    pub clip_skip: i64,
}

/// Images plus metadata returned by the engine or a script hook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResult {
    pub images: Vec<OutputImage>,
    /// Infotext of the first image.
    pub info: String,
    pub comments: String,
    pub generation: GenerationInfo,
}

impl GenerationResult {
    /// Result whose metadata is filled in from the request that produced it.
    ///
    /// `infotexts` must be index-aligned with `images`; the first one becomes
    /// `info`.
    pub fn for_request(
        request: &GenerationRequest,
        images: Vec<OutputImage>,
        infotexts: Vec<String>,
    ) -> Self {
        let generation = GenerationInfo {
            prompt: request.prompt.clone(),
            all_prompts: vec![request.prompt.clone(); images.len().max(1)],
            negative_prompt: request.negative_prompt.clone(),
            all_negative_prompts: vec![request.negative_prompt.clone(); images.len().max(1)],
            seed: request.seed,
            all_seeds: vec![request.seed; images.len().max(1)],
            subseed: request.subseed,
            all_subseeds: vec![request.subseed; images.len().max(1)],
            width: request.width,
            height: request.height,
            sampler_name: request.sampler_name.clone(),
            cfg_scale: request.cfg_scale,
            steps: request.steps,
            batch_size: request.batch_size,
            denoising_strength: request.enable_hr.then_some(request.hr.denoising_strength),
            infotexts: infotexts.clone(),
            styles: request.styles.clone(),
            job_timestamp: chrono::Utc::now().format("%Y%m%d%H%M%S").to_string(),
            ..GenerationInfo::default()
        };

        Self {
            images,
            info: infotexts.first().cloned().unwrap_or_default(),
            comments: String::new(),
            generation,
        }
    }

    /// Per-image infotexts.
    pub fn infotexts(&self) -> &[String] {
        &self.generation.infotexts
    }

    /// JSON string handed to the front end as `generation_info`.
    pub fn js(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.generation)
    }
}
