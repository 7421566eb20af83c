//! txt2img entry points.
//!
//! Both entry points share one sequence: build the request, offer it to the
//! script hooks, fall back to the engine, close the request, clear progress.
//! The upscale variant additionally validates and patches the gallery the
//! front end sent back.

use std::sync::Arc;

use serde_json::Value;
use webui_core::error::CoreError;
use webui_core::gallery::{image_from_entry, AllowedPaths, GalleryEntry};
use webui_core::html::plaintext_to_html;
use webui_core::images::OutputImage;
use webui_core::infotext::parse_generation_parameters;
use webui_core::options::Options;
use webui_core::processed::GenerationResult;
use webui_core::progress::ProgressTracker;
use webui_core::request::{build_txt2img_request, Closing, GenerationRequest, Txt2ImgArgs};

use crate::engine::ProcessingEngine;
use crate::error::PipelineError;
use crate::scripts::ScriptRunner;

/// Override key that stops the engine from saving the pre-hires image.
const SAVE_BEFORE_HIGHRES_FIX: &str = "save_images_before_highres_fix";

/// Who asked for a generation, and under which settings.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub id_task: &'a str,
    pub user: Option<&'a str>,
    pub opts: &'a Options,
}

/// The gallery state the upscale path patches.
#[derive(Debug, Clone)]
pub struct UpscaleSelection<'a> {
    pub gallery: &'a [GalleryEntry],
    /// Index of the image to regenerate. Signed because it comes straight
    /// from the front end.
    pub gallery_index: i64,
    /// `generation_info` JSON returned with the gallery.
    pub generation_info: &'a str,
}

/// What the front end receives: images, metadata JSON, info HTML and
/// comments HTML.
#[derive(Debug, Clone, PartialEq)]
pub struct Txt2ImgOutput {
    pub images: Vec<OutputImage>,
    pub generation_info: String,
    pub info_html: String,
    pub comments_html: String,
}

/// txt2img orchestrator.
#[derive(Clone)]
pub struct Txt2Img {
    engine: Arc<dyn ProcessingEngine>,
    scripts: Arc<ScriptRunner>,
    progress: Arc<ProgressTracker>,
}

impl Txt2Img {
    pub fn new(
        engine: Arc<dyn ProcessingEngine>,
        scripts: Arc<ScriptRunner>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            engine,
            scripts,
            progress,
        }
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Run one generation from the txt2img form.
    pub async fn txt2img(
        &self,
        ctx: RequestContext<'_>,
        args: Txt2ImgArgs,
    ) -> Result<Txt2ImgOutput, PipelineError> {
        let request = build_txt2img_request(ctx.id_task, ctx.user, args, ctx.opts, false)?;

        let mut processed = self.process(request).await?;

        let generation_info = processed.js()?;
        if ctx.opts.samples_log_stdout {
            tracing::info!(target: "webui::console", "{generation_info}");
        }

        if ctx.opts.do_not_show_images {
            processed.images.clear();
        }

        Ok(Txt2ImgOutput {
            images: processed.images,
            generation_info,
            info_html: plaintext_to_html(&processed.info, None),
            comments_html: plaintext_to_html(&processed.comments, Some("comments")),
        })
    }

    /// Regenerate the selected gallery image with the high-res pass enabled,
    /// reusing its seeds. All other gallery slots come back as placeholders
    /// pointing at their stored files.
    pub async fn txt2img_upscale(
        &self,
        ctx: RequestContext<'_>,
        selection: UpscaleSelection<'_>,
        args: Txt2ImgArgs,
        allowed: &AllowedPaths,
    ) -> Result<Txt2ImgOutput, PipelineError> {
        let index = validate_selection(&selection)?;
        let mut geninfo = parse_generation_info(selection.generation_info, index)?;

        let mut request = build_txt2img_request(ctx.id_task, ctx.user, args, ctx.opts, true)?;
        request.batch_size = 1;
        request.n_iter = 1;
        request.txt2img_upscale = true;
        request
            .override_settings
            .insert(SAVE_BEFORE_HIGHRES_FIX.to_string(), Value::Bool(false));

        request.firstpass_image = Some(image_from_entry(&selection.gallery[index], allowed)?);

        let parameters = parse_generation_parameters(infotext_at(&geninfo, index));
        request.seed = parameters.seed("Seed");
        request.subseed = parameters.seed("Variation seed");

        tracing::info!(
            id_task = %ctx.id_task,
            index,
            seed = request.seed,
            subseed = request.subseed,
            "Upscaling gallery image",
        );

        let processed = self.process(request).await?;

        splice_infotexts(&mut geninfo, index, &processed);

        let mut new_gallery = Vec::with_capacity(selection.gallery.len());
        for (i, entry) in selection.gallery.iter().enumerate() {
            if i == index {
                new_gallery.extend(processed.images.iter().cloned());
            } else {
                // Presence of a stored path was checked up front.
                let path = entry.saved_path().unwrap_or_default();
                new_gallery.push(OutputImage::placeholder(path));
            }
        }

        Ok(Txt2ImgOutput {
            images: new_gallery,
            generation_info: serde_json::to_string(&geninfo)?,
            info_html: plaintext_to_html(&processed.info, None),
            comments_html: plaintext_to_html(&processed.comments, Some("comments")),
        })
    }

    /// Hooks first, engine otherwise. The request is closed and progress
    /// cleared on every exit path.
    async fn process(&self, request: GenerationRequest) -> Result<GenerationResult, PipelineError> {
        let result = {
            let mut request = Closing::new(request);
            self.run_scripts_or_engine(&mut request).await
        };
        self.progress.clear();
        result
    }

    async fn run_scripts_or_engine(
        &self,
        request: &mut GenerationRequest,
    ) -> Result<GenerationResult, PipelineError> {
        if let Some(processed) = self.scripts.run(request).await? {
            return Ok(processed);
        }
        self.engine.process_images(request, &self.progress).await
    }
}

/// Check the gallery preconditions and return the index as `usize`.
fn validate_selection(selection: &UpscaleSelection<'_>) -> Result<usize, CoreError> {
    if selection.gallery.is_empty() {
        return Err(CoreError::Validation("No image to upscale".to_string()));
    }

    let index = usize::try_from(selection.gallery_index)
        .ok()
        .filter(|i| *i < selection.gallery.len())
        .ok_or_else(|| {
            CoreError::Validation(format!("Bad image index: {}", selection.gallery_index))
        })?;

    if let Some(missing) = selection
        .gallery
        .iter()
        .enumerate()
        .find(|(i, entry)| *i != index && entry.saved_path().is_none())
        .map(|(i, _)| i)
    {
        return Err(CoreError::Validation(format!(
            "Gallery image {missing} has no stored file to reference"
        )));
    }

    Ok(index)
}

/// Parse the prior `generation_info` and make sure it has an infotext for
/// `index`.
fn parse_generation_info(raw: &str, index: usize) -> Result<Value, PipelineError> {
    let geninfo: Value = serde_json::from_str(raw)?;
    let count = geninfo
        .get("infotexts")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    if index >= count {
        return Err(CoreError::Validation(format!(
            "Generation info has no infotext for image {index}"
        ))
        .into());
    }
    Ok(geninfo)
}

fn infotext_at(geninfo: &Value, index: usize) -> &str {
    geninfo["infotexts"][index].as_str().unwrap_or_default()
}

/// Replace the selected infotext with the new ones, then pin the selected
/// slot to the new aggregate info.
fn splice_infotexts(geninfo: &mut Value, index: usize, processed: &GenerationResult) {
    let Some(infotexts) = geninfo.get_mut("infotexts").and_then(Value::as_array_mut) else {
        return;
    };
    let replacement = processed
        .infotexts()
        .iter()
        .map(|text| Value::String(text.clone()));
    infotexts.splice(index..=index, replacement);

    match infotexts.get_mut(index) {
        Some(slot) => *slot = Value::String(processed.info.clone()),
        None => infotexts.push(Value::String(processed.info.clone())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn result_with(infotexts: &[&str], info: &str) -> GenerationResult {
        let mut result = GenerationResult {
            info: info.to_string(),
            ..GenerationResult::default()
        };
        result.generation.infotexts = infotexts.iter().map(|s| s.to_string()).collect();
        result
    }

    #[test]
    fn splice_replaces_only_selected_slot() {
        let mut geninfo = json!({"infotexts": ["a", "b", "c"], "prompt": "p"});
        splice_infotexts(&mut geninfo, 1, &result_with(&["B"], "B"));
        assert_eq!(geninfo["infotexts"], json!(["a", "B", "c"]));
        assert_eq!(geninfo["prompt"], "p");
    }

    #[test]
    fn splice_pins_slot_to_info() {
        let mut geninfo = json!({"infotexts": ["a", "b"]});
        splice_infotexts(&mut geninfo, 0, &result_with(&["x"], "info"));
        assert_eq!(geninfo["infotexts"], json!(["info", "b"]));
    }

    #[test]
    fn splice_with_no_new_infotexts_keeps_alignment() {
        let mut geninfo = json!({"infotexts": ["a", "b"]});
        splice_infotexts(&mut geninfo, 1, &result_with(&[], "info"));
        assert_eq!(geninfo["infotexts"], json!(["a", "info"]));
    }

    #[test]
    fn generation_info_needs_selected_infotext() {
        assert!(parse_generation_info(r#"{"infotexts": ["a"]}"#, 0).is_ok());
        assert!(matches!(
            parse_generation_info(r#"{"infotexts": ["a"]}"#, 1),
            Err(PipelineError::Core(CoreError::Validation(_)))
        ));
        assert!(matches!(
            parse_generation_info("not json", 0),
            Err(PipelineError::Json(_))
        ));
    }
}
