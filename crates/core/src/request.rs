//! Generation requests and the builder that assembles them from UI fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::images::OutputImage;
use crate::options::Options;
use crate::override_settings::{create_override_settings_dict, OverrideSettings};
use crate::types::{Seed, RANDOM_SEED};

/// UI placeholder meaning "second pass uses the first-pass checkpoint".
pub const USE_SAME_CHECKPOINT: &str = "Use same checkpoint";
/// UI placeholder meaning "second pass uses the first-pass sampler".
pub const USE_SAME_SAMPLER: &str = "Use same sampler";

/// Raw txt2img form fields as submitted by the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Txt2ImgArgs {
    pub prompt: String,
    pub negative_prompt: String,
    pub prompt_styles: Vec<String>,
    pub steps: u32,
    pub sampler_name: String,
    pub n_iter: u32,
    pub batch_size: u32,
    pub cfg_scale: f64,
    pub height: u32,
    pub width: u32,
    pub enable_hr: bool,
    pub denoising_strength: f64,
    pub hr_scale: f64,
    pub hr_upscaler: String,
    pub hr_second_pass_steps: u32,
    pub hr_resize_x: u32,
    pub hr_resize_y: u32,
    pub hr_checkpoint_name: String,
    pub hr_sampler_name: String,
    pub hr_prompt: String,
    pub hr_negative_prompt: String,
    pub override_settings_texts: Vec<String>,
    /// Extension arguments, passed through untouched.
    pub script_args: Vec<Value>,
}

impl Default for Txt2ImgArgs {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            prompt_styles: Vec::new(),
            steps: 20,
            sampler_name: "DPM++ 2M".to_string(),
            n_iter: 1,
            batch_size: 1,
            cfg_scale: 7.0,
            height: 512,
            width: 512,
            enable_hr: false,
            denoising_strength: 0.7,
            hr_scale: 2.0,
            hr_upscaler: "Latent".to_string(),
            hr_second_pass_steps: 0,
            hr_resize_x: 0,
            hr_resize_y: 0,
            hr_checkpoint_name: USE_SAME_CHECKPOINT.to_string(),
            hr_sampler_name: USE_SAME_SAMPLER.to_string(),
            hr_prompt: String::new(),
            hr_negative_prompt: String::new(),
            override_settings_texts: Vec::new(),
            script_args: Vec::new(),
        }
    }
}

/// Second-pass ("hires fix") parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighResParams {
    pub denoising_strength: f64,
    pub scale: f64,
    pub upscaler: String,
    /// 0 means "same as first pass".
    pub second_pass_steps: u32,
    pub resize_x: u32,
    pub resize_y: u32,
    /// `None` inherits the first-pass checkpoint.
    pub checkpoint_name: Option<String>,
    /// `None` inherits the first-pass sampler.
    pub sampler_name: Option<String>,
    pub prompt: String,
    pub negative_prompt: String,
}

impl Default for HighResParams {
    fn default() -> Self {
        Self {
            denoising_strength: 0.7,
            scale: 2.0,
            upscaler: "Latent".to_string(),
            second_pass_steps: 0,
            resize_x: 0,
            resize_y: 0,
            checkpoint_name: None,
            sampler_name: None,
            prompt: String::new(),
            negative_prompt: String::new(),
        }
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Handles a request holds on to until it is closed.
///
/// Engines and hooks register a release callback for anything they acquire
/// on behalf of a request; closing the request runs them newest first.
#[derive(Default)]
pub struct ResourceSet {
    entries: Vec<(String, ReleaseFn)>,
}

impl ResourceSet {
    pub fn register(
        &mut self,
        name: impl Into<String>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) {
        self.entries.push((name.into(), Box::new(release)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn release_all(&mut self) {
        while let Some((name, release)) = self.entries.pop() {
            tracing::debug!(resource = %name, "Releasing request resource");
            release();
        }
    }
}

impl std::fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}

/// Something that owns resources which must be released when its scope ends.
pub trait Close {
    fn close(&mut self);
}

impl<T: Close + ?Sized> Close for &mut T {
    fn close(&mut self) {
        (**self).close();
    }
}

/// Scope guard that closes its value when dropped, on success and on error.
#[derive(Debug)]
pub struct Closing<T: Close> {
    inner: T,
}

impl<T: Close> Closing<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Close> std::ops::Deref for Closing<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Close> std::ops::DerefMut for Closing<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Close> Drop for Closing<T> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// A fully populated txt2img generation request.
#[derive(Debug, Serialize)]
pub struct GenerationRequest {
    pub id_task: String,
    pub user: Option<String>,
    pub outpath_samples: String,
    pub outpath_grids: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub styles: Vec<String>,
    pub sampler_name: String,
    pub batch_size: u32,
    pub n_iter: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub enable_hr: bool,
    pub hr: HighResParams,
    pub override_settings: OverrideSettings,
    pub seed: Seed,
    pub subseed: Seed,
    /// Set when regenerating a single gallery image at high resolution.
    pub txt2img_upscale: bool,
    #[serde(skip)]
    pub firstpass_image: Option<OutputImage>,
    pub script_args: Vec<Value>,
    #[serde(skip)]
    pub resources: ResourceSet,
    #[serde(skip)]
    closed: bool,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            id_task: String::new(),
            user: None,
            outpath_samples: String::new(),
            outpath_grids: String::new(),
            prompt: String::new(),
            negative_prompt: String::new(),
            styles: Vec::new(),
            sampler_name: String::new(),
            batch_size: 1,
            n_iter: 1,
            steps: 20,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            enable_hr: false,
            hr: HighResParams::default(),
            override_settings: OverrideSettings::new(),
            seed: RANDOM_SEED,
            subseed: RANDOM_SEED,
            txt2img_upscale: false,
            firstpass_image: None,
            script_args: Vec::new(),
            resources: ResourceSet::default(),
            closed: false,
        }
    }
}

impl GenerationRequest {
    /// Number of images the engine is expected to produce. Saturates
    /// instead of overflowing.
    pub fn expected_images(&self) -> u32 {
        self.batch_size.saturating_mul(self.n_iter)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Close for GenerationRequest {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.resources.release_all();
        self.firstpass_image = None;
        self.closed = true;
    }
}

/// `None` when the UI sent its "same as first pass" placeholder.
fn inherit_unless_set(value: String, sentinel: &str) -> Option<String> {
    if value == sentinel || value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn require_positive(name: &str, value: u32) -> Result<(), CoreError> {
    if value == 0 {
        return Err(CoreError::Validation(format!("{name} must be at least 1")));
    }
    Ok(())
}

/// Assemble a [`GenerationRequest`] from the txt2img form.
///
/// `force_enable_hr` turns the second pass on regardless of the form's
/// toggle; the upscale path uses it.
pub fn build_txt2img_request(
    id_task: &str,
    user: Option<&str>,
    args: Txt2ImgArgs,
    opts: &Options,
    force_enable_hr: bool,
) -> Result<GenerationRequest, CoreError> {
    require_positive("steps", args.steps)?;
    require_positive("batch_size", args.batch_size)?;
    require_positive("n_iter", args.n_iter)?;
    require_positive("width", args.width)?;
    require_positive("height", args.height)?;

    let override_settings = create_override_settings_dict(&args.override_settings_texts, opts)?;

    let enable_hr = force_enable_hr || args.enable_hr;

    if opts.enable_console_prompts {
        tracing::info!(target: "webui::console", id_task, "txt2img: {}", args.prompt);
    }

    Ok(GenerationRequest {
        id_task: id_task.to_string(),
        user: user.map(str::to_string),
        outpath_samples: opts.samples_dir().to_string(),
        outpath_grids: opts.grids_dir().to_string(),
        prompt: args.prompt,
        negative_prompt: args.negative_prompt,
        styles: args.prompt_styles,
        sampler_name: args.sampler_name,
        batch_size: args.batch_size,
        n_iter: args.n_iter,
        steps: args.steps,
        cfg_scale: args.cfg_scale,
        width: args.width,
        height: args.height,
        enable_hr,
        hr: HighResParams {
            denoising_strength: args.denoising_strength,
            scale: args.hr_scale,
            upscaler: args.hr_upscaler,
            second_pass_steps: args.hr_second_pass_steps,
            resize_x: args.hr_resize_x,
            resize_y: args.hr_resize_y,
            checkpoint_name: inherit_unless_set(args.hr_checkpoint_name, USE_SAME_CHECKPOINT),
            sampler_name: inherit_unless_set(args.hr_sampler_name, USE_SAME_SAMPLER),
            prompt: args.hr_prompt,
            negative_prompt: args.hr_negative_prompt,
        },
        override_settings,
        script_args: args.script_args,
        ..GenerationRequest::default()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::*;

    fn cat_args() -> Txt2ImgArgs {
        Txt2ImgArgs {
            prompt: "a cat".to_string(),
            ..Txt2ImgArgs::default()
        }
    }

    #[test]
    fn builds_plain_request() {
        let request =
            build_txt2img_request("task(1)", Some("alice"), cat_args(), &Options::default(), false)
                .unwrap();

        assert_eq!(request.id_task, "task(1)");
        assert_eq!(request.user.as_deref(), Some("alice"));
        assert_eq!(request.prompt, "a cat");
        assert_eq!(request.steps, 20);
        assert!(!request.enable_hr);
        assert_eq!(request.hr, HighResParams::default());
        assert_eq!(request.seed, RANDOM_SEED);
        assert_eq!(request.outpath_samples, "outputs/txt2img-images");
        assert!(!request.txt2img_upscale);
    }

    #[test]
    fn sentinels_become_none() {
        let request =
            build_txt2img_request("t", None, cat_args(), &Options::default(), false).unwrap();
        assert_eq!(request.hr.checkpoint_name, None);
        assert_eq!(request.hr.sampler_name, None);
    }

    #[test]
    fn explicit_hr_overrides_are_kept() {
        let args = Txt2ImgArgs {
            hr_checkpoint_name: "sdxl.safetensors".to_string(),
            hr_sampler_name: "Euler a".to_string(),
            ..cat_args()
        };
        let request = build_txt2img_request("t", None, args, &Options::default(), false).unwrap();
        assert_eq!(request.hr.checkpoint_name.as_deref(), Some("sdxl.safetensors"));
        assert_eq!(request.hr.sampler_name.as_deref(), Some("Euler a"));
    }

    #[test]
    fn force_enable_hr_wins() {
        let args = Txt2ImgArgs {
            enable_hr: false,
            ..cat_args()
        };
        let request = build_txt2img_request("t", None, args, &Options::default(), true).unwrap();
        assert!(request.enable_hr);
    }

    #[test]
    fn override_lines_are_parsed() {
        let args = Txt2ImgArgs {
            override_settings_texts: vec!["Clip skip: 2".to_string()],
            ..cat_args()
        };
        let request = build_txt2img_request("t", None, args, &Options::default(), false).unwrap();
        assert_eq!(request.override_settings["CLIP_stop_at_last_layers"], Value::from(2));
    }

    #[test]
    fn bad_override_fails_validation() {
        let args = Txt2ImgArgs {
            override_settings_texts: vec!["Clip skip".to_string()],
            ..cat_args()
        };
        let err = build_txt2img_request("t", None, args, &Options::default(), false).unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    #[test]
    fn zero_batch_is_rejected() {
        let args = Txt2ImgArgs {
            batch_size: 0,
            ..cat_args()
        };
        let err = build_txt2img_request("t", None, args, &Options::default(), false).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("batch_size"));
    }

    #[test]
    fn console_echo_does_not_change_request() {
        let quiet =
            build_txt2img_request("t", None, cat_args(), &Options::default(), false).unwrap();
        let opts = Options {
            enable_console_prompts: true,
            ..Options::default()
        };
        let loud = build_txt2img_request("t", None, cat_args(), &opts, false).unwrap();
        assert_eq!(
            serde_json::to_value(&quiet).unwrap(),
            serde_json::to_value(&loud).unwrap()
        );
    }

    #[test]
    fn closing_releases_resources_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut request = GenerationRequest::default();
        let counter = Arc::clone(&released);
        request.resources.register("sampler", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        request.firstpass_image = Some(OutputImage::placeholder("x"));

        {
            let guarded = Closing::new(&mut request);
            assert!(!guarded.is_closed());
        }

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(request.is_closed());
        assert!(request.firstpass_image.is_none());

        request.close();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expected_images_saturates_on_huge_batches() {
        let mut request = GenerationRequest::default();
        request.batch_size = u32::MAX;
        request.n_iter = 4;
        assert_eq!(request.expected_images(), u32::MAX);

        request.batch_size = 3;
        request.n_iter = 2;
        assert_eq!(request.expected_images(), 6);
    }
}
