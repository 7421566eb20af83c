//! Persistent settings store (`config.json`).
//!
//! The store is read once at start-up (and again on every in-process
//! restart) and handed to components as an explicit value. Request-time code
//! only ever reads from a snapshot; settings a request wants to change go
//! through its own override map instead.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Default output directory for txt2img samples.
pub const DEFAULT_TXT2IMG_SAMPLES_DIR: &str = "outputs/txt2img-images";
/// Default output directory for txt2img grids.
pub const DEFAULT_TXT2IMG_GRIDS_DIR: &str = "outputs/txt2img-grids";

/// When to open a browser tab after the server starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoLaunchBrowser {
    Disable,
    Local,
    Remote,
}

impl Default for AutoLaunchBrowser {
    fn default() -> Self {
        Self::Local
    }
}

/// Global UI settings.
///
/// The keys this service reads, plus every setting an infotext label can
/// override, are typed; everything else found in the
/// settings file is preserved verbatim in `extra` so override lookups and the
/// options endpoint still see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub outdir_samples: String,
    pub outdir_txt2img_samples: String,
    pub outdir_grids: String,
    pub outdir_txt2img_grids: String,
    /// Echo every prompt to the console.
    pub enable_console_prompts: bool,
    /// Echo generation metadata JSON to the console.
    pub samples_log_stdout: bool,
    /// Return metadata only, no images.
    pub do_not_show_images: bool,
    pub clean_temp_dir_at_start: bool,
    pub auto_launch_browser: AutoLaunchBrowser,
    /// Directory for gallery images; empty means the system temp dir.
    pub temp_dir: String,
    pub save_images_before_highres_fix: bool,
    #[serde(rename = "CLIP_stop_at_last_layers")]
    pub clip_stop_at_last_layers: i64,
    pub sd_model_checkpoint: String,
    pub sd_vae: String,
    pub eta_noise_seed_delta: i64,
    pub eta_ancestral: f64,
    pub eta_ddim: f64,
    pub inpainting_mask_weight: f64,
    pub k_sched_type: String,
    pub sigma_max: f64,
    pub sigma_min: f64,
    pub rho: f64,
    pub initial_noise_multiplier: f64,
    pub s_churn: f64,
    pub s_tmin: f64,
    pub s_tmax: f64,
    pub s_noise: f64,
    pub always_discard_next_to_last_sigma: bool,
    pub uni_pc_variant: String,
    pub uni_pc_skip_type: String,
    pub uni_pc_order: i64,
    pub uni_pc_lower_order_final: bool,
    pub token_merging_ratio: f64,
    pub token_merging_ratio_hr: f64,
    /// Where initial noise is drawn: `GPU`, `CPU` or `NV`.
    pub randn_source: String,
    pub s_min_uncond: f64,
    pub pad_cond_uncond: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            outdir_samples: String::new(),
            outdir_txt2img_samples: DEFAULT_TXT2IMG_SAMPLES_DIR.to_string(),
            outdir_grids: String::new(),
            outdir_txt2img_grids: DEFAULT_TXT2IMG_GRIDS_DIR.to_string(),
            enable_console_prompts: false,
            samples_log_stdout: false,
            do_not_show_images: false,
            clean_temp_dir_at_start: false,
            auto_launch_browser: AutoLaunchBrowser::default(),
            temp_dir: String::new(),
            save_images_before_highres_fix: false,
            clip_stop_at_last_layers: 1,
            sd_model_checkpoint: String::new(),
            sd_vae: "Automatic".to_string(),
            eta_noise_seed_delta: 0,
            eta_ancestral: 1.0,
            eta_ddim: 0.0,
            inpainting_mask_weight: 1.0,
            k_sched_type: "Automatic".to_string(),
            sigma_max: 0.0,
            sigma_min: 0.0,
            rho: 0.0,
            initial_noise_multiplier: 1.0,
            s_churn: 0.0,
            s_tmin: 0.0,
            s_tmax: 0.0,
            s_noise: 1.0,
            always_discard_next_to_last_sigma: false,
            uni_pc_variant: "bh1".to_string(),
            uni_pc_skip_type: "time_uniform".to_string(),
            uni_pc_order: 3,
            uni_pc_lower_order_final: true,
            token_merging_ratio: 0.0,
            token_merging_ratio_hr: 0.0,
            randn_source: "GPU".to_string(),
            s_min_uncond: 0.0,
            pad_cond_uncond: false,
            extra: Map::new(),
        }
    }
}

impl Options {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "Failed to read settings file {}: {e}",
                    path.display()
                )))
            }
        };

        serde_json::from_str(&raw).map_err(|e| {
            CoreError::Validation(format!(
                "Settings file {} is not valid JSON: {e}",
                path.display()
            ))
        })
    }

    /// Output directory for individual samples.
    pub fn samples_dir(&self) -> &str {
        first_non_empty(&self.outdir_samples, &self.outdir_txt2img_samples)
    }

    /// Output directory for grids.
    pub fn grids_dir(&self) -> &str {
        first_non_empty(&self.outdir_grids, &self.outdir_txt2img_grids)
    }

    /// All settings as a flat JSON object keyed by setting name.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Current value of a setting, if the key is known.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key)
    }

    /// Convert a raw text value into the JSON type of the current setting.
    ///
    /// Returns `Ok(None)` for unknown keys.
    pub fn cast_value(&self, key: &str, raw: &str) -> Result<Option<Value>, CoreError> {
        let Some(current) = self.value(key) else {
            return Ok(None);
        };
        cast_like(&current, raw)
            .map(Some)
            .map_err(|expected| {
                CoreError::Validation(format!(
                    "Invalid value '{raw}' for setting '{key}': expected {expected}"
                ))
            })
    }
}

fn first_non_empty<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.is_empty() {
        fallback
    } else {
        preferred
    }
}

/// Cast `raw` to the JSON type of `template`. On failure returns the
/// expected type name.
fn cast_like(template: &Value, raw: &str) -> Result<Value, &'static str> {
    let raw = raw.trim();
    match template {
        Value::Bool(_) => match raw {
            "True" | "true" | "1" => Ok(Value::Bool(true)),
            "False" | "false" | "0" | "" => Ok(Value::Bool(false)),
            _ => Err("a boolean"),
        },
        Value::Number(n) if n.is_f64() => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or("a number"),
        Value::Number(_) => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| "an integer"),
        Value::Array(_) | Value::Object(_) => serde_json::from_str(raw).map_err(|_| "JSON"),
        Value::String(_) | Value::Null => Ok(Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_dir_prefers_shared_outdir() {
        let mut opts = Options::default();
        assert_eq!(opts.samples_dir(), DEFAULT_TXT2IMG_SAMPLES_DIR);

        opts.outdir_samples = "out/all".to_string();
        assert_eq!(opts.samples_dir(), "out/all");
        assert_eq!(opts.grids_dir(), DEFAULT_TXT2IMG_GRIDS_DIR);
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let opts: Options =
            serde_json::from_str(r#"{"do_not_show_images": true, "custom_key": 5}"#).unwrap();
        assert!(opts.do_not_show_images);
        assert_eq!(opts.value("custom_key"), Some(Value::from(5)));
        assert_eq!(opts.value("CLIP_stop_at_last_layers"), Some(Value::from(1)));
    }

    #[test]
    fn cast_follows_current_type() {
        let opts = Options::default();
        assert_eq!(
            opts.cast_value("CLIP_stop_at_last_layers", "2").unwrap(),
            Some(Value::from(2))
        );
        assert_eq!(
            opts.cast_value("eta_ddim", "0.5").unwrap(),
            Some(Value::from(0.5))
        );
        assert_eq!(
            opts.cast_value("do_not_show_images", "True").unwrap(),
            Some(Value::Bool(true))
        );
        assert_eq!(
            opts.cast_value("sd_vae", " foo.safetensors ").unwrap(),
            Some(Value::from("foo.safetensors"))
        );
        assert_eq!(opts.cast_value("no_such_setting", "1").unwrap(), None);
    }

    #[test]
    fn cast_rejects_bad_integer() {
        let opts = Options::default();
        let err = opts
            .cast_value("CLIP_stop_at_last_layers", "two")
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let opts = Options::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(opts.auto_launch_browser, AutoLaunchBrowser::Local);
    }

    #[test]
    fn invalid_file_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Options::load(&path),
            Err(CoreError::Validation(_))
        ));
    }
}
