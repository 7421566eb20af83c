//! Request-scoped setting overrides.
//!
//! The UI sends overrides as infotext-style lines (`"Clip skip: 2"`). Each
//! label is resolved to a setting key and its value cast to the type of the
//! current setting, so the engine receives the same JSON types it would read
//! from the global store.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::CoreError;
use crate::options::Options;

/// Setting key → value, shadowing the global store for one generation.
pub type OverrideSettings = BTreeMap<String, Value>;

/// Infotext labels and the setting each one controls.
pub const INFOTEXT_TO_SETTING: &[(&str, &str)] = &[
    ("Clip skip", "CLIP_stop_at_last_layers"),
    ("Conditional mask weight", "inpainting_mask_weight"),
    ("Model hash", "sd_model_checkpoint"),
    ("ENSD", "eta_noise_seed_delta"),
    ("Schedule type", "k_sched_type"),
    ("Schedule max sigma", "sigma_max"),
    ("Schedule min sigma", "sigma_min"),
    ("Schedule rho", "rho"),
    ("Noise multiplier", "initial_noise_multiplier"),
    ("Eta", "eta_ancestral"),
    ("Eta DDIM", "eta_ddim"),
    ("Sigma churn", "s_churn"),
    ("Sigma tmin", "s_tmin"),
    ("Sigma tmax", "s_tmax"),
    ("Sigma noise", "s_noise"),
    ("Discard penultimate sigma", "always_discard_next_to_last_sigma"),
    ("UniPC variant", "uni_pc_variant"),
    ("UniPC skip type", "uni_pc_skip_type"),
    ("UniPC order", "uni_pc_order"),
    ("UniPC lower order final", "uni_pc_lower_order_final"),
    ("Token merging ratio", "token_merging_ratio"),
    ("Token merging ratio hr", "token_merging_ratio_hr"),
    ("RNG", "randn_source"),
    ("NGMS", "s_min_uncond"),
    ("Pad conds", "pad_cond_uncond"),
    ("VAE", "sd_vae"),
];

/// Split one `"Label: value"` line at its first colon.
fn split_pair(line: &str) -> Result<(&str, &str), CoreError> {
    line.split_once(':')
        .map(|(label, value)| (label.trim(), value.trim()))
        .filter(|(label, _)| !label.is_empty())
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "Override setting '{line}' must have the form 'Name: value'"
            ))
        })
}

fn setting_for_label(label: &str) -> &str {
    INFOTEXT_TO_SETTING
        .iter()
        .find(|(infotext, _)| *infotext == label)
        .map(|(_, setting)| *setting)
        .unwrap_or(label)
}

/// Build the override map from the UI's override lines.
///
/// Later lines win over earlier ones for the same label. Labels that resolve
/// to no known setting are dropped; a malformed line or a value that does not
/// fit the setting's type is a validation error.
pub fn create_override_settings_dict<S: AsRef<str>>(
    texts: &[S],
    opts: &Options,
) -> Result<OverrideSettings, CoreError> {
    let mut settings = OverrideSettings::new();
    for text in texts {
        let text = text.as_ref().trim();
        if text.is_empty() {
            continue;
        }
        let (label, raw) = split_pair(text)?;
        let key = setting_for_label(label);
        match opts.cast_value(key, raw)? {
            Some(value) => {
                settings.insert(key.to_string(), value);
            }
            None => tracing::debug!(label, setting = key, "Ignoring override for unknown setting"),
        }
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn maps_infotext_labels_to_settings() {
        let opts = Options::default();
        let settings =
            create_override_settings_dict(&["Clip skip: 2", "VAE: anime.pt"], &opts).unwrap();
        assert_eq!(settings["CLIP_stop_at_last_layers"], Value::from(2));
        assert_eq!(settings["sd_vae"], Value::from("anime.pt"));
    }

    #[test]
    fn last_duplicate_wins() {
        let opts = Options::default();
        let settings = create_override_settings_dict(
            &["Clip skip: 2", "ENSD: 31337", "Clip skip: 3"],
            &opts,
        )
        .unwrap();
        assert_eq!(settings["CLIP_stop_at_last_layers"], Value::from(3));
        assert_eq!(settings["eta_noise_seed_delta"], Value::from(31337));
        assert_eq!(settings.len(), 2);
    }

    #[test]
    fn accepts_raw_setting_keys() {
        let opts = Options::default();
        let settings =
            create_override_settings_dict(&["save_images_before_highres_fix: True"], &opts)
                .unwrap();
        assert_eq!(settings["save_images_before_highres_fix"], Value::Bool(true));
    }

    #[test]
    fn value_may_contain_colons() {
        let opts = Options::default();
        let settings =
            create_override_settings_dict(&["Model hash: C:\\models\\a.ckpt"], &opts).unwrap();
        assert_eq!(settings["sd_model_checkpoint"], Value::from("C:\\models\\a.ckpt"));
    }

    #[test]
    fn sampler_labels_cast_to_default_types() {
        let opts = Options::default();
        let settings = create_override_settings_dict(
            &[
                "Sigma churn: 0.5",
                "Schedule type: karras",
                "RNG: CPU",
                "Token merging ratio: 0.2",
                "UniPC order: 2",
                "Pad conds: True",
            ],
            &opts,
        )
        .unwrap();
        assert_eq!(settings["s_churn"], Value::from(0.5));
        assert_eq!(settings["k_sched_type"], Value::from("karras"));
        assert_eq!(settings["randn_source"], Value::from("CPU"));
        assert_eq!(settings["token_merging_ratio"], Value::from(0.2));
        assert_eq!(settings["uni_pc_order"], Value::from(2));
        assert_eq!(settings["pad_cond_uncond"], Value::Bool(true));
    }

    #[test]
    fn every_mapped_setting_has_a_default() {
        let opts = Options::default();
        for (label, setting) in INFOTEXT_TO_SETTING {
            assert!(opts.value(setting).is_some(), "{label} -> {setting} has no default");
        }
    }

    #[test]
    fn float_settings_accept_integer_text() {
        let opts = Options::default();
        let settings = create_override_settings_dict(&["Sigma noise: 1"], &opts).unwrap();
        assert_eq!(settings["s_noise"], Value::from(1.0));
    }

    #[test]
    fn unknown_labels_are_dropped() {
        let opts = Options::default();
        let settings = create_override_settings_dict(&["Frobnication level: 3"], &opts).unwrap();
        assert!(settings.is_empty());
    }

    #[test]
    fn missing_colon_is_validation_error() {
        let opts = Options::default();
        let err = create_override_settings_dict(&["Clip skip 2"], &opts).unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    #[test]
    fn uncastable_value_is_validation_error() {
        let opts = Options::default();
        let err = create_override_settings_dict(&["Clip skip: many"], &opts).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("CLIP_stop_at_last_layers"));
    }

    #[test]
    fn empty_input_yields_empty_map() {
        let opts = Options::default();
        let none: [&str; 0] = [];
        assert!(create_override_settings_dict(&none, &opts).unwrap().is_empty());
        assert!(create_override_settings_dict(&["  "], &opts).unwrap().is_empty());
    }
}
