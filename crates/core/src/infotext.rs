//! Parsing of generation-parameter text ("infotext").
//!
//! An infotext looks like:
//!
//! ```text
//! a cat sitting on a mat
//! Negative prompt: blurry
//! Steps: 20, Sampler: Euler a, CFG scale: 7, Seed: 1234, Size: 512x768
//! ```
//!
//! The last line is treated as the parameter block only when it holds at
//! least three `key: value` pairs; otherwise it belongs to the prompt.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::types::{Seed, RANDOM_SEED};

const NEGATIVE_PROMPT_PREFIX: &str = "Negative prompt:";

/// Minimum number of pairs for the last line to count as the parameter block.
const MIN_PARAMS_IN_LAST_LINE: usize = 3;

static RE_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s*(\w[\w \-/]+):\s*("(?:\\.|[^\\"])+"|[^,]*)(?:,|$)"#)
        .expect("static parameter regex is valid")
});

static RE_IMAGESIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)x(\d+)$").expect("static size regex is valid"));

/// Parsed infotext.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfotextParams {
    pub prompt: String,
    pub negative_prompt: String,
    /// Parameter pairs in their original order. `WxH` values are split into
    /// `<key>-1` and `<key>-2`.
    pub values: IndexMap<String, String>,
}

impl InfotextParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// A seed-like value, or [`RANDOM_SEED`] when absent or unparsable.
    pub fn seed(&self, key: &str) -> Seed {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(RANDOM_SEED)
    }
}

fn unquote(value: &str) -> String {
    serde_json::from_str::<String>(value).unwrap_or_else(|_| value.to_string())
}

fn append_line(target: &mut String, line: &str) {
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(line);
}

/// Parse an infotext into prompt, negative prompt and parameter pairs.
pub fn parse_generation_parameters(text: &str) -> InfotextParams {
    let mut params = InfotextParams::default();

    let mut lines: Vec<&str> = text.trim().split('\n').collect();
    let last_line = match lines.last() {
        Some(last) if RE_PARAM.captures_iter(last).count() >= MIN_PARAMS_IN_LAST_LINE => {
            let last = *last;
            lines.pop();
            last
        }
        _ => "",
    };

    let mut done_with_prompt = false;
    for line in lines {
        let mut line = line.trim();
        if let Some(rest) = line.strip_prefix(NEGATIVE_PROMPT_PREFIX) {
            done_with_prompt = true;
            line = rest.trim();
        }
        if done_with_prompt {
            append_line(&mut params.negative_prompt, line);
        } else {
            append_line(&mut params.prompt, line);
        }
    }

    for caps in RE_PARAM.captures_iter(last_line) {
        let key = caps[1].trim().to_string();
        let raw = caps[2].trim();
        let value = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            unquote(raw)
        } else {
            raw.to_string()
        };

        match RE_IMAGESIZE.captures(&value) {
            Some(size) => {
                params.values.insert(format!("{key}-1"), size[1].to_string());
                params.values.insert(format!("{key}-2"), size[2].to_string());
            }
            None => {
                params.values.insert(key, value);
            }
        }
    }

    params
}
