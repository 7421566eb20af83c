//! CORS from configured origins. Nothing is allowed unless configured; the
//! layer is never permissive.

use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use regex::Regex;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::ServerConfig;

/// `None` when neither `--cors-allow-origins` nor
/// `--cors-allow-origins-regex` is set.
///
/// The regex must match the whole origin. Invalid origins are dropped with a
/// warning; the regex was validated when the config was built.
pub fn build_cors_layer(config: &ServerConfig) -> Option<CorsLayer> {
    if config.cors_origins.is_empty() && config.cors_origins_regex.is_none() {
        return None;
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter(|o| {
            if o.as_str() == "*" {
                tracing::warn!("Ignoring wildcard CORS origin");
                return false;
            }
            true
        })
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let pattern = config
        .cors_origins_regex
        .as_deref()
        .and_then(|p| Regex::new(&format!("^(?:{p})$")).ok());

    let allow_origin = match pattern {
        None => AllowOrigin::list(origins),
        Some(pattern) => AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origins.contains(origin)
                || origin.to_str().is_ok_and(|o| pattern.is_match(o))
        }),
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600)),
    )
}
