//! Request middleware.
//!
//! - [`auth::require_basic_auth`] -- HTTP basic auth against `--gradio-auth`.
//! - [`auth::RequestUser`] -- The authenticated user, if any.
//! - [`cors::build_cors_layer`] -- CORS from the configured origins only.

pub mod auth;
pub mod cors;
