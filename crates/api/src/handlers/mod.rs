//! Axum handlers, grouped by surface.

pub mod internal;
pub mod progress;
pub mod sdapi;
pub mod txt2img;
