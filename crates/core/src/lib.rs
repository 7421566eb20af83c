//! Domain types for the txt2img web front end.
//!
//! Request building, option lookup, infotext parsing, gallery handling and
//! result metadata live here. Nothing in this crate performs I/O against
//! the diffusion engine or the HTTP layer.

pub mod error;
pub mod gallery;
pub mod html;
pub mod images;
pub mod infotext;
pub mod options;
pub mod override_settings;
pub mod processed;
pub mod progress;
pub mod request;
pub mod types;
