//! Encoded images passed between the engine, the gallery and the front end.

use std::io::Cursor;
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ::image::{ImageFormat, RgbImage};
use serde::Serialize;

use crate::error::CoreError;

/// Prefix of the inline PNG data URLs the front end sends and accepts.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Encoded 1x1 black PNG shared by every placeholder.
static PLACEHOLDER_PNG: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let mut png = Vec::new();
    RgbImage::new(1, 1)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .expect("encoding a 1x1 image into memory succeeds");
    png
});

/// A PNG-encoded image.
///
/// `already_saved_as` points at a file that already holds this image; the
/// front end is sent that path instead of the pixel data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputImage {
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub png: Vec<u8>,
    pub already_saved_as: Option<String>,
}

impl OutputImage {
    /// Decode any supported format and re-encode as PNG.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let decoded = ::image::load_from_memory(bytes)
            .map_err(|e| CoreError::Validation(format!("Unreadable image: {e}")))?;
        let mut png = Vec::new();
        decoded
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| CoreError::Internal(format!("PNG encoding failed: {e}")))?;
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            png,
            already_saved_as: None,
        })
    }

    /// Decode a base64 payload, with or without a `data:` URL header.
    pub fn from_base64(text: &str) -> Result<Self, CoreError> {
        let payload = match text.split_once(";base64,") {
            Some((header, payload)) if header.starts_with("data:") => payload,
            _ => text,
        };
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| CoreError::Validation(format!("Invalid base64 image data: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// A 1x1 RGB stand-in for an image that is already stored at `path`.
    pub fn placeholder(path: impl Into<String>) -> Self {
        Self {
            width: 1,
            height: 1,
            png: PLACEHOLDER_PNG.clone(),
            already_saved_as: Some(path.into()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.width == 1 && self.height == 1 && self.already_saved_as.is_some()
    }

    /// Inline `data:image/png;base64,...` representation.
    pub fn to_data_url(&self) -> String {
        format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(&self.png))
    }
}
