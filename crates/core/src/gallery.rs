//! Gallery entries exchanged with the front end.
//!
//! The browser keeps the images of the last generation and sends them back
//! when the user asks to upscale one of them. Images the server saved are
//! referenced by file name (optionally cache-busted with `?<query>`); all
//! others travel inline as data URLs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::images::OutputImage;

/// One gallery slot as sent by or to the front end.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GalleryEntry {
    /// File path of a saved image, possibly with a `?query` suffix.
    #[serde(default)]
    pub name: Option<String>,
    /// Inline `data:` URL for images that were never written to disk.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub is_file: bool,
}

impl GalleryEntry {
    /// Entry referencing a stored file.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            name: Some(path.into()),
            data: None,
            is_file: true,
        }
    }

    /// Entry carrying the pixel data inline.
    pub fn inline(data_url: impl Into<String>) -> Self {
        Self {
            name: None,
            data: Some(data_url.into()),
            is_file: false,
        }
    }

    /// Front-end representation of an image: stored images by path, the rest
    /// as data URLs.
    pub fn from_image(image: &OutputImage) -> Self {
        match &image.already_saved_as {
            Some(path) => Self::file(path.clone()),
            None => Self::inline(image.to_data_url()),
        }
    }

    /// The stored path without any `?query` suffix.
    pub fn saved_path(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(|name| name.rsplit_once('?').map_or(name, |(path, _)| path))
    }
}

/// Directories the server may read gallery files from.
#[derive(Debug, Clone, Default)]
pub struct AllowedPaths {
    roots: Vec<PathBuf>,
}

impl AllowedPaths {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    /// Whether `path` resolves to a location inside one of the roots.
    pub fn contains(&self, path: &Path) -> bool {
        let Ok(resolved) = path.canonicalize() else {
            return false;
        };
        self.roots
            .iter()
            .filter_map(|root| root.canonicalize().ok())
            .any(|root| resolved.starts_with(root))
    }

    /// Resolve a front-end file reference, refusing paths outside the roots.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, CoreError> {
        let path = PathBuf::from(name.rsplit_once('?').map_or(name, |(path, _)| path));
        if self.contains(&path) {
            Ok(path)
        } else {
            Err(CoreError::Forbidden(format!(
                "Trying to open image file outside of allowed directories: {}",
                path.display()
            )))
        }
    }
}

/// Load the pixels behind a gallery entry.
pub fn image_from_entry(entry: &GalleryEntry, allowed: &AllowedPaths) -> Result<OutputImage, CoreError> {
    if let Some(data) = entry.data.as_deref().filter(|d| d.starts_with("data:")) {
        return OutputImage::from_base64(data);
    }

    let name = entry.name.as_deref().ok_or_else(|| {
        CoreError::Validation("Gallery entry has neither a file name nor image data".to_string())
    })?;
    let path = allowed.resolve(name)?;
    let bytes = std::fs::read(&path).map_err(|e| {
        CoreError::NotFound {
            entity: "Image file",
            id: format!("{} ({e})", path.display()),
        }
    })?;

    let mut image = OutputImage::from_bytes(&bytes)?;
    image.already_saved_as = Some(path.to_string_lossy().into_owned());
    Ok(image)
}
