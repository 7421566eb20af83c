//! Directory the UI serves generated images from.
//!
//! Images that are not already on disk are written here as PNG and handed to
//! the front end by path, so that a later upscale request can refer back to
//! them.

use std::path::{Path, PathBuf};

use webui_core::gallery::GalleryEntry;
use webui_core::images::OutputImage;
use webui_core::options::Options;

use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct UiTempDir {
    dir: PathBuf,
    /// Configured explicitly in the options rather than the system default.
    configured: bool,
}

impl UiTempDir {
    /// `opts.temp_dir`, or `<system temp>/webui` when unset.
    pub fn from_options(opts: &Options) -> Self {
        if opts.temp_dir.trim().is_empty() {
            Self {
                dir: std::env::temp_dir().join("webui"),
                configured: false,
            }
        } else {
            Self {
                dir: PathBuf::from(&opts.temp_dir),
                configured: true,
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Gallery entry for `image`, writing it to disk first if needed.
    pub async fn save_image(&self, image: &OutputImage) -> AppResult<GalleryEntry> {
        if image.already_saved_as.is_some() {
            return Ok(GalleryEntry::from_image(image));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, &image.png).await?;

        Ok(GalleryEntry::file(path.to_string_lossy().into_owned()))
    }

    /// Remove leftover PNGs. Only touches an explicitly configured directory.
    pub async fn cleanup(&self) -> AppResult<usize> {
        if !self.configured || !tokio::fs::try_exists(&self.dir).await? {
            return Ok(0);
        }

        let mut removed = 0;
        let mut pending = vec![self.dir.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")) {
                    tokio::fs::remove_file(&path).await?;
                    removed += 1;
                }
            }
        }

        tracing::info!(dir = %self.dir.display(), removed, "Cleaned UI temp dir");
        Ok(removed)
    }
}
