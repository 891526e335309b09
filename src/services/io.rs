//! Image I/O service and best-effort debug artifacts

use crate::error::{BannerError, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Service for reading inputs and writing outputs on disk
pub struct ImageIOService;

impl ImageIOService {
    /// Read raw image bytes from a file
    ///
    /// # Errors
    /// - File missing or unreadable
    pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        std::fs::read(path_ref).map_err(|e| BannerError::file_io_error("read image file", path_ref, &e))
    }

    /// Async variant of [`Self::read_bytes`]
    ///
    /// # Errors
    /// - File missing or unreadable
    pub async fn read_bytes_async<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        tokio::fs::read(path_ref)
            .await
            .map_err(|e| BannerError::file_io_error("read image file", path_ref, &e))
    }

    /// Write bytes, creating parent directories as needed
    ///
    /// # Errors
    /// - Directory creation or write failure
    pub fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| BannerError::file_io_error("create output directory", parent, &e))?;
            }
        }
        std::fs::write(path_ref, bytes)
            .map_err(|e| BannerError::file_io_error("write output file", path_ref, &e))
    }
}

/// Writes intermediate images for one pipeline run.
///
/// Every write is best-effort: failures are logged and swallowed, and nothing
/// in the pipeline reads these files back.
#[derive(Debug)]
pub struct ArtifactWriter {
    dir: Option<PathBuf>,
}

impl ArtifactWriter {
    /// Writer that drops everything
    #[must_use]
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Create a fresh `run-*` directory under `root`, or a disabled writer if that fails
    #[must_use]
    pub fn for_run(root: &Path) -> Self {
        let created = std::fs::create_dir_all(root).and_then(|()| {
            tempfile::Builder::new()
                .prefix("run-")
                .tempdir_in(root)
                .map(tempfile::TempDir::keep)
        });
        match created {
            Ok(dir) => {
                tracing::debug!(dir = %dir.display(), "writing debug artifacts");
                Self { dir: Some(dir) }
            },
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "debug artifacts disabled");
                Self::disabled()
            },
        }
    }

    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Save `image` as `<name>.png`
    pub fn save(&self, name: &str, image: &DynamicImage) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(format!("{}.png", name));
        if let Err(e) = image.save_with_format(&path, image::ImageFormat::Png) {
            tracing::warn!(artifact = name, error = %e, "failed to write debug artifact");
        }
    }

    /// Save a text artifact such as the composed prompt
    pub fn save_text(&self, name: &str, text: &str) {
        let Some(dir) = &self.dir else {
            return;
        };
        if let Err(e) = std::fs::write(dir.join(format!("{}.txt", name)), text) {
            tracing::warn!(artifact = name, error = %e, "failed to write debug artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifacts_written_under_run_dir() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::for_run(temp.path());
        let dir = writer.dir().unwrap().to_path_buf();
        assert!(dir.starts_with(temp.path()));

        writer.save("mask", &DynamicImage::new_luma8(3, 3));
        writer.save_text("prompt", "cozy café interior");
        assert!(dir.join("mask.png").is_file());
        assert_eq!(std::fs::read_to_string(dir.join("prompt.txt")).unwrap(), "cozy café interior");
    }

    #[test]
    fn test_disabled_writer_is_silent() {
        let writer = ArtifactWriter::disabled();
        assert!(writer.dir().is_none());
        writer.save("anything", &DynamicImage::new_rgb8(1, 1));
    }

    #[test]
    fn test_write_and_read_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/out.png");
        ImageIOService::write_bytes(&path, b"abc").unwrap();
        assert_eq!(ImageIOService::read_bytes(&path).unwrap(), b"abc");

        let err = ImageIOService::read_bytes(temp.path().join("missing")).unwrap_err();
        assert!(err.to_string().contains("read image file"));
    }
}
