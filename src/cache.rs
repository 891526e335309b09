//! Weight cache management for downloaded models
//!
//! Downloaded weights live in an XDG-compliant cache directory, one
//! subdirectory per [`ModelSpec`](crate::models::ModelSpec) name, each holding a
//! single `model.onnx`.

use crate::error::{BannerError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// File name used for every cached weight file
pub const WEIGHT_FILE_NAME: &str = "model.onnx";

/// Information about a cached weight set
#[derive(Debug, Clone)]
pub struct CachedWeightInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Weight cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache manager rooted at the default location
    ///
    /// - Linux/macOS: `~/.cache/menu-banner/models/`
    /// - Windows: `%LOCALAPPDATA%/menu-banner/models/`
    ///
    /// `MENU_BANNER_CACHE_DIR` overrides the root.
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::get_cache_dir()?;
        Self::ensure_dir(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Create a cache manager with a custom root; weights go under `<root>/models`
    ///
    /// # Errors
    /// - Failed to create the cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        let models_dir = cache_dir.join("models");
        Self::ensure_dir(&models_dir)?;
        Ok(Self {
            cache_dir: models_dir,
        })
    }

    fn ensure_dir(dir: &Path) -> Result<()> {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .map_err(|e| BannerError::file_io_error("create cache directory", dir, &e))?;
        }
        Ok(())
    }

    fn get_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var("MENU_BANNER_CACHE_DIR") {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BannerError::invalid_argument(
                    "Failed to determine cache directory. Set MENU_BANNER_CACHE_DIR environment variable.",
                )
            })?
            .join("menu-banner")
            .join("models"))
    }

    /// Derive a filesystem-safe identifier from a weight URL
    ///
    /// `HuggingFace` URLs keep their `owner--repo` prefix; anything else is hashed.
    ///
    /// ```
    /// use menu_banner::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_weight_id("https://huggingface.co/imgly/isnet-general-onnx");
    /// assert_eq!(id, "imgly--isnet-general-onnx");
    /// ```
    #[must_use]
    pub fn url_to_weight_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if let Some(rest) = url.strip_prefix(prefix) {
            let repo: Vec<&str> = rest.split('/').take(2).collect();
            repo.join("--")
        } else {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let hash_string = format!("url-{:x}", hasher.finalize());
            hash_string.get(..16).unwrap_or(&hash_string).to_string()
        }
    }

    /// Path of the weight file for `name` (may not exist)
    #[must_use]
    pub fn weight_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name).join(WEIGHT_FILE_NAME)
    }

    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool {
        let path = self.weight_path(name);
        path.is_file() && path.metadata().map(|m| m.len() > 0).unwrap_or(false)
    }

    /// List every cached weight set, sorted by name
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn scan_cached_weights(&self) -> Result<Vec<CachedWeightInfo>> {
        let mut weights = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(weights);
        }

        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| BannerError::file_io_error("read cache directory", &self.cache_dir, &e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if !path.is_dir() || !self.is_cached(&name) {
                log::debug!("Skipping incomplete cache entry: {}", path.display());
                continue;
            }
            let size_bytes = fs::metadata(path.join(WEIGHT_FILE_NAME))
                .map(|m| m.len())
                .unwrap_or(0);
            weights.push(CachedWeightInfo {
                name,
                path,
                size_bytes,
            });
        }

        weights.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(weights)
    }

    /// Remove one cached weight set
    ///
    /// Returns `false` when nothing was cached under `name`.
    ///
    /// # Errors
    /// - Failed to remove the directory
    pub fn clear_specific(&self, name: &str) -> Result<bool> {
        let dir = self.cache_dir.join(name);
        if !dir.exists() {
            return Ok(false);
        }
        log::info!("Removing cached weights: {}", name);
        fs::remove_dir_all(&dir)
            .map_err(|e| BannerError::file_io_error("remove cached weights", &dir, &e))?;
        Ok(true)
    }

    /// Remove every cached weight set, returning the removed names
    ///
    /// # Errors
    /// - Failed to read or remove cache entries
    pub fn clear_all(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(removed);
        }

        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| BannerError::file_io_error("read cache directory", &self.cache_dir, &e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string();
                fs::remove_dir_all(&path)
                    .map_err(|e| BannerError::file_io_error("remove cached weights", &path, &e))?;
                removed.push(name);
            }
        }
        removed.sort();
        Ok(removed)
    }

    #[must_use]
    pub fn get_current_cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed(cache: &ModelCache, name: &str, bytes: &[u8]) {
        let path = cache.weight_path(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_url_to_weight_id() {
        assert_eq!(
            ModelCache::url_to_weight_id(
                "https://huggingface.co/imgly/isnet-general-onnx/resolve/main/onnx/model.onnx"
            ),
            "imgly--isnet-general-onnx"
        );

        let hashed = ModelCache::url_to_weight_id("https://example.com/weights/esrgan.onnx");
        assert!(hashed.starts_with("url-"));
        assert_eq!(hashed.len(), 16);
        assert_eq!(
            hashed,
            ModelCache::url_to_weight_id("https://example.com/weights/esrgan.onnx")
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_scan_and_clear() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        assert!(cache.scan_cached_weights().unwrap().is_empty());

        seed(&cache, "realesrgan-x4plus", b"weights");
        seed(&cache, "isnet-general", b"more weights");
        // Empty files are treated as incomplete downloads
        seed(&cache, "broken", b"");

        let listed = cache.scan_cached_weights().unwrap();
        let names: Vec<_> = listed.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["isnet-general", "realesrgan-x4plus"]);
        assert_eq!(listed[0].size_bytes, 12);

        assert!(cache.clear_specific("isnet-general").unwrap());
        assert!(!cache.clear_specific("isnet-general").unwrap());
        assert!(!cache.is_cached("isnet-general"));

        let removed = cache.clear_all().unwrap();
        assert_eq!(removed, ["broken", "realesrgan-x4plus"]);
    }
}
