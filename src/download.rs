//! Weight provisioning: resolve a [`ModelSpec`] to a file on disk
//!
//! Remote weights are streamed into a temporary directory inside the cache,
//! checksum-verified when a digest is pinned, then atomically renamed into place.

use crate::cache::{ModelCache, WEIGHT_FILE_NAME};
use crate::error::{BannerError, Result};
use crate::models::{ModelSource, ModelSpec};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::Instrument;

/// Bytes between debug progress events
const REPORT_INTERVAL: u64 = 8 * 1024 * 1024;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    fn new_bar() -> Self {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            Self::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            Self::NoOp
        }
    }
}

/// Downloads and verifies model weights
#[derive(Debug, Clone)]
pub struct WeightDownloader {
    client: Client,
    cache: ModelCache,
    show_progress: bool,
}

impl WeightDownloader {
    /// Create a downloader over the default cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize the weight cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| BannerError::from_http("weights", &e))?;
        Ok(Self {
            client,
            cache,
            show_progress: false,
        })
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Resolve `spec` to a weight file, downloading it on first use
    ///
    /// # Errors
    /// `ResourceUnavailable` when local weights are missing, the download
    /// fails, or the checksum does not match.
    pub async fn ensure(&self, spec: &ModelSpec) -> Result<PathBuf> {
        match &spec.source {
            ModelSource::Local(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(BannerError::weights_unavailable(
                        &spec.name,
                        &format!("file not found: {}", path.display()),
                        &["check the configured weight path"],
                    ))
                }
            },
            ModelSource::Remote { url, sha256 } => {
                if self.cache.is_cached(&spec.name) {
                    log::debug!("Weights already cached: {}", spec.name);
                    return Ok(self.cache.weight_path(&spec.name));
                }
                self.download(&spec.name, url, sha256.as_deref())
                    .await
                    .map_err(|e| match e {
                        BannerError::ResourceUnavailable(_) => e,
                        other => BannerError::weights_unavailable(
                            &spec.name,
                            &other.to_string(),
                            &["check network access", "set MENU_BANNER_CACHE_DIR"],
                        ),
                    })
            },
        }
    }

    async fn download(&self, name: &str, url: &str, sha256: Option<&str>) -> Result<PathBuf> {
        log::info!("Downloading weights '{}' from {}", name, url);

        let root = self.cache.get_current_cache_dir();
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-", name))
            .tempdir_in(root)
            .map_err(|e| BannerError::file_io_error("create staging directory", root, &e))?;
        let staged_file = staging.path().join(WEIGHT_FILE_NAME);

        let progress = self.show_progress.then(ProgressIndicator::new_bar);
        if let Some(pb) = &progress {
            pb.set_message(format!("Downloading {}", name));
        }

        let span = crate::tracing_config::spans::download(url, &staged_file);
        if let Err(e) = self
            .download_file(url, &staged_file, progress.as_ref())
            .instrument(span)
            .await
        {
            if let Some(pb) = &progress {
                pb.finish_with_message("❌ Download failed".to_string());
            }
            return Err(e);
        }

        if !verify_file_integrity(&staged_file, sha256)? {
            return Err(BannerError::weights_unavailable(
                name,
                "checksum mismatch",
                &["remove the cached copy and retry", "check the pinned sha256"],
            ));
        }

        let final_dir = root.join(name);
        if final_dir.exists() {
            fs::remove_dir_all(&final_dir).map_err(|e| {
                BannerError::file_io_error("remove existing weight directory", &final_dir, &e)
            })?;
        }
        let staged_dir = staging.keep();
        fs::rename(&staged_dir, &final_dir).map_err(|e| {
            BannerError::file_io_error("move downloaded weights to cache", &final_dir, &e)
        })?;

        if let Some(pb) = progress {
            pb.finish_with_message(format!("✅ Downloaded {}", name));
        }
        log::info!("Successfully downloaded weights: {}", name);
        Ok(final_dir.join(WEIGHT_FILE_NAME))
    }

    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BannerError::from_http("weights", &e))?;

        if !response.status().is_success() {
            return Err(BannerError::external_service(
                "weights",
                format!("HTTP error {} for {}", response.status(), url),
            ));
        }

        let total_size = response.content_length();
        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BannerError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut next_report = REPORT_INTERVAL;
        let mut buffer = vec![0; 64 * 1024];
        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| BannerError::external_service("weights", e.to_string()))?;
            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| BannerError::file_io_error("write to file", local_path, &e))?;
            downloaded += bytes_read as u64;
            if downloaded >= next_report {
                crate::tracing_config::events::download_progress(url, downloaded, total_size);
                next_report += REPORT_INTERVAL;
            }

            if let Some(pb) = progress {
                match total_size {
                    Some(total) => {
                        pb.set_length(total);
                        pb.set_position(downloaded);
                    },
                    None => pb.set_message(format!(
                        "Downloaded {:.1} MB",
                        downloaded as f64 / 1_048_576.0
                    )),
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| BannerError::file_io_error("flush file", local_path, &e))?;
        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(())
    }
}

/// Verify a file against an expected SHA-256; `None` always passes
///
/// # Errors
/// - Failed to read the file
pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
    let Some(expected) = expected_hash else {
        return Ok(true);
    };

    let contents = fs::read(file_path)
        .map_err(|e| BannerError::file_io_error("read file for verification", file_path, &e))?;
    let actual_hash = format!("{:x}", Sha256::digest(&contents));

    if actual_hash.eq_ignore_ascii_case(expected) {
        Ok(true)
    } else {
        log::warn!(
            "File integrity check failed for {}: expected {}, got {}",
            file_path.display(),
            expected,
            actual_hash
        );
        Ok(false)
    }
}
