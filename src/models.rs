//! Model weight specifications
//!
//! A [`ModelSpec`] names a set of ONNX weights and where they come from: either a
//! file the operator already placed on disk, or a remote file fetched into the
//! cache on first use.

use crate::cache::ModelCache;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a model's weights come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Remote file, downloaded into the weight cache
    Remote {
        url: String,
        /// Expected lowercase hex SHA-256 of the file, if pinned
        sha256: Option<String>,
    },
    /// Weights already present on disk
    Local(PathBuf),
}

impl ModelSource {
    /// Short human-readable label for logs and `weights list`
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Local(path) => format!(
                "local:{}",
                path.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
            ),
            Self::Remote { url, .. } => format!("remote:{}", ModelCache::url_to_weight_id(url)),
        }
    }
}

/// A named set of weights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Stable identifier, used as the cache directory name
    pub name: String,
    pub source: ModelSource,
}

impl ModelSpec {
    #[must_use]
    pub fn remote(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            source: ModelSource::Remote {
                url: url.to_string(),
                sha256: None,
            },
        }
    }

    #[must_use]
    pub fn local<P: Into<PathBuf>>(name: &str, path: P) -> Self {
        Self {
            name: name.to_string(),
            source: ModelSource::Local(path.into()),
        }
    }

    /// Pin the expected checksum of a remote file; ignored for local weights
    #[must_use]
    pub fn with_sha256(mut self, digest: &str) -> Self {
        if let ModelSource::Remote { sha256, .. } = &mut self.source {
            *sha256 = Some(digest.to_ascii_lowercase());
        }
        self
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self.source, ModelSource::Remote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        let local = ModelSpec::local("sam-encoder", "/opt/weights/sam2_encoder.onnx");
        assert_eq!(local.source.display_name(), "local:sam2_encoder.onnx");
        assert!(!local.is_remote());

        let remote = ModelSpec::remote(
            "isnet-general",
            "https://huggingface.co/imgly/isnet-general-onnx/resolve/main/onnx/model.onnx",
        );
        assert!(remote.is_remote());
        assert!(remote.source.display_name().starts_with("remote:imgly--isnet-general-onnx"));
    }

    #[test]
    fn test_sha256_only_applies_to_remote() {
        let remote = ModelSpec::remote("x", "https://example.com/x.onnx").with_sha256("ABCDEF");
        assert_eq!(
            remote.source,
            ModelSource::Remote {
                url: "https://example.com/x.onnx".to_string(),
                sha256: Some("abcdef".to_string())
            }
        );

        let local = ModelSpec::local("y", "/tmp/y.onnx").with_sha256("abcdef");
        assert_eq!(local.source, ModelSource::Local(PathBuf::from("/tmp/y.onnx")));
    }
}
