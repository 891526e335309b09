//! Error types for banner pipeline operations

use thiserror::Error;

/// Result type alias for banner pipeline operations
pub type Result<T> = std::result::Result<T, BannerError>;

/// Coarse error classification surfaced to callers.
///
/// Every [`BannerError`] maps onto exactly one kind; stage wrappers are
/// transparent to this mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Undecodable or malformed bytes, out-of-range arguments
    InvalidInput,
    /// Bad configuration value (unknown selector, non-positive size)
    InvalidArgument,
    /// Model weights or accelerator could not be provisioned
    ResourceUnavailable,
    /// Translation or remote generation API unreachable or erroring
    ExternalService,
    /// Model ran but produced no usable output
    GenerationFailed,
    /// Unexpected condition inside the crate
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidInput => "InvalidInput",
            Self::InvalidArgument => "InvalidArgument",
            Self::ResourceUnavailable => "ResourceUnavailable",
            Self::ExternalService => "ExternalServiceError",
            Self::GenerationFailed => "GenerationFailed",
            Self::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Pipeline stage identifiers used to annotate orchestrator failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extract,
    PrepareMask,
    ComposePrompt,
    Synthesize,
    Composite,
    OverlayText,
    Upscale,
    Encode,
}

impl Stage {
    /// Stable lowercase name, also used as the tracing span name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::PrepareMask => "prepare_mask",
            Self::ComposePrompt => "compose_prompt",
            Self::Synthesize => "synthesize",
            Self::Composite => "composite",
            Self::OverlayText => "overlay_text",
            Self::Upscale => "upscale",
            Self::Encode => "encode",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comprehensive error types for banner pipeline operations
#[derive(Error, Debug)]
pub enum BannerError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Undecodable or malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration or parameters
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Model weights or accelerator not provisionable
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// External service failure (translation, remote generation, LLM)
    #[error("External service error ({service}): {message}")]
    ExternalService { service: String, message: String },

    /// Model produced no usable output
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// A pipeline stage failed; the orchestrator aborted the run
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<BannerError>,
    },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BannerError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn resource_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ResourceUnavailable(msg.into())
    }

    pub fn external_service<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn generation_failed<S: Into<String>>(msg: S) -> Self {
        Self::GenerationFailed(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap an error with the stage it came from.
    ///
    /// Already-wrapped errors are returned untouched so the innermost stage wins.
    #[must_use]
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Coarse error kind, looking through stage wrappers
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Image(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            Self::ExternalService { .. } => ErrorKind::ExternalService,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::Stage { source, .. } => source.kind(),
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The stage that failed, if the error went through the orchestrator
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidArgument(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create a weight provisioning error with troubleshooting hints
    pub fn weights_unavailable(model: &str, error: &str, suggestions: &[&str]) -> Self {
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::ResourceUnavailable(format!(
            "Failed to provision '{}': {}.{}",
            model, error, suggestion_text
        ))
    }

    /// Map a transport failure from `reqwest` onto the external-service kind
    pub fn from_http(service: &str, error: &reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            format!("request timed out: {}", error)
        } else if error.is_connect() {
            format!("connection failed: {}", error)
        } else {
            error.to_string()
        };
        Self::external_service(service, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BannerError::invalid_input("bad bytes").kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            BannerError::invalid_argument("size").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            BannerError::resource_unavailable("oom").kind(),
            ErrorKind::ResourceUnavailable
        );
        assert_eq!(
            BannerError::external_service("translate", "503").kind(),
            ErrorKind::ExternalService
        );
        assert_eq!(
            BannerError::generation_failed("no image").kind(),
            ErrorKind::GenerationFailed
        );
    }

    #[test]
    fn test_stage_wrapping_preserves_kind() {
        let err = BannerError::resource_unavailable("weights missing").at_stage(Stage::Synthesize);
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
        assert_eq!(err.stage(), Some(Stage::Synthesize));
        assert_eq!(
            err.to_string(),
            "synthesize stage failed: Resource unavailable: weights missing"
        );

        // Re-wrapping keeps the innermost stage
        let rewrapped = err.at_stage(Stage::Encode);
        assert_eq!(rewrapped.stage(), Some(Stage::Synthesize));
    }

    #[test]
    fn test_image_errors_are_invalid_input() {
        let decode = image::load_from_memory(b"definitely not an image").unwrap_err();
        let err: BannerError = decode.into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = BannerError::file_io_error("write artifact", Path::new("/tmp/mask.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write artifact"));
        assert!(error_string.contains("/tmp/mask.png"));

        let err = BannerError::config_value_error("upscale factor", 9, "1-8", Some(2));
        let error_string = err.to_string();
        assert!(error_string.contains("upscale factor"));
        assert!(error_string.contains("1-8"));
        assert!(error_string.contains("Recommended: 2"));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = BannerError::weights_unavailable(
            "realesrgan-x4",
            "HTTP 404",
            &["check network access", "set MENU_BANNER_CACHE_DIR"],
        );
        assert!(err.to_string().contains("Suggestions"));
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    }

    #[test]
    fn test_kind_display_names() {
        assert_eq!(ErrorKind::ExternalService.to_string(), "ExternalServiceError");
        assert_eq!(Stage::PrepareMask.to_string(), "prepare_mask");
    }
}
