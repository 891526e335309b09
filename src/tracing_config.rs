//! Tracing configuration for structured logging
//!
//! Binaries configure the subscriber; the library only emits spans and events.

use crate::error::Stage;
#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output for CI environments
    Compact,
    /// JSON structured logging for production environments
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to a filter directive
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// Invalid filter directives.
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(env_filter) => EnvFilter::try_new(env_filter)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).init();
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(fmt_layer).init();
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).init();
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "banner session started");
        }
        Ok(())
    }
}

/// Initialize tracing with CLI-friendly defaults
///
/// # Errors
/// Invalid filter directives.
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8, json: bool) -> anyhow::Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();

    #[cfg(feature = "tracing-json")]
    let format = if json {
        TracingFormat::Json
    } else {
        TracingFormat::Console
    };
    #[cfg(not(feature = "tracing-json"))]
    let format = {
        if json {
            tracing::warn!("built without the `tracing-json` feature, using console output");
        }
        TracingFormat::Console
    };

    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id);
    if let Ok(filter) = std::env::var("RUST_LOG") {
        config = config.with_env_filter(filter);
    }
    config.init()
}

/// Span creation helpers
pub mod spans {
    use super::Stage;
    use tracing::{Level, Span};

    /// Whole banner run
    #[must_use]
    pub fn banner_run(menu: &str, channel: &str) -> Span {
        tracing::span!(Level::INFO, "banner", menu = %menu, channel = %channel)
    }

    /// One pipeline stage; the span name is the stage name
    #[must_use]
    pub fn stage(stage: Stage) -> Span {
        match stage {
            Stage::Extract => tracing::span!(Level::INFO, "extract"),
            Stage::PrepareMask => tracing::span!(Level::INFO, "prepare_mask"),
            Stage::ComposePrompt => tracing::span!(Level::INFO, "compose_prompt"),
            Stage::Synthesize => tracing::span!(Level::INFO, "synthesize"),
            Stage::Composite => tracing::span!(Level::INFO, "composite"),
            Stage::OverlayText => tracing::span!(Level::INFO, "overlay_text"),
            Stage::Upscale => tracing::span!(Level::INFO, "upscale"),
            Stage::Encode => tracing::span!(Level::INFO, "encode"),
        }
    }

    #[must_use]
    pub fn model_loading(key: &str) -> Span {
        tracing::span!(Level::INFO, "model_loading", model = %key)
    }

    #[must_use]
    pub fn download(url: &str, destination: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "download",
            url = %url,
            destination = %destination.display()
        )
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use super::Stage;
    use tracing::{debug, error, info};

    /// User-facing progress line
    pub fn progress(message: &str) {
        info!("{}", message);
    }

    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(error = %error, context = %context, "operation failed");
    }

    pub fn stage_completed(stage: Stage, duration_ms: u64) {
        debug!(stage = %stage, duration_ms, "stage completed");
    }

    pub fn download_progress(url: &str, bytes_downloaded: u64, total_bytes: Option<u64>) {
        match total_bytes {
            Some(total) if total > 0 => debug!(
                url = %url,
                bytes_downloaded,
                total_bytes = total,
                progress_percent = bytes_downloaded as f64 / total as f64 * 100.0,
                "download progress"
            ),
            _ => debug!(url = %url, bytes_downloaded, "download progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "info");
        assert_eq!(TracingConfig::new().with_verbosity(1).verbosity_to_filter(), "debug");
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(9).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_session_id("test-session");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.session_id.as_deref(), Some("test-session"));
        assert!(config.env_filter.is_none());
    }

    #[test]
    fn test_stage_span_names() {
        // Disabled spans have no metadata; only check construction does not panic
        for stage in [Stage::Extract, Stage::Synthesize, Stage::Encode] {
            let _span = spans::stage(stage);
        }
    }
}
