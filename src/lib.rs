#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Menu Banner
//!
//! Turns a product photo of a menu item into an advertising banner: the
//! product is cut out, a matching scene is generated around it, a
//! call-to-action line is drawn on top and the result is upscaled for the
//! target SNS channel.
//!
//! ## Features
//!
//! - **Foreground extraction**: ISNet-class matting or promptable segmentation (ONNX Runtime)
//! - **Background synthesis**: inpainting or text-to-image on a Stable Diffusion WebUI
//!   server, or a hosted multimodal model
//! - **Prompting**: menu-keyword place classification, tone and channel phrases,
//!   Korean→English translation
//! - **Compositing**: alpha-over plus a tone-aware text box
//! - **Upscaling**: Lanczos resampling or Real-ESRGAN
//! - **Copywriting**: captions, evaluation and persona scoring through a chat model
//! - **Model management**: weight download, SHA-256 verification, on-disk cache
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use menu_banner::{BannerPipeline, BannerRequest, PipelineConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::from_env()?;
//! let pipeline = BannerPipeline::new(config)?;
//!
//! let request = BannerRequest::builder(std::fs::read("americano.jpg")?)
//!     .menu("아메리카노")
//!     .context("비 오는 아침")
//!     .tone("따뜻함")
//!     .channel("피드")
//!     .build()?;
//!
//! let banner = pipeline.generate(&request).await?;
//! std::fs::write("banner.png", &banner.png)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime extractors and the learned upscaler
//! - `cli` (default): command-line interface, progress bars, tracing subscriber
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! menu-banner = { version = "0.1", default-features = false, features = ["onnx"] }
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod copywriter;
pub mod download;
pub mod error;
pub mod inference;
pub mod mask;
pub mod models;
pub mod processor;
pub mod prompt;
pub mod registry;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod upscale;
pub mod utils;

// Public API exports
pub use backends::{
    DiffusionServerSynthesizer, GeminiSynthesizer, GoogleTranslator, PassthroughTranslator,
};
#[cfg(feature = "onnx")]
pub use backends::{EsrganUpscaler, MattingExtractor, OnnxSession, SegmentationExtractor};
pub use cache::{format_size, CachedWeightInfo, ModelCache};
pub use compositor::{composite, OverlayColors, TextRenderer};
pub use config::{
    parse_size, CanvasSize, ExecutionProvider, ExtractionMethod, ModelSize, PipelineConfig,
    PipelineConfigBuilder, SynthesisBackendKind, SynthesisStrategy, UpscaleBackendKind,
};
pub use copywriter::{
    evaluate_copy, evaluate_personas, generate_copy, ChatModel, CopyRequest, CopyResult,
    EvaluationResult, OpenAiChat, Persona, PersonaEvaluationResponse,
};
pub use download::WeightDownloader;
pub use error::{BannerError, ErrorKind, Result, Stage};
pub use inference::{
    BackgroundSynthesizer, ForegroundExtractor, SynthesisRequest, Translator, Upscaler,
};
pub use mask::{prepare_inpainting_inputs, MaskParams, PreparedInputs};
pub use models::{ModelSource, ModelSpec};
pub use processor::{BannerPipeline, DefaultModelFactory, ModelFactory};
pub use prompt::{classify_menu, compose_prompt, PromptComposer, PromptLanguage};
pub use registry::ModelRegistry;
pub use services::{ArtifactWriter, ImageIOService, TransportEncoder};
pub use types::{
    BannerRequest, BannerRequestBuilder, BannerResult, Channel, Extraction, Mask, MaskPolarity,
    OverlayPosition, PlaceCategory, StageTimings, SubjectImage, Tone,
};
pub use upscale::LanczosUpscaler;

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};
