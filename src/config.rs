//! Configuration types for the banner pipeline

use crate::error::{BannerError, Result};
use crate::models::{ModelSource, ModelSpec};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BannerError::invalid_argument(format!(
                "unknown execution provider '{}' (expected auto, cpu, cuda, coreml)",
                other
            ))),
        }
    }
}

/// Foreground extraction method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Generic background-removal matting model, alpha straight from the model
    #[default]
    Matting,
    /// Promptable segmentation seeded with a single center point
    Segmentation,
}

impl std::str::FromStr for ExtractionMethod {
    type Err = BannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "matting" | "rembg" => Ok(Self::Matting),
            "segmentation" | "sam" => Ok(Self::Segmentation),
            other => Err(BannerError::invalid_argument(format!(
                "unsupported extraction method '{}' (expected 'rembg' or 'sam')",
                other
            ))),
        }
    }
}

/// How the background is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SynthesisStrategy {
    /// Standalone background from the prompt; the product is composited afterward
    TextToImage,
    /// Regenerate only the masked (background) region around the product
    #[default]
    Inpaint,
}

impl std::str::FromStr for SynthesisStrategy {
    type Err = BannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt2img" | "text-to-image" | "text_to_image" => Ok(Self::TextToImage),
            "inpaint" | "inpainting" => Ok(Self::Inpaint),
            other => Err(BannerError::invalid_argument(format!(
                "unknown synthesis strategy '{}' (expected txt2img or inpaint)",
                other
            ))),
        }
    }
}

/// Which service runs the synthesis model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SynthesisBackendKind {
    /// Accelerator-resident diffusion model behind a local inference server
    #[default]
    DiffusionServer,
    /// Hosted multimodal generation API
    Gemini,
}

impl std::str::FromStr for SynthesisBackendKind {
    type Err = BannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "diffusion" | "sd" | "local" => Ok(Self::DiffusionServer),
            "gemini" | "remote" => Ok(Self::Gemini),
            other => Err(BannerError::invalid_argument(format!(
                "unknown synthesis backend '{}' (expected diffusion or gemini)",
                other
            ))),
        }
    }
}

/// Model capacity selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelSize {
    #[default]
    Standard,
    /// Higher-capacity (XL) checkpoint
    Large,
}

/// Upscaler implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpscaleBackendKind {
    /// Deterministic Lanczos resampling, always available
    #[default]
    Lanczos,
    /// Learned super-resolution model
    RealEsrgan,
}

impl std::str::FromStr for UpscaleBackendKind {
    type Err = BannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lanczos" | "filter" => Ok(Self::Lanczos),
            "realesrgan" | "esrgan" | "learned" => Ok(Self::RealEsrgan),
            other => Err(BannerError::invalid_argument(format!(
                "unknown upscale backend '{}' (expected lanczos or realesrgan)",
                other
            ))),
        }
    }
}

/// Pixel dimensions of a working canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    /// Create a canvas size, rejecting zero dimensions
    ///
    /// # Errors
    /// `InvalidArgument` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BannerError::invalid_argument(format!(
                "canvas size must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub fn square(side: u32) -> Self {
        Self {
            width: side.max(1),
            height: side.max(1),
        }
    }

    #[must_use]
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl std::fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parse a `WxH` size string such as `768x768`
///
/// # Errors
/// `InvalidArgument` on malformed or non-positive sizes.
pub fn parse_size(raw: &str) -> Result<CanvasSize> {
    let (w, h) = raw
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| BannerError::invalid_argument(format!("size '{}' is not WxH", raw)))?;
    let width: i64 = w
        .trim()
        .parse()
        .map_err(|_| BannerError::invalid_argument(format!("invalid width in '{}'", raw)))?;
    let height: i64 = h
        .trim()
        .parse()
        .map_err(|_| BannerError::invalid_argument(format!("invalid height in '{}'", raw)))?;
    if width <= 0 || height <= 0 || width > i64::from(u32::MAX) || height > i64::from(u32::MAX) {
        return Err(BannerError::invalid_argument(format!(
            "size must be positive, got '{}'",
            raw
        )));
    }
    CanvasSize::new(width as u32, height as u32)
}

/// Checkpoint names served by the diffusion server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffusionCheckpoints {
    pub standard: String,
    pub large: String,
    pub standard_inpaint: String,
    pub large_inpaint: String,
}

impl Default for DiffusionCheckpoints {
    fn default() -> Self {
        Self {
            standard: "stabilityai/stable-diffusion-2-1".to_string(),
            large: "stabilityai/stable-diffusion-xl-base-1.0".to_string(),
            standard_inpaint: "stabilityai/stable-diffusion-2-inpainting".to_string(),
            large_inpaint: "diffusers/stable-diffusion-xl-1.0-inpainting-0.1".to_string(),
        }
    }
}

impl DiffusionCheckpoints {
    #[must_use]
    pub fn select(&self, strategy: SynthesisStrategy, size: ModelSize) -> &str {
        match (strategy, size) {
            (SynthesisStrategy::TextToImage, ModelSize::Standard) => &self.standard,
            (SynthesisStrategy::TextToImage, ModelSize::Large) => &self.large,
            (SynthesisStrategy::Inpaint, ModelSize::Standard) => &self.standard_inpaint,
            (SynthesisStrategy::Inpaint, ModelSize::Large) => &self.large_inpaint,
        }
    }
}

/// Remote service endpoints and credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    /// Base URL of the diffusion inference server
    pub diffusion_url: String,
    /// Base URL of the multimodal generation API
    pub gemini_url: String,
    pub gemini_model: String,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    /// Base URL of the translation endpoint
    pub translate_url: String,
    /// Base URL of the chat-completions API used for copywriting
    pub openai_url: String,
    pub openai_model: String,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    /// Timeout for a single HTTP request to any of the above
    pub request_timeout: Duration,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            diffusion_url: "http://127.0.0.1:7860".to_string(),
            gemini_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-2.5-flash-image".to_string(),
            gemini_api_key: None,
            translate_url: "https://translate.googleapis.com/translate_a/single".to_string(),
            openai_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            openai_api_key: None,
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Model weight locations for the ONNX-backed providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    pub matting: ModelSpec,
    /// Segmentation encoder/decoder pair; no public default, must be configured
    pub segmentation_encoder: Option<ModelSpec>,
    pub segmentation_decoder: Option<ModelSpec>,
    pub super_resolution: ModelSpec,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            matting: ModelSpec::remote(
                "isnet-general",
                "https://huggingface.co/imgly/isnet-general-onnx/resolve/main/onnx/model.onnx",
            ),
            segmentation_encoder: None,
            segmentation_decoder: None,
            super_resolution: ModelSpec::remote(
                "realesrgan-x4plus",
                "https://huggingface.co/qualcomm/Real-ESRGAN-x4plus/resolve/main/Real-ESRGAN-x4plus.onnx",
            ),
        }
    }
}

/// Configuration for a banner pipeline instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineConfig {
    pub extraction_method: ExtractionMethod,
    /// Zero out color outside the segmentation mask
    pub clean_color_leakage: bool,
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads for ONNX inference (0 = auto)
    pub intra_threads: usize,
    pub synthesis_strategy: SynthesisStrategy,
    pub synthesis_backend: SynthesisBackendKind,
    pub model_size: ModelSize,
    /// Inference steps; `None` leaves the backend default
    pub inference_steps: Option<u32>,
    pub guidance_scale: f32,
    /// Working resolution for mask preparation and inpainting
    pub canvas: CanvasSize,
    /// Resolution for standalone text-to-image backgrounds
    pub background_size: CanvasSize,
    /// Gaussian sigma applied to the mask boundary (0 = exact binary edges)
    pub blur_radius: f32,
    /// Alpha values above this count as foreground
    pub alpha_threshold: u8,
    /// Letterbox the subject onto the canvas instead of stretching it
    pub preserve_aspect: bool,
    pub upscale_backend: UpscaleBackendKind,
    /// Translate the composed prompt (Korean) into English before synthesis
    pub translate_prompt: bool,
    pub checkpoints: DiffusionCheckpoints,
    pub endpoints: ServiceEndpoints,
    pub weights: WeightConfig,
    /// Preferred overlay font face; falls back to system faces when missing
    pub font_path: Option<PathBuf>,
    /// Directory for best-effort debug artifacts
    pub debug_dir: Option<PathBuf>,
    /// Deadline applied to each async stage
    pub stage_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction_method: ExtractionMethod::default(),
            clean_color_leakage: true,
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            synthesis_strategy: SynthesisStrategy::default(),
            synthesis_backend: SynthesisBackendKind::default(),
            model_size: ModelSize::default(),
            inference_steps: None,
            guidance_scale: 7.0,
            canvas: CanvasSize::square(512),
            background_size: CanvasSize::square(768),
            blur_radius: 5.0,
            alpha_threshold: 0,
            preserve_aspect: true,
            upscale_backend: UpscaleBackendKind::default(),
            translate_prompt: true,
            checkpoints: DiffusionCheckpoints::default(),
            endpoints: ServiceEndpoints::default(),
            weights: WeightConfig::default(),
            font_path: Some(PathBuf::from("assets/fonts/NotoSansCJK-Regular.ttc")),
            debug_dir: None,
            stage_timeout: None,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Defaults overlaid with environment variables
    ///
    /// # Errors
    /// `InvalidArgument` when a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup (the environment in production)
    ///
    /// # Errors
    /// `InvalidArgument` when a value is present but malformed.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SD_MODEL") {
            self.checkpoints.standard = v;
        }
        if let Some(v) = lookup("SDXL_MODEL") {
            self.checkpoints.large = v;
        }
        if let Some(v) = lookup("SD_INPAINT_MODEL") {
            self.checkpoints.standard_inpaint = v;
        }
        if let Some(v) = lookup("SDXL_INPAINT_MODEL") {
            self.checkpoints.large_inpaint = v;
        }
        if let Some(v) = lookup("BG_SIZE") {
            self.background_size = parse_size(&v)?;
        }
        if let Some(v) = lookup("EXTRACTION_METHOD") {
            self.extraction_method = v.parse()?;
        }
        if let Some(v) = lookup("SYNTHESIS_BACKEND") {
            self.synthesis_backend = v.parse()?;
        }
        if let Some(v) = lookup("UPSCALE_BACKEND") {
            self.upscale_backend = v.parse()?;
        }
        if let Some(v) = lookup("EXECUTION_PROVIDER") {
            self.execution_provider = v.parse()?;
        }
        if let Some(v) = lookup("BANNER_FONT_PATH") {
            self.font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("BANNER_DEBUG_DIR") {
            self.debug_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SD_API_URL") {
            self.endpoints.diffusion_url = v;
        }
        if let Some(v) = lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")) {
            self.endpoints.gemini_api_key = Some(v);
        }
        if let Some(v) = lookup("GEMINI_MODEL") {
            self.endpoints.gemini_model = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.endpoints.openai_api_key = Some(v);
        }
        if let Some(v) = lookup("SAM_ENCODER_PATH") {
            self.weights.segmentation_encoder = Some(ModelSpec {
                name: "sam-encoder".to_string(),
                source: ModelSource::Local(PathBuf::from(v)),
            });
        }
        if let Some(v) = lookup("SAM_DECODER_PATH") {
            self.weights.segmentation_decoder = Some(ModelSpec {
                name: "sam-decoder".to_string(),
                source: ModelSource::Local(PathBuf::from(v)),
            });
        }
        if let Some(v) = lookup("ESRGAN_WEIGHTS_URL") {
            self.weights.super_resolution = ModelSpec::remote("realesrgan-x4plus", &v);
        }
        if let Some(v) = lookup("STAGE_TIMEOUT_SECS") {
            let secs: u64 = v.trim().parse().map_err(|_| {
                BannerError::invalid_argument(format!("STAGE_TIMEOUT_SECS '{}' is not a number", v))
            })?;
            self.stage_timeout = Some(Duration::from_secs(secs));
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Non-finite or negative blur radius
    /// - Inference steps outside 1-150
    /// - Guidance scale outside 0-30
    pub fn validate(&self) -> Result<()> {
        if !self.blur_radius.is_finite() || self.blur_radius < 0.0 {
            return Err(BannerError::config_value_error(
                "blur radius",
                self.blur_radius,
                ">= 0",
                Some(5.0),
            ));
        }
        if let Some(steps) = self.inference_steps {
            if steps == 0 || steps > 150 {
                return Err(BannerError::config_value_error(
                    "inference steps",
                    steps,
                    "1-150",
                    Some(30),
                ));
            }
        }
        if !(0.0..=30.0).contains(&self.guidance_scale) {
            return Err(BannerError::config_value_error(
                "guidance scale",
                self.guidance_scale,
                "0-30",
                Some(7.0),
            ));
        }
        if self.extraction_method == ExtractionMethod::Segmentation
            && (self.weights.segmentation_encoder.is_none()
                || self.weights.segmentation_decoder.is_none())
        {
            return Err(BannerError::invalid_argument(
                "segmentation extraction needs both encoder and decoder weights (SAM_ENCODER_PATH, SAM_DECODER_PATH)",
            ));
        }
        Ok(())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn extraction_method(mut self, method: ExtractionMethod) -> Self {
        self.config.extraction_method = method;
        self
    }

    #[must_use]
    pub fn clean_color_leakage(mut self, clean: bool) -> Self {
        self.config.clean_color_leakage = clean;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn synthesis_strategy(mut self, strategy: SynthesisStrategy) -> Self {
        self.config.synthesis_strategy = strategy;
        self
    }

    #[must_use]
    pub fn synthesis_backend(mut self, backend: SynthesisBackendKind) -> Self {
        self.config.synthesis_backend = backend;
        self
    }

    #[must_use]
    pub fn model_size(mut self, size: ModelSize) -> Self {
        self.config.model_size = size;
        self
    }

    #[must_use]
    pub fn inference_steps(mut self, steps: u32) -> Self {
        self.config.inference_steps = Some(steps);
        self
    }

    #[must_use]
    pub fn guidance_scale(mut self, scale: f32) -> Self {
        self.config.guidance_scale = scale;
        self
    }

    #[must_use]
    pub fn canvas(mut self, canvas: CanvasSize) -> Self {
        self.config.canvas = canvas;
        self
    }

    #[must_use]
    pub fn background_size(mut self, size: CanvasSize) -> Self {
        self.config.background_size = size;
        self
    }

    #[must_use]
    pub fn blur_radius(mut self, radius: f32) -> Self {
        self.config.blur_radius = radius;
        self
    }

    #[must_use]
    pub fn alpha_threshold(mut self, threshold: u8) -> Self {
        self.config.alpha_threshold = threshold;
        self
    }

    #[must_use]
    pub fn preserve_aspect(mut self, preserve: bool) -> Self {
        self.config.preserve_aspect = preserve;
        self
    }

    #[must_use]
    pub fn upscale_backend(mut self, backend: UpscaleBackendKind) -> Self {
        self.config.upscale_backend = backend;
        self
    }

    #[must_use]
    pub fn translate_prompt(mut self, translate: bool) -> Self {
        self.config.translate_prompt = translate;
        self
    }

    #[must_use]
    pub fn endpoints(mut self, endpoints: ServiceEndpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn weights(mut self, weights: WeightConfig) -> Self {
        self.config.weights = weights;
        self
    }

    #[must_use]
    pub fn font_path<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.config.font_path = path.map(Into::into);
        self
    }

    #[must_use]
    pub fn debug_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.debug_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.config.stage_timeout = Some(timeout);
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// See [`PipelineConfig::validate`].
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
