//! Capability provider interfaces
//!
//! Every model-backed stage sits behind one of these traits. Concrete
//! implementations live in [`crate::backends`]; the orchestrator only sees the
//! trait objects, so tests swap in fakes without touching call sites.

use crate::config::{CanvasSize, ExtractionMethod, ModelSize, SynthesisStrategy};
use crate::error::Result;
use crate::types::{Extraction, Mask};
use crate::upscale::resample_exact;
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};

/// Isolates the product subject from its background
#[async_trait]
pub trait ForegroundExtractor: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    /// Produce an RGBA subject sized like `image`
    ///
    /// # Errors
    /// - `ResourceUnavailable` if the model cannot be loaded
    /// - `GenerationFailed` if inference produces no usable matte
    async fn extract(&self, image: &DynamicImage) -> Result<Extraction>;
}

/// Everything a background synthesizer needs for one call
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Letterboxed product on the working canvas (RGB)
    pub foreground: RgbImage,
    /// Region to regenerate, canonical polarity, same size as `foreground`
    pub mask: Mask,
    pub prompt: String,
    pub model_size: ModelSize,
    pub steps: Option<u32>,
    pub guidance_scale: f32,
    /// Exact size of the returned background
    pub output_size: CanvasSize,
    /// Raw reference images forwarded to multimodal backends (product first)
    pub references: Vec<Vec<u8>>,
    /// Overlay styling description for multimodal backends
    pub overlay_style: Option<String>,
}

impl SynthesisRequest {
    /// Resample a backend's image to `output_size`; remote models pick their own resolution
    #[must_use]
    pub fn fit_output(&self, image: RgbImage) -> RgbImage {
        let target = self.output_size.as_tuple();
        if image.dimensions() == target {
            return image;
        }
        tracing::debug!(
            from = ?image.dimensions(),
            to = %self.output_size,
            "resampling synthesized background"
        );
        resample_exact(DynamicImage::ImageRgb8(image), target).to_rgb8()
    }
}

/// Produces a new background for the product
#[async_trait]
pub trait BackgroundSynthesizer: Send + Sync {
    /// Identifier used in logs and spans
    fn name(&self) -> &str;

    fn strategy(&self) -> SynthesisStrategy;

    /// Generate the background as RGB
    ///
    /// # Errors
    /// - `ExternalService` if the backend is unreachable
    /// - `GenerationFailed` if the backend returns no usable image
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbImage>;
}

/// Increases output resolution by an integer factor
#[async_trait]
pub trait Upscaler: Send + Sync {
    fn name(&self) -> &str;

    /// Return `image` scaled by exactly `factor` in both dimensions
    ///
    /// # Errors
    /// - `InvalidArgument` for a zero factor
    /// - `GenerationFailed` if a learned model fails mid-call
    async fn upscale(&self, image: &DynamicImage, factor: u32) -> Result<DynamicImage>;
}

/// Translates the composed prompt into the synthesizer's working language
#[async_trait]
pub trait Translator: Send + Sync {
    /// # Errors
    /// `ExternalService` when the translation call fails.
    async fn translate(&self, text: &str) -> Result<String>;
}
