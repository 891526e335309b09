//! Shared fixtures for integration tests
//!
//! Lightweight providers that run without weights or network access.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use menu_banner::{
    config::{CanvasSize, ExtractionMethod, PipelineConfig, SynthesisStrategy},
    error::{BannerError, Result},
    inference::{BackgroundSynthesizer, ForegroundExtractor, SynthesisRequest, Translator, Upscaler},
    types::{BannerRequest, Extraction, SubjectImage},
    BannerPipeline, LanczosUpscaler, ModelFactory, ModelRegistry, TextRenderer, TransportEncoder,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Encoded RGB product photo
pub fn product_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    TransportEncoder::encode_png(&DynamicImage::ImageRgb8(image)).unwrap()
}

/// Opaque ellipse-ish blob in the middle, transparent elsewhere
pub fn blob_subject(width: u32, height: u32) -> RgbaImage {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let (rx, ry) = (width as f32 / 3.0, height as f32 / 3.0);
    RgbaImage::from_fn(width, height, |x, y| {
        let dx = (x as f32 + 0.5 - cx) / rx;
        let dy = (y as f32 + 0.5 - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            Rgba([220, 120, 40, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Small canvases so runs stay fast
pub fn small_config() -> PipelineConfig {
    PipelineConfig::builder()
        .canvas(CanvasSize::square(32))
        .background_size(CanvasSize::square(40))
        .blur_radius(0.0)
        .font_path(None::<&str>)
        .build()
        .unwrap()
}

pub fn request(menu: &str, channel: &str) -> BannerRequest {
    BannerRequest::builder(product_png(48, 24))
        .menu(menu)
        .context("주말 브런치")
        .tone("프리미엄")
        .channel(channel)
        .build()
        .unwrap()
}

pub struct BlobExtractor;

#[async_trait]
impl ForegroundExtractor for BlobExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Matting
    }

    async fn extract(&self, image: &DynamicImage) -> Result<Extraction> {
        Ok(Extraction {
            subject: SubjectImage::new(blob_subject(image.width(), image.height())),
            mask: None,
        })
    }
}

/// Returns a flat background and remembers every request it saw
#[derive(Default)]
pub struct RecordingSynthesizer {
    pub strategy: Option<SynthesisStrategy>,
    pub seen: Mutex<Vec<SynthesisRequest>>,
    pub fail: Option<fn() -> BannerError>,
}

#[async_trait]
impl BackgroundSynthesizer for RecordingSynthesizer {
    fn name(&self) -> &str {
        "recording"
    }

    fn strategy(&self) -> SynthesisStrategy {
        self.strategy.unwrap_or(SynthesisStrategy::Inpaint)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbImage> {
        self.seen.lock().unwrap().push(request.clone());
        if let Some(error) = self.fail {
            return Err(error());
        }
        let (w, h) = request.output_size.as_tuple();
        Ok(RgbImage::from_pixel(w, h, Rgb([20, 140, 80])))
    }
}

pub struct UpperTranslator;

#[async_trait]
impl Translator for UpperTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        Ok(format!("EN({})", text))
    }
}

/// Factory over shared providers, counting synthesizer constructions
pub struct FixtureFactory {
    pub synthesizer: Arc<RecordingSynthesizer>,
    pub translate: bool,
    pub synthesizer_builds: AtomicUsize,
}

impl FixtureFactory {
    pub fn new(synthesizer: RecordingSynthesizer) -> Self {
        Self {
            synthesizer: Arc::new(synthesizer),
            translate: true,
            synthesizer_builds: AtomicUsize::new(0),
        }
    }

    pub fn without_translation(mut self) -> Self {
        self.translate = false;
        self
    }
}

#[async_trait]
impl ModelFactory for FixtureFactory {
    async fn extractor(&self, _config: &PipelineConfig) -> Result<Arc<dyn ForegroundExtractor>> {
        Ok(Arc::new(BlobExtractor))
    }

    async fn synthesizer(
        &self,
        _config: &PipelineConfig,
    ) -> Result<Arc<dyn BackgroundSynthesizer>> {
        self.synthesizer_builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.synthesizer.clone() as Arc<dyn BackgroundSynthesizer>)
    }

    async fn upscaler(&self, _config: &PipelineConfig) -> Result<Arc<dyn Upscaler>> {
        Ok(Arc::new(LanczosUpscaler))
    }

    fn translator(&self, _config: &PipelineConfig) -> Option<Arc<dyn Translator>> {
        self.translate
            .then(|| Arc::new(UpperTranslator) as Arc<dyn Translator>)
    }
}

pub fn pipeline(
    config: PipelineConfig,
    factory: Arc<FixtureFactory>,
    registry: Arc<ModelRegistry>,
) -> BannerPipeline {
    BannerPipeline::with_factory(config, factory, registry)
        .unwrap()
        .with_renderer(TextRenderer::without_font())
}
