//! Banner pipeline orchestrator
//!
//! Runs extract → prepare mask → compose prompt → synthesize → composite →
//! overlay text → upscale → encode, strictly in sequence. The first failing
//! stage aborts the run; its error is wrapped with the stage name and nothing
//! partial is returned.
//!
//! Heavyweight providers come from a [`ModelFactory`] and are cached in a
//! [`ModelRegistry`], so a process constructs each model once and tests can
//! inject fakes.

use crate::compositor::{composite, TextRenderer};
use crate::config::{
    ExtractionMethod, ModelSize, PipelineConfig, SynthesisBackendKind, SynthesisStrategy,
    UpscaleBackendKind,
};
use crate::error::{BannerError, Result, Stage};
use crate::inference::{
    BackgroundSynthesizer, ForegroundExtractor, SynthesisRequest, Translator, Upscaler,
};
use crate::mask::{prepare_inpainting_inputs, prepare_with_mask, MaskParams};
use crate::prompt::{PromptComposer, PromptLanguage};
use crate::registry::ModelRegistry;
use crate::services::{ArtifactWriter, TransportEncoder};
use crate::tracing_config::{events, spans};
use crate::types::{expect_mode, BannerRequest, BannerResult, ImageMode, StageTimings};
use async_trait::async_trait;
use image::DynamicImage;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Builds the concrete providers for a configuration
///
/// Construction may be slow (weight downloads, checkpoint loading); the
/// pipeline calls each method at most once per registry key.
#[async_trait]
pub trait ModelFactory: Send + Sync {
    /// # Errors
    /// `ResourceUnavailable` when weights cannot be provisioned.
    async fn extractor(&self, config: &PipelineConfig) -> Result<Arc<dyn ForegroundExtractor>>;

    /// # Errors
    /// `ResourceUnavailable` when the backend cannot load its model.
    async fn synthesizer(&self, config: &PipelineConfig)
        -> Result<Arc<dyn BackgroundSynthesizer>>;

    /// # Errors
    /// `ResourceUnavailable` when weights cannot be provisioned.
    async fn upscaler(&self, config: &PipelineConfig) -> Result<Arc<dyn Upscaler>>;

    /// Prompt translator, or `None` to compose the prompt in English directly
    fn translator(&self, config: &PipelineConfig) -> Option<Arc<dyn Translator>>;
}

/// Registry key for the configured extractor
#[must_use]
pub fn extractor_key(config: &PipelineConfig) -> String {
    match config.extraction_method {
        ExtractionMethod::Matting => "extractor:matting".to_string(),
        ExtractionMethod::Segmentation => "extractor:segmentation".to_string(),
    }
}

/// Registry key for the configured synthesizer: backend × strategy × size
#[must_use]
pub fn synthesizer_key(config: &PipelineConfig) -> String {
    let backend = match config.synthesis_backend {
        SynthesisBackendKind::DiffusionServer => "diffusion",
        SynthesisBackendKind::Gemini => "gemini",
    };
    let strategy = match config.synthesis_strategy {
        SynthesisStrategy::TextToImage => "txt2img",
        SynthesisStrategy::Inpaint => "inpaint",
    };
    let size = match config.model_size {
        ModelSize::Standard => "standard",
        ModelSize::Large => "large",
    };
    format!("synthesizer:{}:{}:{}", backend, strategy, size)
}

/// Registry key for the configured upscaler
#[must_use]
pub fn upscaler_key(config: &PipelineConfig) -> String {
    match config.upscale_backend {
        UpscaleBackendKind::Lanczos => "upscaler:lanczos".to_string(),
        UpscaleBackendKind::RealEsrgan => "upscaler:realesrgan".to_string(),
    }
}

/// Production factory: ONNX extractors and upscaler, HTTP synthesizers
pub struct DefaultModelFactory {
    client: reqwest::Client,
    downloader: crate::download::WeightDownloader,
}

impl DefaultModelFactory {
    /// # Errors
    /// - Failed to build the HTTP client
    /// - Failed to initialize the weight cache
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.endpoints.request_timeout)
            .build()
            .map_err(|e| BannerError::from_http("http client", &e))?;
        Ok(Self {
            client,
            downloader: crate::download::WeightDownloader::new()?,
        })
    }

    #[must_use]
    pub fn with_downloader(mut self, downloader: crate::download::WeightDownloader) -> Self {
        self.downloader = downloader;
        self
    }

    #[cfg(feature = "onnx")]
    async fn session(
        &self,
        config: &PipelineConfig,
        spec: &crate::models::ModelSpec,
    ) -> Result<crate::backends::OnnxSession> {
        let path = self.downloader.ensure(spec).await?;
        let name = spec.name.clone();
        let provider = config.execution_provider;
        let threads = config.intra_threads;
        tokio::task::spawn_blocking(move || {
            crate::backends::OnnxSession::load(&name, &path, provider, threads)
        })
        .await
        .map_err(|e| BannerError::internal(format!("model load task failed: {}", e)))?
    }
}

impl std::fmt::Debug for DefaultModelFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultModelFactory").finish_non_exhaustive()
    }
}

#[async_trait]
impl ModelFactory for DefaultModelFactory {
    #[cfg(feature = "onnx")]
    async fn extractor(&self, config: &PipelineConfig) -> Result<Arc<dyn ForegroundExtractor>> {
        use crate::backends::{MattingExtractor, SegmentationExtractor};

        match config.extraction_method {
            ExtractionMethod::Matting => {
                let session = self.session(config, &config.weights.matting).await?;
                Ok(Arc::new(MattingExtractor::new(session)))
            },
            ExtractionMethod::Segmentation => {
                let (Some(encoder), Some(decoder)) = (
                    &config.weights.segmentation_encoder,
                    &config.weights.segmentation_decoder,
                ) else {
                    return Err(BannerError::resource_unavailable(
                        "segmentation encoder/decoder weights are not configured",
                    ));
                };
                let encoder = self.session(config, encoder).await?;
                let decoder = self.session(config, decoder).await?;
                Ok(Arc::new(SegmentationExtractor::new(
                    encoder,
                    decoder,
                    config.clean_color_leakage,
                )))
            },
        }
    }

    #[cfg(not(feature = "onnx"))]
    async fn extractor(&self, _config: &PipelineConfig) -> Result<Arc<dyn ForegroundExtractor>> {
        Err(BannerError::resource_unavailable(
            "foreground extraction needs the `onnx` feature",
        ))
    }

    async fn synthesizer(
        &self,
        config: &PipelineConfig,
    ) -> Result<Arc<dyn BackgroundSynthesizer>> {
        use crate::backends::{DiffusionServerSynthesizer, GeminiSynthesizer};

        let endpoints = &config.endpoints;
        match config.synthesis_backend {
            SynthesisBackendKind::DiffusionServer => {
                let checkpoint = config
                    .checkpoints
                    .select(config.synthesis_strategy, config.model_size);
                let synthesizer = DiffusionServerSynthesizer::connect(
                    self.client.clone(),
                    &endpoints.diffusion_url,
                    checkpoint,
                    config.synthesis_strategy,
                )
                .await?;
                Ok(Arc::new(synthesizer))
            },
            SynthesisBackendKind::Gemini => Ok(Arc::new(GeminiSynthesizer::new(
                self.client.clone(),
                &endpoints.gemini_url,
                &endpoints.gemini_model,
                endpoints.gemini_api_key.as_deref(),
            )?)),
        }
    }

    async fn upscaler(&self, config: &PipelineConfig) -> Result<Arc<dyn Upscaler>> {
        match config.upscale_backend {
            UpscaleBackendKind::Lanczos => Ok(Arc::new(crate::upscale::LanczosUpscaler)),
            #[cfg(feature = "onnx")]
            UpscaleBackendKind::RealEsrgan => {
                let session = self.session(config, &config.weights.super_resolution).await?;
                Ok(Arc::new(crate::backends::EsrganUpscaler::new(session)))
            },
            #[cfg(not(feature = "onnx"))]
            UpscaleBackendKind::RealEsrgan => Err(BannerError::resource_unavailable(
                "learned upscaling needs the `onnx` feature",
            )),
        }
    }

    fn translator(&self, config: &PipelineConfig) -> Option<Arc<dyn Translator>> {
        if !config.translate_prompt {
            return None;
        }
        let translator: Arc<dyn Translator> = match config.synthesis_backend {
            // The hosted model reads the Korean prompt as is
            SynthesisBackendKind::Gemini => Arc::new(crate::backends::PassthroughTranslator),
            SynthesisBackendKind::DiffusionServer => Arc::new(crate::backends::GoogleTranslator::new(
                self.client.clone(),
                &config.endpoints.translate_url,
            )),
        };
        Some(translator)
    }
}

/// Stages that await a model or remote call and therefore get a deadline
fn has_deadline(stage: Stage) -> bool {
    matches!(
        stage,
        Stage::Extract | Stage::ComposePrompt | Stage::Synthesize | Stage::Upscale
    )
}

fn deadline_error(stage: Stage, limit: Duration) -> BannerError {
    let message = format!("{} exceeded its {:?} deadline", stage, limit);
    match stage {
        Stage::ComposePrompt => BannerError::external_service("translate", message),
        _ => BannerError::generation_failed(message),
    }
}

/// End-to-end banner generator
pub struct BannerPipeline {
    config: PipelineConfig,
    registry: Arc<ModelRegistry>,
    factory: Arc<dyn ModelFactory>,
    translator: Option<Arc<dyn Translator>>,
    renderer: TextRenderer,
}

impl std::fmt::Debug for BannerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BannerPipeline")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("renderer", &self.renderer)
            .finish_non_exhaustive()
    }
}

impl BannerPipeline {
    /// Pipeline with the production factory and a private registry
    ///
    /// # Errors
    /// - Invalid configuration
    /// - HTTP client or weight cache initialization failure
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let factory = DefaultModelFactory::new(&config)?;
        Self::with_factory(config, Arc::new(factory), Arc::new(ModelRegistry::new()))
    }

    /// Pipeline over an injected factory and registry
    ///
    /// Sharing one registry between pipelines shares their model instances.
    ///
    /// # Errors
    /// Invalid configuration.
    pub fn with_factory(
        config: PipelineConfig,
        factory: Arc<dyn ModelFactory>,
        registry: Arc<ModelRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let translator = factory.translator(&config);
        let renderer = TextRenderer::load(config.font_path.as_deref());
        Ok(Self {
            config,
            registry,
            factory,
            translator,
            renderer,
        })
    }

    /// Replace the overlay text renderer
    #[must_use]
    pub fn with_renderer(mut self, renderer: TextRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    async fn extractor(&self) -> Result<Arc<dyn ForegroundExtractor>> {
        let key = extractor_key(&self.config);
        self.registry
            .get_or_try_init::<dyn ForegroundExtractor, _, _>(&key, || {
                self.factory
                    .extractor(&self.config)
                    .instrument(spans::model_loading(&key))
            })
            .await
    }

    async fn synthesizer(&self) -> Result<Arc<dyn BackgroundSynthesizer>> {
        let key = synthesizer_key(&self.config);
        self.registry
            .get_or_try_init::<dyn BackgroundSynthesizer, _, _>(&key, || {
                self.factory
                    .synthesizer(&self.config)
                    .instrument(spans::model_loading(&key))
            })
            .await
    }

    async fn upscaler(&self) -> Result<Arc<dyn Upscaler>> {
        let key = upscaler_key(&self.config);
        self.registry
            .get_or_try_init::<dyn Upscaler, _, _>(&key, || {
                self.factory
                    .upscaler(&self.config)
                    .instrument(spans::model_loading(&key))
            })
            .await
    }

    /// Construct every configured model ahead of the first request
    ///
    /// # Errors
    /// The first provider that cannot be constructed.
    pub async fn warm_up(&self) -> Result<()> {
        events::progress("loading extraction, synthesis and upscaling models");
        self.extractor().await.map_err(|e| e.at_stage(Stage::Extract))?;
        self.synthesizer()
            .await
            .map_err(|e| e.at_stage(Stage::Synthesize))?;
        self.upscaler().await.map_err(|e| e.at_stage(Stage::Upscale))?;
        Ok(())
    }

    /// Run one stage inside its span, recording time and tagging failures
    async fn stage<T, Fut>(&self, stage: Stage, timings: &mut StageTimings, work: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let work = work.instrument(spans::stage(stage));
        let outcome = match self.config.stage_timeout.filter(|_| has_deadline(stage)) {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .unwrap_or_else(|_| Err(deadline_error(stage, limit))),
            None => work.await,
        };
        let elapsed = started.elapsed();
        timings.record(stage, elapsed);
        events::stage_completed(stage, elapsed.as_millis() as u64);
        outcome.map_err(|e| {
            tracing::warn!(stage = %stage, error = %e, "banner stage failed");
            e.at_stage(stage)
        })
    }

    /// Generate a banner
    ///
    /// # Errors
    /// A [`BannerError::Stage`] naming the first stage that failed. Its
    /// [`kind`](BannerError::kind) is the underlying error's kind.
    pub async fn generate(&self, request: &BannerRequest) -> Result<BannerResult> {
        let span = spans::banner_run(&request.menu, request.channel.label());
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &BannerRequest) -> Result<BannerResult> {
        let total = Instant::now();
        let mut timings = StageTimings::default();
        let artifacts = match &self.config.debug_dir {
            Some(dir) => ArtifactWriter::for_run(dir),
            None => ArtifactWriter::disabled(),
        };

        let extraction = self
            .stage(Stage::Extract, &mut timings, async {
                let product = TransportEncoder::decode(&request.product)?;
                let extractor = self.extractor().await?;
                extractor.extract(&product).await
            })
            .await?;
        artifacts.save(
            "01_subject",
            &DynamicImage::ImageRgba8(extraction.subject.image().clone()),
        );

        let prepared = self
            .stage(Stage::PrepareMask, &mut timings, async {
                let params = MaskParams {
                    canvas: self.config.canvas,
                    blur_radius: self.config.blur_radius,
                    alpha_threshold: self.config.alpha_threshold,
                    preserve_aspect: self.config.preserve_aspect,
                };
                match &extraction.mask {
                    Some(mask) => prepare_with_mask(&extraction.subject, mask, &params),
                    None => prepare_inpainting_inputs(&extraction.subject, &params),
                }
            })
            .await?;
        artifacts.save(
            "02_mask",
            &DynamicImage::ImageLuma8(prepared.mask.image().clone()),
        );

        let prompt = self
            .stage(Stage::ComposePrompt, &mut timings, async {
                let (language, translator) = match &self.translator {
                    Some(t) => (PromptLanguage::Korean, Some(t.as_ref())),
                    None => (PromptLanguage::English, None),
                };
                PromptComposer::new(language, translator)
                    .compose(&request.menu, &request.context, &request.tone, &request.channel)
                    .await
            })
            .await?;
        artifacts.save_text("prompt", &prompt);

        let background = self
            .stage(Stage::Synthesize, &mut timings, async {
                let synthesizer = self.synthesizer().await?;
                let output_size = match synthesizer.strategy() {
                    SynthesisStrategy::TextToImage => self.config.background_size,
                    SynthesisStrategy::Inpaint => self.config.canvas,
                };
                let references = std::iter::once(request.product.clone())
                    .chain(request.person.clone())
                    .chain(request.background.clone())
                    .collect();
                tracing::info!(backend = synthesizer.name(), %output_size, "synthesizing background");
                let background = synthesizer
                    .synthesize(&SynthesisRequest {
                        foreground: prepared.foreground.clone(),
                        mask: prepared.mask.clone(),
                        prompt: prompt.clone(),
                        model_size: self.config.model_size,
                        steps: self.config.inference_steps,
                        guidance_scale: self.config.guidance_scale,
                        output_size,
                        references,
                        overlay_style: request.overlay_style.clone(),
                    })
                    .await?;
                // Compositing requires the background at exactly output_size
                if background.dimensions() != output_size.as_tuple() {
                    return Err(BannerError::generation_failed(format!(
                        "{} returned a {}x{} background, expected {}",
                        synthesizer.name(),
                        background.width(),
                        background.height(),
                        output_size
                    )));
                }
                Ok(background)
            })
            .await?;
        let background = DynamicImage::ImageRgb8(background);
        artifacts.save("03_background", &background);

        let composed = self
            .stage(Stage::Composite, &mut timings, async {
                composite(&background, &prepared.subject, true)
            })
            .await?;
        artifacts.save("04_composite", &DynamicImage::ImageRgba8(composed.clone()));

        let overlaid = self
            .stage(Stage::OverlayText, &mut timings, async {
                Ok(self.renderer.overlay_text(
                    &composed,
                    &request.effective_overlay_text(),
                    &request.tone,
                    request.position,
                ))
            })
            .await?;

        let factor = request.channel.upscale_factor();
        let upscaled = self
            .stage(Stage::Upscale, &mut timings, async {
                let upscaler = self.upscaler().await?;
                tracing::debug!(backend = upscaler.name(), factor, "upscaling banner");
                let upscaled = upscaler
                    .upscale(&DynamicImage::ImageRgba8(overlaid), factor)
                    .await?;
                expect_mode(&upscaled, ImageMode::Rgba, "upscale")?;
                Ok(upscaled)
            })
            .await?;

        let png = self
            .stage(Stage::Encode, &mut timings, async {
                TransportEncoder::encode_png(&upscaled)
            })
            .await?;

        timings.total_ms = total.elapsed().as_millis() as u64;
        tracing::info!(
            width = upscaled.width(),
            height = upscaled.height(),
            total_ms = timings.total_ms,
            "banner generated"
        );
        Ok(BannerResult {
            png,
            dimensions: (upscaled.width(), upscaled.height()),
            timings,
        })
    }
}
