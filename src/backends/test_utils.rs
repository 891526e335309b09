//! Test utilities: mock providers and a canned-response HTTP server
//!
//! Every provider trait has a mock here that records its calls and can be
//! told to fail, so pipeline behavior is testable without model weights or
//! network access.

use crate::config::{ExtractionMethod, SynthesisStrategy};
use crate::config::PipelineConfig;
use crate::copywriter::ChatModel;
use crate::error::{BannerError, Result};
use crate::inference::{
    BackgroundSynthesizer, ForegroundExtractor, SynthesisRequest, Translator, Upscaler,
};
use crate::processor::ModelFactory;
use crate::types::{Extraction, SubjectImage};
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Shared call log
#[derive(Debug, Clone, Default)]
pub struct CallHistory(Arc<Mutex<Vec<String>>>);

impl CallHistory {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Subject with an opaque centered square on a transparent field
#[must_use]
pub fn square_subject(width: u32, height: u32) -> RgbaImage {
    let side = width.min(height) / 2;
    let (x0, y0) = ((width - side) / 2, (height - side) / 2);
    RgbaImage::from_fn(width, height, |x, y| {
        if x >= x0 && x < x0 + side && y >= y0 && y < y0 + side {
            Rgba([200, 60, 40, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Extractor that marks a centered square as foreground
#[derive(Debug, Clone, Default)]
pub struct MockExtractor {
    pub calls: CallHistory,
    pub fail: bool,
}

impl MockExtractor {
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ForegroundExtractor for MockExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Matting
    }

    async fn extract(&self, image: &DynamicImage) -> Result<Extraction> {
        self.calls
            .push(format!("extract {}x{}", image.width(), image.height()));
        if self.fail {
            return Err(BannerError::resource_unavailable("mock extractor weights missing"));
        }
        Ok(Extraction {
            subject: SubjectImage::new(square_subject(image.width(), image.height())),
            mask: None,
        })
    }
}

/// Synthesizer that returns a flat color at the requested size
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    pub calls: CallHistory,
    pub prompts: CallHistory,
    pub strategy: SynthesisStrategy,
    pub color: Rgb<u8>,
    pub fail_with: Option<fn() -> BannerError>,
    /// Simulated generation time
    pub delay: Option<Duration>,
    /// Reply at this size instead of the requested one
    pub fixed_size: Option<(u32, u32)>,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self {
            calls: CallHistory::default(),
            prompts: CallHistory::default(),
            strategy: SynthesisStrategy::Inpaint,
            color: Rgb([30, 90, 160]),
            fail_with: None,
            delay: None,
            fixed_size: None,
        }
    }
}

impl MockSynthesizer {
    #[must_use]
    pub fn failing(error: fn() -> BannerError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }
}

#[async_trait]
impl BackgroundSynthesizer for MockSynthesizer {
    fn name(&self) -> &str {
        "mock-synthesizer"
    }

    fn strategy(&self) -> SynthesisStrategy {
        self.strategy
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbImage> {
        self.calls.push(format!(
            "synthesize {}x{} -> {}",
            request.foreground.width(),
            request.foreground.height(),
            request.output_size
        ));
        self.prompts.push(request.prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.fail_with {
            return Err(error());
        }
        let (w, h) = self
            .fixed_size
            .unwrap_or_else(|| request.output_size.as_tuple());
        Ok(RgbImage::from_pixel(w, h, self.color))
    }
}

/// Upscaler that records factors and resizes with nearest neighbour
#[derive(Debug, Clone, Default)]
pub struct MockUpscaler {
    pub calls: CallHistory,
    pub fail: bool,
    /// Return RGB output, discarding alpha
    pub drop_alpha: bool,
}

#[async_trait]
impl Upscaler for MockUpscaler {
    fn name(&self) -> &str {
        "mock-upscaler"
    }

    async fn upscale(&self, image: &DynamicImage, factor: u32) -> Result<DynamicImage> {
        self.calls.push(format!("upscale x{}", factor));
        if self.fail {
            return Err(BannerError::resource_unavailable("mock upscaler weights missing"));
        }
        let (w, h) = crate::upscale::scaled_dimensions((image.width(), image.height()), factor)?;
        let resized = image.resize_exact(w, h, image::imageops::FilterType::Nearest);
        if self.drop_alpha {
            return Ok(DynamicImage::ImageRgb8(resized.to_rgb8()));
        }
        Ok(resized)
    }
}

/// Translator that tags its input, or fails
#[derive(Debug, Clone, Default)]
pub struct MockTranslator {
    pub calls: CallHistory,
    pub fail: bool,
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        self.calls.push(text);
        if self.fail {
            return Err(BannerError::external_service("translate", "mock outage"));
        }
        Ok(format!("[en] {}", text))
    }
}

/// Chat model replaying canned replies in order
#[derive(Debug, Clone, Default)]
pub struct MockChatModel {
    pub calls: CallHistory,
    replies: Arc<Mutex<Vec<String>>>,
}

impl MockChatModel {
    #[must_use]
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut replies: Vec<String> = replies.into_iter().map(Into::into).collect();
        replies.reverse();
        Self {
            calls: CallHistory::default(),
            replies: Arc::new(Mutex::new(replies)),
        }
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.calls.push(format!("{}\n---\n{}", system, user));
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| BannerError::external_service("openai", "no canned reply left"))
    }
}

/// Factory handing out the mocks above and logging each construction
#[derive(Debug, Clone)]
pub struct MockFactory {
    pub extractor: MockExtractor,
    pub synthesizer: MockSynthesizer,
    pub upscaler: MockUpscaler,
    pub translator: Option<MockTranslator>,
    pub builds: CallHistory,
    /// Synthesizer construction fails as if the checkpoint could not load
    pub synthesizer_unavailable: bool,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self {
            extractor: MockExtractor::default(),
            synthesizer: MockSynthesizer::default(),
            upscaler: MockUpscaler::default(),
            translator: Some(MockTranslator::default()),
            builds: CallHistory::default(),
            synthesizer_unavailable: false,
        }
    }
}

#[async_trait]
impl ModelFactory for MockFactory {
    async fn extractor(&self, _config: &PipelineConfig) -> Result<Arc<dyn ForegroundExtractor>> {
        self.builds.push("extractor");
        Ok(Arc::new(self.extractor.clone()))
    }

    async fn synthesizer(
        &self,
        _config: &PipelineConfig,
    ) -> Result<Arc<dyn BackgroundSynthesizer>> {
        self.builds.push("synthesizer");
        if self.synthesizer_unavailable {
            return Err(BannerError::resource_unavailable(
                "mock checkpoint does not fit in accelerator memory",
            ));
        }
        Ok(Arc::new(self.synthesizer.clone()))
    }

    async fn upscaler(&self, _config: &PipelineConfig) -> Result<Arc<dyn Upscaler>> {
        self.builds.push("upscaler");
        Ok(Arc::new(self.upscaler.clone()))
    }

    fn translator(&self, _config: &PipelineConfig) -> Option<Arc<dyn Translator>> {
        self.translator
            .clone()
            .map(|t| Arc::new(t) as Arc<dyn Translator>)
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let Ok(read) = stream.read(&mut chunk).await else {
            return;
        };
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&buffer);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                return;
            }
        }
    }
}

async fn serve(responses: Vec<(u16, String)>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            read_request(&mut stream).await;
            let reply = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    url
}

/// Serve each body once with HTTP 200, in order; returns the base URL
pub async fn serve_json(bodies: Vec<String>) -> String {
    serve(bodies.into_iter().map(|b| (200, b)).collect()).await
}

/// Serve a single response with the given status
pub async fn serve_status(status: u16, body: &str) -> String {
    serve(vec![(status, body.to_string())]).await
}
