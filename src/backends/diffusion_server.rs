//! Stable Diffusion WebUI compatible synthesis backend
//!
//! Construction selects the checkpoint on the server, which is the expensive
//! step (weights are loaded onto the accelerator). Each synthesis call is one
//! `txt2img` or `img2img` request carrying base64 PNGs.

use crate::config::SynthesisStrategy;
use crate::error::{BannerError, Result};
use crate::inference::{BackgroundSynthesizer, SynthesisRequest};
use crate::services::TransportEncoder;
use crate::types::MaskPolarity;
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::instrument;

const SERVICE: &str = "diffusion-server";

/// Fill masked pixels starting from the original content
const INPAINT_FILL_ORIGINAL: u8 = 1;

#[derive(Debug, Serialize)]
struct OptionsRequest<'a> {
    sd_model_checkpoint: &'a str,
}

#[derive(Debug, Serialize)]
struct TextToImageRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    cfg_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<u32>,
}

#[derive(Debug, Serialize)]
struct InpaintRequest<'a> {
    prompt: &'a str,
    init_images: Vec<String>,
    mask: String,
    width: u32,
    height: u32,
    cfg_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<u32>,
    denoising_strength: f32,
    inpainting_fill: u8,
    /// White mask pixels are regenerated
    inpainting_mask_invert: u8,
    inpaint_full_res: bool,
    mask_blur: u32,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Decode the first image of a generation response
fn first_image(response: GenerationResponse) -> Result<RgbImage> {
    let encoded = response
        .images
        .into_iter()
        .next()
        .ok_or_else(|| BannerError::generation_failed("diffusion server returned no images"))?;
    // Some deployments prefix a data URL header
    let payload = encoded
        .split_once("base64,")
        .map_or(encoded.as_str(), |(_, data)| data);
    let bytes = TransportEncoder::from_base64(payload)
        .map_err(|e| BannerError::generation_failed(format!("undecodable image payload: {}", e)))?;
    let image = TransportEncoder::decode(&bytes)
        .map_err(|e| BannerError::generation_failed(format!("unreadable generated image: {}", e)))?;
    Ok(image.to_rgb8())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BannerError::external_service(
        SERVICE,
        format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
    ))
}

/// Background synthesizer backed by a running diffusion server
#[derive(Debug, Clone)]
pub struct DiffusionServerSynthesizer {
    client: reqwest::Client,
    base_url: String,
    checkpoint: String,
    strategy: SynthesisStrategy,
    name: String,
}

impl DiffusionServerSynthesizer {
    /// Select `checkpoint` on the server and return a ready synthesizer
    ///
    /// # Errors
    /// `ResourceUnavailable` when the server cannot load the checkpoint.
    pub async fn connect(
        client: reqwest::Client,
        base_url: &str,
        checkpoint: &str,
        strategy: SynthesisStrategy,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        tracing::info!(checkpoint, url = %base_url, "loading diffusion checkpoint");

        let response = client
            .post(format!("{}/sdapi/v1/options", base_url))
            .json(&OptionsRequest {
                sd_model_checkpoint: checkpoint,
            })
            .send()
            .await
            .map_err(|e| {
                BannerError::resource_unavailable(format!(
                    "diffusion server unreachable while loading '{}': {}",
                    checkpoint, e
                ))
            })?;
        check_status(response).await.map_err(|e| {
            BannerError::resource_unavailable(format!(
                "diffusion server could not load '{}': {}",
                checkpoint, e
            ))
        })?;

        Ok(Self {
            client,
            name: format!("diffusion:{}", checkpoint),
            base_url,
            checkpoint: checkpoint.to_string(),
            strategy,
        })
    }

    #[must_use]
    pub fn checkpoint(&self) -> &str {
        &self.checkpoint
    }

    async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<RgbImage> {
        let response = self
            .client
            .post(format!("{}/sdapi/v1/{}", self.base_url, endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| BannerError::from_http(SERVICE, &e))?;
        let parsed: GenerationResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BannerError::generation_failed(format!("malformed response: {}", e)))?;
        first_image(parsed)
    }

    fn encode(image: DynamicImage) -> Result<String> {
        Ok(TransportEncoder::to_base64(&TransportEncoder::encode_png(&image)?))
    }
}

#[async_trait]
impl BackgroundSynthesizer for DiffusionServerSynthesizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> SynthesisStrategy {
        self.strategy
    }

    #[instrument(skip_all, fields(backend = %self.name))]
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbImage> {
        let (width, height) = request.output_size.as_tuple();
        let image = match self.strategy {
            SynthesisStrategy::TextToImage => {
                let body = TextToImageRequest {
                    prompt: &request.prompt,
                    width,
                    height,
                    cfg_scale: request.guidance_scale,
                    steps: request.steps,
                };
                self.post("txt2img", &body).await
            },
            SynthesisStrategy::Inpaint => {
                request
                    .mask
                    .expect_polarity(MaskPolarity::RegenerateHigh, "synthesize")?;
                request.mask.expect_dimensions(
                    request.foreground.dimensions(),
                    "synthesize",
                )?;
                let body = InpaintRequest {
                    prompt: &request.prompt,
                    init_images: vec![Self::encode(DynamicImage::ImageRgb8(
                        request.foreground.clone(),
                    ))?],
                    mask: Self::encode(DynamicImage::ImageLuma8(request.mask.image().clone()))?,
                    width,
                    height,
                    cfg_scale: request.guidance_scale,
                    steps: request.steps,
                    denoising_strength: 1.0,
                    inpainting_fill: INPAINT_FILL_ORIGINAL,
                    inpainting_mask_invert: 0,
                    inpaint_full_res: false,
                    mask_blur: 0,
                };
                self.post("img2img", &body).await
            },
        }?;
        Ok(request.fit_output(image))
    }
}
