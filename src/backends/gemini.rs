//! Remote multimodal synthesis backend (Gemini `generateContent`)
//!
//! One text part carries the scene prompt and optional overlay style; up to
//! three inline image parts carry the product and optional person/background
//! references. The response is parsed into typed candidates and parts; a reply
//! without inline image data is a generation failure. The model renders at its
//! own resolution, so the decoded image is resampled to the requested size.

use crate::config::{CanvasSize, SynthesisStrategy};
use crate::error::{BannerError, Result};
use crate::inference::{BackgroundSynthesizer, SynthesisRequest};
use crate::services::TransportEncoder;
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::instrument;

const SERVICE: &str = "gemini";

/// Maximum inline reference images per request
pub const MAX_REFERENCE_IMAGES: usize = 3;

const IMAGE_SIZE: &str = "1K";

/// Aspect ratios the image model accepts
const ASPECT_RATIOS: [(&str, u32, u32); 10] = [
    ("1:1", 1, 1),
    ("2:3", 2, 3),
    ("3:2", 3, 2),
    ("3:4", 3, 4),
    ("4:3", 4, 3),
    ("4:5", 4, 5),
    ("5:4", 5, 4),
    ("9:16", 9, 16),
    ("16:9", 16, 9),
    ("21:9", 21, 9),
];

/// Supported aspect ratio closest to `size`, compared in log space
#[must_use]
pub fn aspect_ratio_for(size: CanvasSize) -> &'static str {
    let target = (f64::from(size.width) / f64::from(size.height)).ln();
    ASPECT_RATIOS
        .iter()
        .min_by(|a, b| {
            let da = ((f64::from(a.1) / f64::from(a.2)).ln() - target).abs();
            let db = ((f64::from(b.1) / f64::from(b.2)).ln() - target).abs();
            da.total_cmp(&db)
        })
        .map_or("1:1", |&(label, _, _)| label)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// A content part carries either text or inline binary data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    /// Part kinds this client does not use
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// First inline image across all candidates
    #[must_use]
    pub fn first_image(&self) -> Option<&InlineData> {
        self.candidates
            .iter()
            .flat_map(|c| c.content.parts.iter())
            .find_map(|part| match part {
                Part::InlineData { inline_data } => Some(inline_data),
                _ => None,
            })
    }

    /// Concatenated text parts, useful when the model refuses
    #[must_use]
    pub fn text(&self) -> String {
        self.candidates
            .iter()
            .flat_map(|c| c.content.parts.iter())
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: &'static str,
    image_size: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    image_config: ImageConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

/// Sniff a MIME type from magic bytes, defaulting to PNG
fn mime_for(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => "image/png",
    }
}

fn prompt_text(request: &SynthesisRequest) -> String {
    match request.overlay_style.as_deref().map(str::trim) {
        Some(style) if !style.is_empty() => {
            format!("{}\nText overlay style: {}", request.prompt, style)
        },
        _ => request.prompt.clone(),
    }
}

fn build_request(request: &SynthesisRequest) -> Result<GenerateContentRequest> {
    let mut parts = vec![Part::Text {
        text: prompt_text(request),
    }];

    let mut references: Vec<Vec<u8>> = request
        .references
        .iter()
        .take(MAX_REFERENCE_IMAGES)
        .cloned()
        .collect();
    if references.is_empty() {
        references.push(TransportEncoder::encode_png(&DynamicImage::ImageRgb8(
            request.foreground.clone(),
        ))?);
    }

    for bytes in references {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: mime_for(&bytes).to_string(),
                data: TransportEncoder::to_base64(&bytes),
            },
        });
    }

    Ok(GenerateContentRequest {
        contents: vec![Content {
            parts,
            role: Some("user".to_string()),
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["TEXT", "IMAGE"],
            image_config: ImageConfig {
                aspect_ratio: aspect_ratio_for(request.output_size),
                image_size: IMAGE_SIZE,
            },
        },
    })
}

/// Decode the inline image of a response
///
/// # Errors
/// `GenerationFailed` when no part carries image data or it does not decode.
pub fn decode_response(response: &GenerateContentResponse) -> Result<RgbImage> {
    let inline = response.first_image().ok_or_else(|| {
        let text = response.text();
        if text.is_empty() {
            BannerError::generation_failed("gemini returned no image data")
        } else {
            BannerError::generation_failed(format!("gemini returned no image data: {}", text))
        }
    })?;
    let bytes = TransportEncoder::from_base64(&inline.data)
        .map_err(|e| BannerError::generation_failed(e.to_string()))?;
    let image = TransportEncoder::decode(&bytes)
        .map_err(|e| BannerError::generation_failed(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Background synthesizer backed by a hosted multimodal model
#[derive(Debug, Clone)]
pub struct GeminiSynthesizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    name: String,
}

impl GeminiSynthesizer {
    /// # Errors
    /// `ResourceUnavailable` without an API key.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
    ) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.is_empty()).ok_or_else(|| {
            BannerError::resource_unavailable("GEMINI_API_KEY is not set for the gemini backend")
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            name: format!("gemini:{}", model),
        })
    }
}

#[async_trait]
impl BackgroundSynthesizer for GeminiSynthesizer {
    fn name(&self) -> &str {
        &self.name
    }

    /// The hosted model edits the product image in place
    fn strategy(&self) -> SynthesisStrategy {
        SynthesisStrategy::Inpaint
    }

    #[instrument(skip_all, fields(backend = %self.name))]
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbImage> {
        let body = build_request(request)?;
        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| BannerError::from_http(SERVICE, &e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BannerError::external_service(
                SERVICE,
                format!("HTTP {}: {}", status, detail.chars().take(200).collect::<String>()),
            ));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| BannerError::generation_failed(format!("malformed response: {}", e)))?;
        let image = decode_response(&parsed)?;
        Ok(request.fit_output(image))
    }
}
