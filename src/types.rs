//! Core data types passed between pipeline stages

use crate::error::{BannerError, Result};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Channel mode of an in-memory raster image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMode {
    Rgb,
    Rgba,
    Gray,
}

impl ImageMode {
    /// Mode of a decoded image, or `None` for layouts the pipeline never accepts
    /// (16-bit and float buffers are converted before entering a stage)
    #[must_use]
    pub fn of(image: &DynamicImage) -> Option<Self> {
        match image {
            DynamicImage::ImageRgb8(_) => Some(Self::Rgb),
            DynamicImage::ImageRgba8(_) => Some(Self::Rgba),
            DynamicImage::ImageLuma8(_) => Some(Self::Gray),
            _ => None,
        }
    }
}

impl fmt::Display for ImageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgb => write!(f, "RGB"),
            Self::Rgba => write!(f, "RGBA"),
            Self::Gray => write!(f, "L"),
        }
    }
}

/// Check that an image has the mode a stage expects
///
/// # Errors
/// `InvalidInput` naming the stage and both modes when they differ.
pub fn expect_mode(image: &DynamicImage, expected: ImageMode, stage: &str) -> Result<()> {
    match ImageMode::of(image) {
        Some(mode) if mode == expected => Ok(()),
        Some(mode) => Err(BannerError::invalid_input(format!(
            "{} expects a {} image, got {}",
            stage, expected, mode
        ))),
        None => Err(BannerError::invalid_input(format!(
            "{} expects a {} image, got {:?}",
            stage,
            expected,
            image.color()
        ))),
    }
}

/// Extracted product subject.
///
/// Alpha encodes foreground membership: 0 is background, anything above 0 is
/// foreground, with intermediate values at soft edges. Downstream stages only
/// read it; the pixel content is never altered after extraction.
#[derive(Debug, Clone)]
pub struct SubjectImage {
    image: RgbaImage,
}

impl SubjectImage {
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Alpha channel as a single-channel image
    #[must_use]
    pub fn alpha(&self) -> GrayImage {
        let (width, height) = self.image.dimensions();
        GrayImage::from_fn(width, height, |x, y| image::Luma([self.image.get_pixel(x, y)[3]]))
    }

    /// Color channels without alpha
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        DynamicImage::ImageRgba8(self.image.clone()).to_rgb8()
    }

    #[must_use]
    pub fn into_inner(self) -> RgbaImage {
        self.image
    }
}

/// What a high mask value means.
///
/// The crate-wide convention is [`MaskPolarity::RegenerateHigh`]: 255 marks
/// pixels the synthesizer must fill in (background), 0 marks pixels to
/// preserve (product). Masks with the other polarity only exist transiently
/// inside extractors and must be converted before crossing a stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskPolarity {
    RegenerateHigh,
    PreserveHigh,
}

impl MaskPolarity {
    #[must_use]
    pub fn inverted(self) -> Self {
        match self {
            Self::RegenerateHigh => Self::PreserveHigh,
            Self::PreserveHigh => Self::RegenerateHigh,
        }
    }
}

/// Single-channel mask tagged with its polarity
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    image: GrayImage,
    polarity: MaskPolarity,
}

impl Mask {
    /// Wrap a grayscale buffer in the canonical polarity
    #[must_use]
    pub fn regenerate_high(image: GrayImage) -> Self {
        Self {
            image,
            polarity: MaskPolarity::RegenerateHigh,
        }
    }

    #[must_use]
    pub fn with_polarity(image: GrayImage, polarity: MaskPolarity) -> Self {
        Self { image, polarity }
    }

    #[must_use]
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    #[must_use]
    pub fn polarity(&self) -> MaskPolarity {
        self.polarity
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Flip polarity by inverting every pixel
    #[must_use]
    pub fn invert(&self) -> Self {
        let mut image = self.image.clone();
        for pixel in image.pixels_mut() {
            pixel[0] = 255 - pixel[0];
        }
        Self {
            image,
            polarity: self.polarity.inverted(),
        }
    }

    /// Convert to the requested polarity, inverting only when needed
    #[must_use]
    pub fn into_polarity(self, polarity: MaskPolarity) -> Self {
        if self.polarity == polarity {
            self
        } else {
            self.invert()
        }
    }

    /// Boundary assertion for mask consumers
    ///
    /// # Errors
    /// `InvalidInput` if the mask carries the other polarity.
    pub fn expect_polarity(&self, polarity: MaskPolarity, stage: &str) -> Result<()> {
        if self.polarity == polarity {
            Ok(())
        } else {
            Err(BannerError::invalid_input(format!(
                "{} received a {:?} mask, expected {:?}",
                stage, self.polarity, polarity
            )))
        }
    }

    /// Boundary assertion that the mask qualifies an image of the given size
    ///
    /// # Errors
    /// `InvalidInput` on a dimension mismatch.
    pub fn expect_dimensions(&self, dimensions: (u32, u32), stage: &str) -> Result<()> {
        if self.image.dimensions() == dimensions {
            Ok(())
        } else {
            Err(BannerError::invalid_input(format!(
                "{} received a {}x{} mask for a {}x{} image",
                stage,
                self.image.width(),
                self.image.height(),
                dimensions.0,
                dimensions.1
            )))
        }
    }

    #[must_use]
    pub fn into_inner(self) -> GrayImage {
        self.image
    }
}

/// Output of the foreground extractor
#[derive(Debug, Clone)]
pub struct Extraction {
    pub subject: SubjectImage,
    /// Standalone inpainting mask, produced by the segmentation method only.
    /// Always in [`MaskPolarity::RegenerateHigh`] and source-image sized.
    pub mask: Option<Mask>,
}

/// Fixed place categories derived from the menu name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceCategory {
    Cafe,
    KoreanRestaurant,
    JapaneseRestaurant,
    WesternRestaurant,
    FastFood,
    DessertCafe,
    Generic,
}

impl PlaceCategory {
    #[must_use]
    pub fn korean_phrase(self) -> &'static str {
        match self {
            Self::Cafe => "아늑한 카페 내부",
            Self::KoreanRestaurant => "현실적인 한식당 내부",
            Self::JapaneseRestaurant => "정통적인 일식당 내부",
            Self::WesternRestaurant => "서양식 레스토랑 내부",
            Self::FastFood => "패스트푸드점 내부",
            Self::DessertCafe => "디저트 카페 내부",
            Self::Generic => "현실적인 식당이나 매장 내부",
        }
    }

    #[must_use]
    pub fn english_phrase(self) -> &'static str {
        match self {
            Self::Cafe => "cozy café interior",
            Self::KoreanRestaurant => "realistic Korean-restaurant interior",
            Self::JapaneseRestaurant => "traditional Japanese-restaurant interior",
            Self::WesternRestaurant => "Western-style restaurant interior",
            Self::FastFood => "fast-food interior",
            Self::DessertCafe => "dessert café interior",
            Self::Generic => "realistic restaurant or shop interior",
        }
    }
}

/// Copy tone. Unknown tones are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    Warm,
    Humor,
    Premium,
    Plain,
    Other(String),
}

impl Tone {
    /// Parse a tone label; Korean labels are canonical, English aliases accepted
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "따뜻함" | "warm" => Self::Warm,
            "유머" | "humor" => Self::Humor,
            "프리미엄" | "premium" => Self::Premium,
            "담백" | "plain" => Self::Plain,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_premium(&self) -> bool {
        matches!(self, Self::Premium)
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Warm => "따뜻함",
            Self::Humor => "유머",
            Self::Premium => "프리미엄",
            Self::Plain => "담백",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Publishing channel. Unknown channels are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Feed,
    Story,
    Other(String),
}

impl Channel {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "피드" | "feed" => Self::Feed,
            "스토리" | "story" => Self::Story,
            other => Self::Other(other.to_string()),
        }
    }

    /// Upscale factor for final delivery: feed posts get 2x, everything else 3x
    #[must_use]
    pub fn upscale_factor(&self) -> u32 {
        match self {
            Self::Feed => 2,
            _ => 3,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Feed => "피드",
            Self::Story => "스토리",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the call-to-action box is anchored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPosition {
    /// Bottom-left
    #[default]
    Auto,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl std::str::FromStr for OverlayPosition {
    type Err = BannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" | "" => Ok(Self::Auto),
            "top_left" => Ok(Self::TopLeft),
            "top_right" => Ok(Self::TopRight),
            "bottom_left" => Ok(Self::BottomLeft),
            "bottom_right" => Ok(Self::BottomRight),
            other => Err(BannerError::invalid_argument(format!(
                "unknown overlay position '{}' (expected auto, top_left, top_right, bottom_left, bottom_right)",
                other
            ))),
        }
    }
}

/// All per-call inputs of one banner run. Immutable once built.
#[derive(Debug, Clone)]
pub struct BannerRequest {
    pub product: Vec<u8>,
    pub person: Option<Vec<u8>>,
    pub background: Option<Vec<u8>>,
    pub menu: String,
    pub context: String,
    pub tone: Tone,
    pub channel: Channel,
    pub text_overlay: String,
    pub position: OverlayPosition,
    /// Free-text styling hint for the overlay, sent to multimodal backends
    pub overlay_style: Option<String>,
    pub required_words: Vec<String>,
    pub banned_words: Vec<String>,
}

impl BannerRequest {
    #[must_use]
    pub fn builder(product: Vec<u8>) -> BannerRequestBuilder {
        BannerRequestBuilder::new(product)
    }

    /// Overlay text actually drawn: the caller's text, or a menu-based default
    #[must_use]
    pub fn effective_overlay_text(&self) -> String {
        if self.text_overlay.is_empty() {
            format!("{} - 오늘의 추천 메뉴", self.menu)
        } else {
            self.text_overlay.clone()
        }
    }
}

/// Builder for [`BannerRequest`]
#[derive(Debug)]
pub struct BannerRequestBuilder {
    request: BannerRequest,
}

impl BannerRequestBuilder {
    #[must_use]
    pub fn new(product: Vec<u8>) -> Self {
        Self {
            request: BannerRequest {
                product,
                person: None,
                background: None,
                menu: String::new(),
                context: String::new(),
                tone: Tone::Plain,
                channel: Channel::Feed,
                text_overlay: String::new(),
                position: OverlayPosition::Auto,
                overlay_style: None,
                required_words: Vec::new(),
                banned_words: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn menu<S: Into<String>>(mut self, menu: S) -> Self {
        self.request.menu = menu.into();
        self
    }

    #[must_use]
    pub fn context<S: Into<String>>(mut self, context: S) -> Self {
        self.request.context = context.into();
        self
    }

    #[must_use]
    pub fn tone(mut self, tone: &str) -> Self {
        self.request.tone = Tone::parse(tone);
        self
    }

    #[must_use]
    pub fn channel(mut self, channel: &str) -> Self {
        self.request.channel = Channel::parse(channel);
        self
    }

    #[must_use]
    pub fn text_overlay<S: Into<String>>(mut self, text: S) -> Self {
        self.request.text_overlay = text.into();
        self
    }

    #[must_use]
    pub fn position(mut self, position: OverlayPosition) -> Self {
        self.request.position = position;
        self
    }

    #[must_use]
    pub fn overlay_style<S: Into<String>>(mut self, style: S) -> Self {
        self.request.overlay_style = Some(style.into());
        self
    }

    #[must_use]
    pub fn person(mut self, bytes: Vec<u8>) -> Self {
        self.request.person = Some(bytes);
        self
    }

    #[must_use]
    pub fn background(mut self, bytes: Vec<u8>) -> Self {
        self.request.background = Some(bytes);
        self
    }

    #[must_use]
    pub fn required_words(mut self, words: Vec<String>) -> Self {
        self.request.required_words = words;
        self
    }

    #[must_use]
    pub fn banned_words(mut self, words: Vec<String>) -> Self {
        self.request.banned_words = words;
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// `InvalidInput` when the product image is empty.
    pub fn build(self) -> Result<BannerRequest> {
        if self.request.product.is_empty() {
            return Err(BannerError::invalid_input("product image bytes are empty"));
        }
        Ok(self.request)
    }
}

/// Per-stage wall clock timings for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub extract_ms: u64,
    pub prepare_mask_ms: u64,
    pub compose_prompt_ms: u64,
    pub synthesize_ms: u64,
    pub composite_ms: u64,
    pub overlay_text_ms: u64,
    pub upscale_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

impl StageTimings {
    pub(crate) fn record(&mut self, stage: crate::error::Stage, elapsed: Duration) {
        use crate::error::Stage;
        let ms = elapsed.as_millis() as u64;
        match stage {
            Stage::Extract => self.extract_ms = ms,
            Stage::PrepareMask => self.prepare_mask_ms = ms,
            Stage::ComposePrompt => self.compose_prompt_ms = ms,
            Stage::Synthesize => self.synthesize_ms = ms,
            Stage::Composite => self.composite_ms = ms,
            Stage::OverlayText => self.overlay_text_ms = ms,
            Stage::Upscale => self.upscale_ms = ms,
            Stage::Encode => self.encode_ms = ms,
        }
    }
}

/// Final banner: encoded PNG bytes plus run metadata
#[derive(Debug, Clone)]
pub struct BannerResult {
    pub png: Vec<u8>,
    pub dimensions: (u32, u32),
    pub timings: StageTimings,
}

impl BannerResult {
    /// Transport-safe representation of the PNG
    #[must_use]
    pub fn to_base64(&self) -> String {
        crate::services::TransportEncoder::to_base64(&self.png)
    }

    /// JSON body returned across the HTTP boundary
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "image_base64": self.to_base64() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_invert_flips_polarity_and_pixels() {
        let mut gray = GrayImage::new(2, 1);
        gray.put_pixel(0, 0, image::Luma([0]));
        gray.put_pixel(1, 0, image::Luma([200]));
        let mask = Mask::with_polarity(gray, MaskPolarity::PreserveHigh);

        let canonical = mask.into_polarity(MaskPolarity::RegenerateHigh);
        assert_eq!(canonical.polarity(), MaskPolarity::RegenerateHigh);
        assert_eq!(canonical.image().get_pixel(0, 0)[0], 255);
        assert_eq!(canonical.image().get_pixel(1, 0)[0], 55);

        // Already canonical: no inversion
        let again = canonical.clone().into_polarity(MaskPolarity::RegenerateHigh);
        assert_eq!(again, canonical);
    }

    #[test]
    fn test_mask_boundary_assertions() {
        let mask = Mask::with_polarity(GrayImage::new(4, 4), MaskPolarity::PreserveHigh);
        assert!(mask
            .expect_polarity(MaskPolarity::RegenerateHigh, "synthesize")
            .is_err());
        assert!(mask.expect_dimensions((4, 4), "composite").is_ok());
        assert!(mask.expect_dimensions((4, 5), "composite").is_err());
    }

    #[test]
    fn test_expect_mode() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::new(1, 1));
        assert!(expect_mode(&rgb, ImageMode::Rgb, "prepare").is_ok());
        let err = expect_mode(&rgb, ImageMode::Rgba, "prepare").unwrap_err();
        assert!(err.to_string().contains("RGBA"));
    }

    #[test]
    fn test_tone_and_channel_parsing() {
        assert!(Tone::parse("프리미엄").is_premium());
        assert!(!Tone::parse("따뜻함").is_premium());
        assert_eq!(Tone::parse("몽환적"), Tone::Other("몽환적".to_string()));
        assert_eq!(Channel::parse("피드").upscale_factor(), 2);
        assert_eq!(Channel::parse("스토리").upscale_factor(), 3);
        assert_eq!(Channel::parse("릴스").upscale_factor(), 3);
    }

    #[test]
    fn test_overlay_fallback_text() {
        let request = BannerRequest::builder(vec![1, 2, 3])
            .menu("우동")
            .build()
            .unwrap();
        assert_eq!(request.effective_overlay_text(), "우동 - 오늘의 추천 메뉴");

        let request = BannerRequest::builder(vec![1])
            .menu("우동")
            .text_overlay("오늘만 1+1")
            .build()
            .unwrap();
        assert_eq!(request.effective_overlay_text(), "오늘만 1+1");

        // Only empty text falls back; whitespace is drawn as given
        let request = BannerRequest::builder(vec![1])
            .menu("우동")
            .text_overlay("  ")
            .build()
            .unwrap();
        assert_eq!(request.effective_overlay_text(), "  ");
    }

    #[test]
    fn test_overlay_position_parsing() {
        assert_eq!("auto".parse::<OverlayPosition>().unwrap(), OverlayPosition::Auto);
        assert_eq!(
            "top-right".parse::<OverlayPosition>().unwrap(),
            OverlayPosition::TopRight
        );
        assert!("middle".parse::<OverlayPosition>().is_err());
    }

    #[test]
    fn test_empty_product_rejected() {
        let err = BannerRequest::builder(Vec::new()).build().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }
}
