//! Compositing and call-to-action text overlay

use crate::error::{BannerError, Result};
use crate::types::{OverlayPosition, Tone};
use ab_glyph::{FontArc, FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Pixel, Rgba, RgbaImage};
use std::path::{Path, PathBuf};

/// Font height as a fraction of image height
pub const FONT_SCALE: f32 = 0.06;

/// Gap between box edge and image edge, and between box edge and text
pub const OVERLAY_PADDING: u32 = 24;

/// Faces tried when the configured font is missing
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/nanum/NanumGothic.ttf",
    "/System/Library/Fonts/AppleSDGothicNeo.ttc",
    "C:\\Windows\\Fonts\\malgun.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
];

/// Alpha-over `foreground` onto `background`
///
/// With `resize_to_match`, a differently sized foreground is resampled to the
/// background size first. The output always has the background's dimensions.
///
/// # Errors
/// `InvalidArgument` when sizes differ and `resize_to_match` is off.
pub fn composite(
    background: &DynamicImage,
    foreground: &RgbaImage,
    resize_to_match: bool,
) -> Result<RgbaImage> {
    let mut canvas = background.to_rgba8();
    let target = canvas.dimensions();

    if foreground.dimensions() == target {
        imageops::overlay(&mut canvas, foreground, 0, 0);
    } else if resize_to_match {
        let resized = imageops::resize(foreground, target.0, target.1, FilterType::Lanczos3);
        imageops::overlay(&mut canvas, &resized, 0, 0);
    } else {
        return Err(BannerError::invalid_argument(format!(
            "foreground {}x{} does not match background {}x{}",
            foreground.width(),
            foreground.height(),
            target.0,
            target.1
        )));
    }
    Ok(canvas)
}

/// Text and box colors for a tone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayColors {
    pub text: Rgba<u8>,
    pub r#box: Rgba<u8>,
}

impl OverlayColors {
    /// Light text on a dark translucent box for premium tones, dark on light otherwise
    #[must_use]
    pub fn for_tone(tone: &Tone) -> Self {
        if tone.is_premium() {
            Self {
                text: Rgba([255, 255, 255, 255]),
                r#box: Rgba([0, 0, 0, 120]),
            }
        } else {
            Self {
                text: Rgba([20, 20, 20, 255]),
                r#box: Rgba([255, 255, 255, 160]),
            }
        }
    }
}

/// Draws overlay text with a preloaded face
#[derive(Clone)]
pub struct TextRenderer {
    font: Option<FontArc>,
    source: Option<PathBuf>,
}

impl std::fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRenderer")
            .field("source", &self.source)
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

fn load_face(path: &Path) -> Option<FontArc> {
    let data = std::fs::read(path).ok()?;
    match FontVec::try_from_vec_and_index(data, 0) {
        Ok(face) => Some(FontArc::new(face)),
        Err(e) => {
            tracing::warn!(font = %path.display(), error = %e, "unreadable font face");
            None
        },
    }
}

impl TextRenderer {
    /// Load the preferred face, falling back to system faces.
    ///
    /// Never fails: with no usable face the renderer still draws the box.
    #[must_use]
    pub fn load(preferred: Option<&Path>) -> Self {
        let candidates = preferred
            .into_iter()
            .map(Path::to_path_buf)
            .chain(SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from));

        for path in candidates {
            if let Some(font) = load_face(&path) {
                tracing::debug!(font = %path.display(), "loaded overlay font");
                return Self {
                    font: Some(font),
                    source: Some(path),
                };
            }
        }

        tracing::warn!("no overlay font available, text will be omitted from banners");
        Self::without_font()
    }

    /// Renderer with no face; draws the box only
    #[must_use]
    pub fn without_font() -> Self {
        Self {
            font: None,
            source: None,
        }
    }

    #[must_use]
    pub fn with_font(font: FontArc) -> Self {
        Self {
            font: Some(font),
            source: None,
        }
    }

    #[must_use]
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn measure(&self, text: &str, scale: PxScale) -> (u32, u32) {
        match &self.font {
            Some(font) => imageproc::drawing::text_size(scale, font, text),
            // Rough metrics so the box keeps a sensible footprint
            None => (
                (text.chars().count() as f32 * scale.x * 0.6).ceil() as u32,
                scale.y.ceil() as u32,
            ),
        }
    }

    /// Draw `text` in a translucent box anchored at `position`
    ///
    /// Empty text returns an identical copy of `image`.
    #[must_use]
    pub fn overlay_text(
        &self,
        image: &RgbaImage,
        text: &str,
        tone: &Tone,
        position: OverlayPosition,
    ) -> RgbaImage {
        let mut out = image.clone();
        if text.is_empty() {
            return out;
        }

        let (width, height) = out.dimensions();
        let font_px = (height as f32 * FONT_SCALE).round().max(1.0);
        let scale = PxScale::from(font_px);
        let colors = OverlayColors::for_tone(tone);

        let (text_w, text_h) = self.measure(text, scale);
        let box_w = text_w + OVERLAY_PADDING * 2;
        let box_h = text_h + OVERLAY_PADDING * 2;
        let (x, y) = anchor(position, (width, height), (box_w, box_h));

        blend_rect(&mut out, x, y, box_w, box_h, colors.r#box);

        if let Some(font) = &self.font {
            imageproc::drawing::draw_text_mut(
                &mut out,
                colors.text,
                (x + OVERLAY_PADDING) as i32,
                (y + OVERLAY_PADDING) as i32,
                scale,
                font,
                text,
            );
        }
        out
    }
}

/// Top-left corner of the box for a position
fn anchor(position: OverlayPosition, image: (u32, u32), size: (u32, u32)) -> (u32, u32) {
    let left = OVERLAY_PADDING;
    let top = OVERLAY_PADDING;
    let right = image.0.saturating_sub(size.0 + OVERLAY_PADDING);
    let bottom = image.1.saturating_sub(size.1 + OVERLAY_PADDING);
    match position {
        OverlayPosition::Auto | OverlayPosition::BottomLeft => (left, bottom),
        OverlayPosition::TopLeft => (left, top),
        OverlayPosition::TopRight => (right, top),
        OverlayPosition::BottomRight => (right, bottom),
    }
}

fn blend_rect(image: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    for py in y..(y + h).min(height) {
        for px in x..(x + w).min(width) {
            image.get_pixel_mut(px, py).blend(&color);
        }
    }
}
