//! Mask preparation: alpha thresholding, edge softening and canvas fitting
//!
//! All masks leaving this module use [`MaskPolarity::RegenerateHigh`]: 255
//! marks the area the synthesizer fills in, 0 marks the product. Letterbox
//! padding is therefore 255 in the mask and transparent in the subject.

use crate::config::CanvasSize;
use crate::error::{BannerError, Result};
use crate::types::{Mask, MaskPolarity, SubjectImage};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Pixel, Rgba, RgbImage, RgbaImage};

const STAGE: &str = "mask preparation";

/// Parameters for [`prepare_inpainting_inputs`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskParams {
    pub canvas: CanvasSize,
    /// Gaussian sigma for boundary softening; 0 keeps exact binary edges
    pub blur_radius: f32,
    /// Alpha strictly above this is foreground
    pub alpha_threshold: u8,
    /// Letterbox instead of stretching to the canvas
    pub preserve_aspect: bool,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            canvas: CanvasSize::square(512),
            blur_radius: 5.0,
            alpha_threshold: 0,
            preserve_aspect: true,
        }
    }
}

impl MaskParams {
    fn validate(&self) -> Result<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(BannerError::invalid_argument(format!(
                "target canvas must be positive, got {}",
                self.canvas
            )));
        }
        if !self.blur_radius.is_finite() || self.blur_radius < 0.0 {
            return Err(BannerError::config_value_error(
                "blur radius",
                self.blur_radius,
                ">= 0",
                Some(5.0),
            ));
        }
        Ok(())
    }
}

/// Canvas-sized inputs for the synthesizer and compositor
#[derive(Debug, Clone)]
pub struct PreparedInputs {
    /// Product flattened to RGB on the canvas (padding is black)
    pub foreground: RgbImage,
    /// Region to regenerate, canvas sized
    pub mask: Mask,
    /// Product with alpha on the canvas, used as the compositing layer
    pub subject: RgbaImage,
}

/// Binary mask from an alpha channel: foreground (alpha > threshold) becomes 0,
/// everything else 255
#[must_use]
pub fn mask_from_alpha(alpha: &GrayImage, threshold: u8) -> Mask {
    let (width, height) = alpha.dimensions();
    let binary = GrayImage::from_fn(width, height, |x, y| {
        if alpha.get_pixel(x, y)[0] > threshold {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    Mask::regenerate_high(binary)
}

/// Soften mask edges with a Gaussian blur; radius 0 returns the mask unchanged
#[must_use]
pub fn soften(mask: &Mask, radius: f32) -> Mask {
    if radius <= 0.0 {
        return mask.clone();
    }
    let blurred = imageproc::filter::gaussian_blur_f32(mask.image(), radius);
    Mask::with_polarity(blurred, mask.polarity())
}

/// Placement of a letterboxed image inside the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
    pub scaled: (u32, u32),
    pub offset: (u32, u32),
}

impl Letterbox {
    /// Fit `source` inside `canvas` preserving aspect ratio, centered
    #[must_use]
    pub fn fit(source: (u32, u32), canvas: CanvasSize) -> Self {
        let (w, h) = (source.0.max(1) as f64, source.1.max(1) as f64);
        let scale = (f64::from(canvas.width) / w).min(f64::from(canvas.height) / h);
        let scaled_w = ((w * scale).round() as u32).clamp(1, canvas.width);
        let scaled_h = ((h * scale).round() as u32).clamp(1, canvas.height);
        Self {
            scaled: (scaled_w, scaled_h),
            offset: ((canvas.width - scaled_w) / 2, (canvas.height - scaled_h) / 2),
        }
    }

    /// Layout that fills the whole canvas (stretching)
    #[must_use]
    pub fn stretch(canvas: CanvasSize) -> Self {
        Self {
            scaled: (canvas.width, canvas.height),
            offset: (0, 0),
        }
    }
}

fn place<P>(
    image: &image::ImageBuffer<P, Vec<u8>>,
    layout: Letterbox,
    canvas: CanvasSize,
    fill: P,
) -> image::ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let resized = if image.dimensions() == layout.scaled {
        image.clone()
    } else {
        imageops::resize(image, layout.scaled.0, layout.scaled.1, FilterType::Lanczos3)
    };
    let mut out = image::ImageBuffer::from_pixel(canvas.width, canvas.height, fill);
    imageops::replace(
        &mut out,
        &resized,
        i64::from(layout.offset.0),
        i64::from(layout.offset.1),
    );
    out
}

/// Letterbox an RGBA image onto a transparent canvas
#[must_use]
pub fn resize_with_padding(image: &RgbaImage, canvas: CanvasSize) -> RgbaImage {
    let layout = Letterbox::fit(image.dimensions(), canvas);
    place(image, layout, canvas, Rgba([0, 0, 0, 0]))
}

/// Derive canvas-sized foreground and mask from the subject's alpha channel
///
/// # Errors
/// `InvalidArgument` for a zero-sized canvas or a negative blur radius.
pub fn prepare_inpainting_inputs(
    subject: &SubjectImage,
    params: &MaskParams,
) -> Result<PreparedInputs> {
    params.validate()?;
    let mask = mask_from_alpha(&subject.alpha(), params.alpha_threshold);
    fit_to_canvas(subject, &mask, params)
}

/// Same as [`prepare_inpainting_inputs`], but with a mask supplied by the extractor
///
/// # Errors
/// - `InvalidArgument` for bad parameters
/// - `InvalidInput` if the mask is not canonical or not subject sized
pub fn prepare_with_mask(
    subject: &SubjectImage,
    mask: &Mask,
    params: &MaskParams,
) -> Result<PreparedInputs> {
    params.validate()?;
    mask.expect_polarity(MaskPolarity::RegenerateHigh, STAGE)?;
    mask.expect_dimensions(subject.dimensions(), STAGE)?;
    fit_to_canvas(subject, mask, params)
}

fn fit_to_canvas(
    subject: &SubjectImage,
    mask: &Mask,
    params: &MaskParams,
) -> Result<PreparedInputs> {
    let canvas = params.canvas;
    let layout = if params.preserve_aspect {
        Letterbox::fit(subject.dimensions(), canvas)
    } else {
        Letterbox::stretch(canvas)
    };

    let softened = soften(mask, params.blur_radius);
    let mask_image = place(softened.image(), layout, canvas, Luma([255]));
    let subject_canvas = place(subject.image(), layout, canvas, Rgba([0, 0, 0, 0]));
    let foreground = RgbImage::from_fn(canvas.width, canvas.height, |x, y| {
        subject_canvas.get_pixel(x, y).to_rgb()
    });

    let prepared = PreparedInputs {
        foreground,
        mask: Mask::regenerate_high(mask_image),
        subject: subject_canvas,
    };
    prepared
        .mask
        .expect_dimensions(prepared.foreground.dimensions(), STAGE)?;
    Ok(prepared)
}
