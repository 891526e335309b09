//! Tensor conversion shared by the ONNX-backed providers
//!
//! Images go in as letterboxed NCHW tensors and model output maps come back
//! through the inverse of the same letterbox transform.

use crate::error::{BannerError, Result};
use image::{imageops, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::{Array4, ArrayView2};

/// Per-model normalization constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    /// Divide pixel values by 255 before normalizing
    pub unit_range: bool,
}

impl Normalization {
    /// `(x / 255 - 0.5) / 1.0`, the general matting convention
    pub const MATTING: Self = Self {
        mean: [0.5, 0.5, 0.5],
        std: [1.0, 1.0, 1.0],
        unit_range: true,
    };

    /// ImageNet statistics on raw 0..255 values
    pub const SEGMENTATION: Self = Self {
        mean: [123.675, 116.28, 103.53],
        std: [58.395, 57.12, 57.375],
        unit_range: false,
    };

    /// Plain `x / 255`
    pub const UNIT: Self = Self {
        mean: [0.0, 0.0, 0.0],
        std: [1.0, 1.0, 1.0],
        unit_range: true,
    };

    fn apply(&self, value: u8, channel: usize) -> f32 {
        let value = if self.unit_range {
            f32::from(value) / 255.0
        } else {
            f32::from(value)
        };
        (value - self.mean[channel]) / self.std[channel]
    }
}

/// Placement of the source inside a square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub scaled: (u32, u32),
    pub offset: (u32, u32),
    pub target: u32,
}

impl LetterboxTransform {
    /// Centered placement, as used for matting inputs
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn centered(source: (u32, u32), target: u32) -> Self {
        let mut transform = Self::top_left(source, target);
        transform.offset = (
            (target - transform.scaled.0) / 2,
            (target - transform.scaled.1) / 2,
        );
        transform
    }

    /// Top-left placement, as the segmentation encoder expects
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn top_left(source: (u32, u32), target: u32) -> Self {
        let (w, h) = (source.0.max(1) as f32, source.1.max(1) as f32);
        let scale = (target as f32 / w).min(target as f32 / h);
        let scaled = (
            ((w * scale).round() as u32).clamp(1, target),
            ((h * scale).round() as u32).clamp(1, target),
        );
        Self {
            scale,
            scaled,
            offset: (0, 0),
            target,
        }
    }

    /// Map a source-space point into model space
    #[must_use]
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.offset.0 as f32,
            y * self.scale + self.offset.1 as f32,
        )
    }
}

/// Letterbox `image` into a `target`² tensor
pub fn image_to_tensor(
    image: &RgbImage,
    transform: &LetterboxTransform,
    normalization: &Normalization,
    padding: [u8; 3],
) -> Array4<f32> {
    let target = transform.target;
    let resized = imageops::resize(
        image,
        transform.scaled.0,
        transform.scaled.1,
        imageops::FilterType::Triangle,
    );
    let mut canvas: RgbImage = ImageBuffer::from_pixel(target, target, Rgb(padding));
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from(transform.offset.0),
        i64::from(transform.offset.1),
    );

    let size = target as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] =
                normalization.apply(pixel[channel], channel);
        }
    }
    tensor
}

/// Map a model-space probability map back onto the source image
///
/// Values are clamped to `0..=1` and scaled to `0..=255`. Pixels that land
/// outside the map read as background.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn map_to_source(
    map: ArrayView2<'_, f32>,
    transform: &LetterboxTransform,
    source: (u32, u32),
) -> GrayImage {
    let (map_h, map_w) = map.dim();
    // Output maps may be smaller than the input tensor
    let ratio_x = map_w as f32 / transform.target as f32;
    let ratio_y = map_h as f32 / transform.target as f32;

    GrayImage::from_fn(source.0, source.1, |x, y| {
        let (tx, ty) = transform.project(x as f32 + 0.5, y as f32 + 0.5);
        let (mx, my) = ((tx * ratio_x) as usize, (ty * ratio_y) as usize);
        let value = map.get([my, mx]).copied().unwrap_or(0.0);
        Luma([(value.clamp(0.0, 1.0) * 255.0).round() as u8])
    })
}

/// Min-max normalize a map into `0..=1`
pub fn min_max_normalize(values: &mut ndarray::ArrayViewMut2<'_, f32>) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if range > f32::EPSILON {
        values.mapv_inplace(|v| (v - min) / range);
    }
}

/// Checked 4-D shape access for model outputs
pub fn expect_rank4(shape: &[usize], what: &str) -> Result<(usize, usize, usize, usize)> {
    match *shape {
        [n, c, h, w] => Ok((n, c, h, w)),
        _ => Err(BannerError::generation_failed(format!(
            "{} output has rank {}, expected 4",
            what,
            shape.len()
        ))),
    }
}
