//! Learned super-resolution upscaler
//!
//! The model upscales fixed-size tiles by its native factor. Requests for any
//! other factor run the model once and resample to the exact target.

use super::onnx::OnnxSession;
use crate::error::{BannerError, Result};
use crate::inference::Upscaler;
use crate::upscale::{resample_exact, scaled_dimensions};
use crate::utils::preprocessing::{expect_rank4, image_to_tensor, LetterboxTransform, Normalization};
use async_trait::async_trait;
use image::{imageops, DynamicImage, GrayImage, Luma, Rgb, RgbImage, RgbaImage};
use ndarray::ArrayD;
use tracing::instrument;

/// Scale the bundled model produces
pub const NATIVE_SCALE: u32 = 4;

/// Fixed input side of the exported model
pub const TILE_SIZE: u32 = 128;

#[derive(Debug, Clone)]
pub struct EsrganUpscaler {
    session: OnnxSession,
    native_scale: u32,
}

impl EsrganUpscaler {
    #[must_use]
    pub fn new(session: OnnxSession) -> Self {
        Self {
            session,
            native_scale: NATIVE_SCALE,
        }
    }

    /// Run the model tile by tile and stitch the results
    async fn run_model(&self, rgb: &RgbImage) -> Result<RgbImage> {
        let (w, h) = rgb.dimensions();
        let scale = self.native_scale;
        let mut out = RgbImage::new(w * scale, h * scale);

        for ty in (0..h).step_by(TILE_SIZE as usize) {
            for tx in (0..w).step_by(TILE_SIZE as usize) {
                let tw = TILE_SIZE.min(w - tx);
                let th = TILE_SIZE.min(h - ty);
                let tile = imageops::crop_imm(rgb, tx, ty, tw, th).to_image();

                // Edge tiles are padded to the fixed model input
                let transform = LetterboxTransform {
                    scale: 1.0,
                    scaled: (tw, th),
                    offset: (0, 0),
                    target: TILE_SIZE,
                };
                let tensor = image_to_tensor(&tile, &transform, &Normalization::UNIT, [0, 0, 0]);
                let output = self
                    .session
                    .run(vec![tensor.into_dyn()])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        BannerError::generation_failed("super-resolution returned no output")
                    })?;

                let upscaled = tensor_to_rgb(&output)?;
                let expected = (TILE_SIZE * scale, TILE_SIZE * scale);
                if upscaled.dimensions() != expected {
                    return Err(BannerError::generation_failed(format!(
                        "super-resolution tile is {:?}, expected {:?}",
                        upscaled.dimensions(),
                        expected
                    )));
                }
                let valid = imageops::crop_imm(&upscaled, 0, 0, tw * scale, th * scale).to_image();
                imageops::replace(
                    &mut out,
                    &valid,
                    i64::from(tx * scale),
                    i64::from(ty * scale),
                );
            }
        }
        Ok(out)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tensor_to_rgb(output: &ArrayD<f32>) -> Result<RgbImage> {
    let (_, channels, h, w) = expect_rank4(output.shape(), "super-resolution")?;
    if channels != 3 {
        return Err(BannerError::generation_failed(format!(
            "super-resolution produced {} channels",
            channels
        )));
    }
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let at = |c: usize| {
            let v = output
                .get([0, c, y as usize, x as usize])
                .copied()
                .unwrap_or(0.0);
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        };
        Rgb([at(0), at(1), at(2)])
    }))
}

/// Alpha is not modelled; it is resampled alongside
fn upscale_alpha(rgba: &RgbaImage, target: (u32, u32)) -> GrayImage {
    let alpha = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([rgba.get_pixel(x, y)[3]])
    });
    imageops::resize(&alpha, target.0, target.1, imageops::FilterType::Lanczos3)
}

#[async_trait]
impl Upscaler for EsrganUpscaler {
    fn name(&self) -> &str {
        self.session.name()
    }

    #[instrument(skip_all, fields(factor = factor))]
    async fn upscale(&self, image: &DynamicImage, factor: u32) -> Result<DynamicImage> {
        let target = scaled_dimensions((image.width(), image.height()), factor)?;
        let upscaled = self.run_model(&image.to_rgb8()).await?;

        let result = if image.color().has_alpha() {
            let alpha = upscale_alpha(&image.to_rgba8(), upscaled.dimensions());
            let mut rgba = RgbaImage::new(upscaled.width(), upscaled.height());
            for ((out, rgb), a) in rgba.pixels_mut().zip(upscaled.pixels()).zip(alpha.pixels()) {
                *out = image::Rgba([rgb[0], rgb[1], rgb[2], a[0]]);
            }
            DynamicImage::ImageRgba8(rgba)
        } else {
            DynamicImage::ImageRgb8(upscaled)
        };

        if factor != self.native_scale {
            tracing::debug!(native = self.native_scale, factor, "resampling to requested factor");
        }
        Ok(resample_exact(result, target))
    }
}
