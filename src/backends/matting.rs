//! General-purpose matting extractor
//!
//! A single-pass salient-object model predicts an alpha matte directly. The
//! matte is mapped back to source resolution and becomes the subject's alpha.

use super::onnx::OnnxSession;
use crate::config::ExtractionMethod;
use crate::error::Result;
use crate::inference::ForegroundExtractor;
use crate::types::{Extraction, SubjectImage};
use crate::utils::preprocessing::{
    expect_rank4, image_to_tensor, map_to_source, min_max_normalize, LetterboxTransform,
    Normalization,
};
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use tracing::instrument;

/// Model input side length
pub const MATTING_INPUT_SIZE: u32 = 1024;

#[derive(Debug, Clone)]
pub struct MattingExtractor {
    session: OnnxSession,
}

impl MattingExtractor {
    #[must_use]
    pub fn new(session: OnnxSession) -> Self {
        Self { session }
    }
}

/// Attach a matte as the alpha channel of `image`
pub(crate) fn apply_matte(image: &DynamicImage, matte: &image::GrayImage) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    for (pixel, alpha) in rgba.pixels_mut().zip(matte.pixels()) {
        pixel[3] = alpha[0];
    }
    rgba
}

#[async_trait]
impl ForegroundExtractor for MattingExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Matting
    }

    #[instrument(skip_all, fields(model = self.session.name()))]
    async fn extract(&self, image: &DynamicImage) -> Result<Extraction> {
        let source = (image.width(), image.height());
        let transform = LetterboxTransform::centered(source, MATTING_INPUT_SIZE);
        let tensor = image_to_tensor(
            &image.to_rgb8(),
            &transform,
            &Normalization::MATTING,
            [255, 255, 255],
        );

        let outputs = self.session.run(vec![tensor.into_dyn()]).await?;
        let first = outputs.into_iter().next().ok_or_else(|| {
            crate::error::BannerError::generation_failed("matting model returned no outputs")
        })?;
        let (_, _, h, w) = expect_rank4(first.shape(), "matting")?;

        let mut map = first
            .into_shape_with_order((h, w))
            .map_err(|e| crate::error::BannerError::generation_failed(e.to_string()))?;
        min_max_normalize(&mut map.view_mut());

        // The map covers the square input; rescale the letterbox to its size
        let matte = map_to_source(map.view(), &transform, source);
        tracing::debug!(width = source.0, height = source.1, "matte extracted");

        Ok(Extraction {
            subject: SubjectImage::new(apply_matte(image, &matte)),
            mask: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_apply_matte_keeps_color() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, Rgb([10, 20, 30])));
        let mut matte = GrayImage::new(2, 1);
        matte.put_pixel(1, 0, Luma([200]));
        let rgba = apply_matte(&image, &matte);
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 0]);
        assert_eq!(rgba.get_pixel(1, 0).0, [10, 20, 30, 200]);
    }
}
