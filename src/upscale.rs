//! Deterministic upscaling and exact-factor resampling

use crate::error::{BannerError, Result};
use crate::inference::Upscaler;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;

/// Target dimensions for `factor`, rejecting zero and overflow
///
/// # Errors
/// `InvalidArgument` for a zero factor or dimensions that overflow `u32`.
pub fn scaled_dimensions(source: (u32, u32), factor: u32) -> Result<(u32, u32)> {
    if factor == 0 {
        return Err(BannerError::invalid_argument("upscale factor must be positive"));
    }
    match (source.0.checked_mul(factor), source.1.checked_mul(factor)) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(BannerError::invalid_argument(format!(
            "{}x{} scaled by {} overflows",
            source.0, source.1, factor
        ))),
    }
}

/// Resample `image` to exactly `target`, skipping work when already there
#[must_use]
pub fn resample_exact(image: DynamicImage, target: (u32, u32)) -> DynamicImage {
    if (image.width(), image.height()) == target {
        image
    } else {
        image.resize_exact(target.0, target.1, FilterType::Lanczos3)
    }
}

/// Lanczos resampling; always available
#[derive(Debug, Clone, Copy, Default)]
pub struct LanczosUpscaler;

#[async_trait]
impl Upscaler for LanczosUpscaler {
    fn name(&self) -> &str {
        "lanczos"
    }

    async fn upscale(&self, image: &DynamicImage, factor: u32) -> Result<DynamicImage> {
        let target = scaled_dimensions((image.width(), image.height()), factor)?;
        Ok(resample_exact(image.clone(), target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_lanczos_scales_exactly() {
        let image = DynamicImage::new_rgba8(30, 20);
        for factor in [1, 2, 3, 4] {
            let out = LanczosUpscaler.upscale(&image, factor).await.unwrap();
            assert_eq!((out.width(), out.height()), (30 * factor, 20 * factor));
        }
    }

    #[tokio::test]
    async fn test_zero_factor_rejected() {
        let err = LanczosUpscaler
            .upscale(&DynamicImage::new_rgb8(4, 4), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(scaled_dimensions((u32::MAX, 1), 2).is_err());
    }

    #[test]
    fn test_resample_exact_noop() {
        let image = DynamicImage::new_rgb8(8, 8);
        let out = resample_exact(image.clone(), (8, 8));
        assert_eq!(out, image);
    }
}
