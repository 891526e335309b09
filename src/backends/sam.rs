//! Promptable segmentation extractor
//!
//! The encoder embeds the image once; the decoder is prompted with a single
//! foreground point at the image center. Of the candidate masks the one with
//! the highest predicted IoU wins.

use super::onnx::OnnxSession;
use crate::config::ExtractionMethod;
use crate::error::{BannerError, Result};
use crate::inference::ForegroundExtractor;
use crate::types::{Extraction, Mask, SubjectImage};
use crate::utils::preprocessing::{expect_rank4, image_to_tensor, LetterboxTransform, Normalization};
use async_trait::async_trait;
use image::{imageops, DynamicImage, GrayImage, Luma, RgbaImage};
use ndarray::{Array, Array1, Array2, Array3, Array4, ArrayD, Axis};
use tracing::instrument;

/// Encoder input side length
pub const SEGMENTATION_INPUT_SIZE: u32 = 1024;

/// Low-resolution mask prompt side length expected by the decoder
const MASK_INPUT_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct SegmentationExtractor {
    encoder: OnnxSession,
    decoder: OnnxSession,
    clean_color_leakage: bool,
}

impl SegmentationExtractor {
    #[must_use]
    pub fn new(encoder: OnnxSession, decoder: OnnxSession, clean_color_leakage: bool) -> Self {
        Self {
            encoder,
            decoder,
            clean_color_leakage,
        }
    }

    /// Decoder prompt: center point labelled foreground, plus the padding point
    fn prompt(transform: &LetterboxTransform, source: (u32, u32)) -> (Array3<f32>, Array2<f32>) {
        let (cx, cy) = transform.project(source.0 as f32 / 2.0, source.1 as f32 / 2.0);
        let coords = Array3::from_shape_vec((1, 2, 2), vec![cx, cy, 0.0, 0.0])
            .unwrap_or_else(|_| Array3::zeros((1, 2, 2)));
        let labels = Array2::from_shape_vec((1, 2), vec![1.0, -1.0])
            .unwrap_or_else(|_| Array2::zeros((1, 2)));
        (coords, labels)
    }
}

/// Index of the highest IoU prediction
fn best_candidate(iou: &ArrayD<f32>) -> usize {
    iou.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, score), (i, &v)| {
            if v > score {
                (i, v)
            } else {
                (best, score)
            }
        })
        .0
}

/// Threshold decoder logits into a binary foreground mask at source size
fn binarize(masks: &ArrayD<f32>, index: usize, source: (u32, u32)) -> Result<GrayImage> {
    let (_, count, h, w) = expect_rank4(masks.shape(), "segmentation")?;
    if index >= count {
        return Err(BannerError::generation_failed(
            "segmentation decoder returned no masks",
        ));
    }
    let logits = masks.index_axis(Axis(1), index);
    let binary = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let v = logits.get([0, y as usize, x as usize]).copied().unwrap_or(0.0);
        Luma([if v > 0.0 { 255 } else { 0 }])
    });
    if binary.dimensions() == source {
        Ok(binary)
    } else {
        Ok(imageops::resize(
            &binary,
            source.0,
            source.1,
            imageops::FilterType::Nearest,
        ))
    }
}

/// Attach the mask as alpha, optionally zeroing color outside it
fn cut_out(image: &DynamicImage, foreground: &GrayImage, clean: bool) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    for (pixel, m) in rgba.pixels_mut().zip(foreground.pixels()) {
        pixel[3] = m[0];
        if clean && m[0] == 0 {
            pixel[0] = 0;
            pixel[1] = 0;
            pixel[2] = 0;
        }
    }
    rgba
}

#[async_trait]
impl ForegroundExtractor for SegmentationExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Segmentation
    }

    #[instrument(skip_all, fields(encoder = self.encoder.name()))]
    async fn extract(&self, image: &DynamicImage) -> Result<Extraction> {
        let source = (image.width(), image.height());
        let transform = LetterboxTransform::top_left(source, SEGMENTATION_INPUT_SIZE);
        let tensor = image_to_tensor(
            &image.to_rgb8(),
            &transform,
            &Normalization::SEGMENTATION,
            [0, 0, 0],
        );

        let embeddings = self
            .encoder
            .run(vec![tensor.into_dyn()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BannerError::generation_failed("segmentation encoder returned nothing"))?;

        let (coords, labels) = Self::prompt(&transform, source);
        let decoder_inputs = vec![
            embeddings,
            coords.into_dyn(),
            labels.into_dyn(),
            Array4::<f32>::zeros((1, 1, MASK_INPUT_SIZE, MASK_INPUT_SIZE)).into_dyn(),
            Array1::<f32>::zeros(1).into_dyn(),
            Array::from_vec(vec![source.1 as f32, source.0 as f32]).into_dyn(),
        ];
        let mut outputs = self.decoder.run(decoder_inputs).await?.into_iter();
        let (masks, iou) = match (outputs.next(), outputs.next()) {
            (Some(masks), Some(iou)) => (masks, iou),
            _ => {
                return Err(BannerError::generation_failed(
                    "segmentation decoder returned too few outputs",
                ))
            },
        };

        let best = best_candidate(&iou);
        let foreground = binarize(&masks, best, source)?;
        tracing::debug!(candidate = best, "segmentation mask selected");

        let subject = SubjectImage::new(cut_out(image, &foreground, self.clean_color_leakage));
        let mut regenerate = foreground;
        imageops::invert(&mut regenerate);

        Ok(Extraction {
            subject,
            mask: Some(Mask::regenerate_high(regenerate)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_prompt_points() {
        let transform = LetterboxTransform::top_left((512, 256), SEGMENTATION_INPUT_SIZE);
        let (coords, labels) = SegmentationExtractor::prompt(&transform, (512, 256));
        assert_eq!(coords.as_slice().unwrap(), &[512.0, 256.0, 0.0, 0.0]);
        assert_eq!(labels.as_slice().unwrap(), &[1.0, -1.0]);
    }

    #[test]
    fn test_best_candidate() {
        let iou = ArrayD::from_shape_vec(vec![1, 3], vec![0.2, 0.9, 0.5]).unwrap();
        assert_eq!(best_candidate(&iou), 1);
    }

    #[test]
    fn test_binarize_and_resize() {
        let mut logits = ArrayD::<f32>::from_elem(vec![1, 2, 2, 2], -1.0);
        logits[[0, 1, 0, 0]] = 3.0;
        let mask = binarize(&logits, 1, (4, 4)).unwrap();
        assert_eq!(mask.dimensions(), (4, 4));
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(3, 3)[0], 0);
        assert!(binarize(&logits, 5, (4, 4)).is_err());
    }

    #[test]
    fn test_cut_out_cleans_leakage() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, Rgb([90, 90, 90])));
        let mut fg = GrayImage::new(2, 1);
        fg.put_pixel(0, 0, Luma([255]));

        let cleaned = cut_out(&image, &fg, true);
        assert_eq!(cleaned.get_pixel(0, 0).0, [90, 90, 90, 255]);
        assert_eq!(cleaned.get_pixel(1, 0).0, [0, 0, 0, 0]);

        let raw = cut_out(&image, &fg, false);
        assert_eq!(raw.get_pixel(1, 0).0, [90, 90, 90, 0]);
    }
}
