//! Error handling and edge case testing
//!
//! Failure paths through the public API: invalid inputs, bad configuration,
//! provider failures and how they surface as error kinds and stages.

mod common;

use common::{pipeline, request, small_config, FixtureFactory, RecordingSynthesizer};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use menu_banner::{
    config::{parse_size, CanvasSize, PipelineConfig},
    error::{BannerError, ErrorKind, Stage},
    inference::Upscaler,
    mask::{prepare_with_mask, MaskParams},
    types::{Mask, MaskPolarity, SubjectImage},
    BannerRequest, LanczosUpscaler, ModelRegistry, TransportEncoder,
};
use std::collections::HashMap;
use std::sync::Arc;

#[test]
fn test_empty_product_rejected_at_build() {
    let err = BannerRequest::builder(Vec::new()).menu("커피").build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.stage(), None);
}

#[tokio::test]
async fn test_corrupt_product_fails_extract_stage() {
    let factory = Arc::new(FixtureFactory::new(RecordingSynthesizer::default()));
    let pipeline = pipeline(small_config(), factory.clone(), Arc::new(ModelRegistry::new()));

    let request = BannerRequest::builder(b"\x89PNG but not really".to_vec())
        .menu("커피")
        .build()
        .unwrap();
    let err = pipeline.generate(&request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.stage(), Some(Stage::Extract));
    assert!(factory.synthesizer.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_synthesis_failure_keeps_kind_and_stage() {
    let factory = Arc::new(FixtureFactory::new(RecordingSynthesizer {
        fail: Some(|| BannerError::external_service("diffusion", "502 Bad Gateway")),
        ..RecordingSynthesizer::default()
    }));
    let pipeline = pipeline(small_config(), factory.clone(), Arc::new(ModelRegistry::new()));

    let err = pipeline.generate(&request("커피", "피드")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert_eq!(err.stage(), Some(Stage::Synthesize));
    assert!(err.to_string().contains("502 Bad Gateway"));

    // A failed run leaves the loaded synthesizer usable for the next one
    let err = pipeline.generate(&request("커피", "피드")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert_eq!(factory.synthesizer.seen.lock().unwrap().len(), 2);
    assert_eq!(
        factory
            .synthesizer_builds
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn test_empty_generation_surfaces_generation_failed() {
    let factory = Arc::new(FixtureFactory::new(RecordingSynthesizer {
        fail: Some(|| BannerError::generation_failed("backend returned no images")),
        ..RecordingSynthesizer::default()
    }));
    let pipeline = pipeline(small_config(), factory, Arc::new(ModelRegistry::new()));

    let err = pipeline.generate(&request("피자", "스토리")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenerationFailed);
    assert_eq!(err.stage(), Some(Stage::Synthesize));
}

#[test]
fn test_invalid_configuration_rejected() {
    let err = PipelineConfig::builder().blur_radius(-1.0).build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("blur radius"));

    let err = PipelineConfig::builder().inference_steps(0).build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = PipelineConfig::builder().guidance_scale(42.0).build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(CanvasSize::new(0, 512).is_err());
    for raw in ["512", "0x512", "-4x4", "axb", "512x"] {
        let err = parse_size(raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{raw}");
    }
    assert_eq!(parse_size(" 768X512 ").unwrap(), CanvasSize { width: 768, height: 512 });
}

#[test]
fn test_environment_overrides() {
    let env: HashMap<&str, &str> = [
        ("BG_SIZE", "640x480"),
        ("SYNTHESIS_BACKEND", "gemini"),
        ("UPSCALE_BACKEND", "realesrgan"),
        ("GEMINI_API_KEY", "test-key"),
        ("STAGE_TIMEOUT_SECS", "90"),
    ]
    .into_iter()
    .collect();
    let config = PipelineConfig::default()
        .with_env(|key| env.get(key).map(ToString::to_string))
        .unwrap();

    assert_eq!(config.background_size, CanvasSize { width: 640, height: 480 });
    assert_eq!(config.endpoints.gemini_api_key.as_deref(), Some("test-key"));
    assert_eq!(config.stage_timeout, Some(std::time::Duration::from_secs(90)));

    let err = PipelineConfig::default()
        .with_env(|key| (key == "EXTRACTION_METHOD").then(|| "grabcut".to_string()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // Segmentation needs local weights for both halves
    let err = PipelineConfig::default()
        .with_env(|key| (key == "EXTRACTION_METHOD").then(|| "sam".to_string()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_mask_contract_violations() {
    let subject = SubjectImage::new(RgbaImage::new(20, 10));
    let params = MaskParams {
        canvas: CanvasSize::square(16),
        blur_radius: 0.0,
        ..MaskParams::default()
    };

    let inverted = Mask::with_polarity(GrayImage::new(20, 10), MaskPolarity::PreserveHigh);
    let err = prepare_with_mask(&subject, &inverted, &params).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let wrong_size = Mask::regenerate_high(GrayImage::from_pixel(10, 10, Luma([255])));
    let err = prepare_with_mask(&subject, &wrong_size, &params).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let bad_blur = MaskParams {
        blur_radius: f32::NAN,
        ..params
    };
    let ok_mask = Mask::regenerate_high(GrayImage::new(20, 10));
    let err = prepare_with_mask(&subject, &ok_mask, &bad_blur).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_upscale_factor_edge_cases() {
    let image = DynamicImage::new_rgba8(7, 5);
    let err = LanczosUpscaler.upscale(&image, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let same = LanczosUpscaler.upscale(&image, 1).await.unwrap();
    assert_eq!((same.width(), same.height()), (7, 5));
}

#[test]
fn test_transport_decoding_errors() {
    let err = TransportEncoder::from_base64("not base64 at all!!").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = TransportEncoder::decode(&[0, 1, 2, 3]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_stage_wrapping_is_innermost_first() {
    let err = BannerError::resource_unavailable("weights missing")
        .at_stage(Stage::Upscale)
        .at_stage(Stage::Encode);
    assert_eq!(err.stage(), Some(Stage::Upscale));
    assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    assert!(err.to_string().starts_with("upscale stage failed"));
}
