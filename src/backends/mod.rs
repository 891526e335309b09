//! Concrete provider implementations
//!
//! - ONNX Runtime extractors and the learned upscaler (feature `onnx`)
//! - Diffusion server and Gemini synthesizers
//! - Prompt translators

#[cfg(feature = "onnx")]
pub mod esrgan;
#[cfg(feature = "onnx")]
pub mod matting;
#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "onnx")]
pub mod sam;

pub mod diffusion_server;
pub mod gemini;
pub mod translate;

// Test utilities for provider testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::{
    esrgan::EsrganUpscaler, matting::MattingExtractor, onnx::OnnxSession,
    sam::SegmentationExtractor,
};
pub use self::{
    diffusion_server::DiffusionServerSynthesizer,
    gemini::GeminiSynthesizer,
    translate::{GoogleTranslator, PassthroughTranslator},
};
