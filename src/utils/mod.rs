//! Shared helpers for model-backed providers

pub mod preprocessing;

pub use preprocessing::{LetterboxTransform, Normalization};
