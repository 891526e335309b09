//! Transport encoding service
//!
//! Final banners leave the crate as lossless PNG bytes, optionally wrapped in
//! standard base64 for JSON delivery.

use crate::error::{BannerError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Service for encoding final images into transport formats
pub struct TransportEncoder;

impl TransportEncoder {
    /// Encode an image as PNG
    ///
    /// # Errors
    /// - PNG encoder failure
    ///
    /// # Examples
    /// ```rust
    /// use menu_banner::services::TransportEncoder;
    /// use image::DynamicImage;
    ///
    /// let png = TransportEncoder::encode_png(&DynamicImage::new_rgba8(4, 4))?;
    /// assert_eq!(&png[1..4], b"PNG");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }

    #[must_use]
    pub fn to_base64(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    /// Decode a base64 string back into raw bytes
    ///
    /// # Errors
    /// `InvalidInput` for malformed base64.
    pub fn from_base64(encoded: &str) -> Result<Vec<u8>> {
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| BannerError::invalid_input(format!("invalid base64 payload: {}", e)))
    }

    /// Decode image bytes of any supported format
    ///
    /// # Errors
    /// `InvalidInput` when the bytes are empty or not a decodable image.
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(BannerError::invalid_input("image bytes are empty"));
        }
        image::load_from_memory(bytes)
            .map_err(|e| BannerError::invalid_input(format!("failed to decode image: {}", e)))
    }
}
