use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::app::models::{BoundingBox, ResolutionTier};
use crate::app::normalizer::verify::image_dimensions;
use crate::constants::image::JPEG_QUALITY;

/// Largest size with the same aspect ratio that fits `bbox`, never upscaling
pub fn fit_dimensions(width: u32, height: u32, bbox: BoundingBox) -> (u32, u32) {
    if bbox.fits(width, height) {
        return (width, height);
    }
    let scale = f64::min(
        bbox.width as f64 / width as f64,
        bbox.height as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, bbox.width);
    let h = ((height as f64 * scale).round() as u32).clamp(1, bbox.height);
    (w, h)
}

/// Smallest size with the same aspect ratio that covers `bbox`
pub fn cover_dimensions(width: u32, height: u32, bbox: BoundingBox) -> (u32, u32) {
    let scale = f64::max(
        bbox.width as f64 / width as f64,
        bbox.height as f64 / height as f64,
    );
    let w = ((width as f64 * scale).ceil() as u32).max(bbox.width);
    let h = ((height as f64 * scale).ceil() as u32).max(bbox.height);
    (w, h)
}

/// Resizes and re-encodes image bytes for a resolution tier
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    jpeg_quality: u8,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

impl Normalizer {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Ensure `bytes` fit the tier's bounding box
    ///
    /// Conforming or undecodable input is returned unchanged.
    pub fn normalize(&self, bytes: Vec<u8>, tier: ResolutionTier) -> Vec<u8> {
        let bbox = tier.bounding_box();
        match image_dimensions(&bytes) {
            Some((w, h)) if bbox.fits(w, h) => bytes,
            Some(_) => self.fit_into(&bytes, bbox).unwrap_or(bytes),
            None => {
                debug!("Cannot read image header, keeping bytes as-is");
                bytes
            }
        }
    }

    /// Produce the tier's bytes from a higher-resolution copy
    ///
    /// Returns `None` when the source does not decode.
    pub fn derive(&self, bytes: &[u8], tier: ResolutionTier) -> Option<Vec<u8>> {
        self.fit_into(bytes, tier.bounding_box())
    }

    /// Decode, scale to fit `bbox` and re-encode in the source format
    pub fn fit_into(&self, bytes: &[u8], bbox: BoundingBox) -> Option<Vec<u8>> {
        let (image, format) = decode(bytes)?;
        let (w, h) = fit_dimensions(image.width(), image.height(), bbox);
        let resized = if (w, h) == (image.width(), image.height()) {
            image
        } else {
            image.resize_exact(w, h, FilterType::Lanczos3)
        };
        self.encode(&resized, format)
    }

    /// Scale to cover `bbox`, then crop the centre to exactly `bbox`
    pub fn cover_crop(&self, bytes: &[u8], bbox: BoundingBox) -> Option<Vec<u8>> {
        let (image, format) = decode(bytes)?;
        if (image.width(), image.height()) == (bbox.width, bbox.height) {
            return Some(bytes.to_vec());
        }
        let (w, h) = cover_dimensions(image.width(), image.height(), bbox);
        let scaled = image.resize_exact(w, h, FilterType::Lanczos3);
        let x = (w - bbox.width) / 2;
        let y = (h - bbox.height) / 2;
        let cropped = scaled.crop_imm(x, y, bbox.width, bbox.height);
        self.encode(&cropped, format)
    }

    fn encode(&self, image: &DynamicImage, format: ImageFormat) -> Option<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        let result = match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut cursor, self.jpeg_quality);
                image.to_rgb8().write_with_encoder(encoder)
            }
            other => image.write_to(&mut cursor, other),
        };
        match result {
            Ok(()) => Some(cursor.into_inner()),
            Err(e) => {
                debug!("Failed to encode {:?} image: {}", format, e);
                None
            }
        }
    }
}

fn decode(bytes: &[u8]) -> Option<(DynamicImage, ImageFormat)> {
    let format = image::guess_format(bytes).ok()?;
    let image = image::load_from_memory_with_format(bytes, format).ok()?;
    Some((image, format))
}
