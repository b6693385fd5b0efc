//! Helpers shared by unit tests

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, Rgb, RgbImage};

/// Deterministic test picture; different seeds give visually different images
pub fn test_image(width: u32, height: u32, seed: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let r = ((x * 255) / width.max(1)) as u8 ^ seed;
        let g = ((y * 255) / height.max(1)) as u8;
        let b = seed.wrapping_mul(37);
        Rgb([r, g, b])
    }))
}

/// Encode a test picture as JPEG
pub fn jpeg_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let rgb = test_image(width, height, seed).to_rgb8();
    let mut cursor = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut cursor, 90)
        .write_image(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .expect("encode jpeg");
    cursor.into_inner()
}

/// Encode a test picture as PNG
pub fn png_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let rgb = test_image(width, height, seed).to_rgb8();
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .expect("encode png");
    out
}
