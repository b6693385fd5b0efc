//! Structural image checks used before accepting downloaded bytes

use std::io::Cursor;

use image::{ImageFormat, ImageReader};

/// JPEG end-of-image marker
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Pixel dimensions from the image header, without a full decode
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Verify that `bytes` hold a complete, decodable image
///
/// JPEG decoders happily return partial pictures for truncated streams, so
/// JPEG payloads must also end with an EOI marker (trailing padding aside).
pub fn verify_complete_image(bytes: &[u8]) -> Result<(u32, u32), String> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?;

    match reader.format() {
        None => return Err("unrecognised image format".to_string()),
        Some(ImageFormat::Jpeg) => {
            let end = bytes
                .iter()
                .rposition(|b| *b != 0)
                .map(|i| i + 1)
                .unwrap_or(0);
            if end < 2 || bytes[end - 2..end] != JPEG_EOI {
                return Err("JPEG stream is missing its end marker".to_string());
            }
        }
        Some(_) => {}
    }

    let image = reader.decode().map_err(|e| e.to_string())?;
    Ok((image.width(), image.height()))
}
