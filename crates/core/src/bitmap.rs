//! Decoding embedded image payloads and re-encoding them as PNG.

use crate::error::{Error, Result};
use crate::types::ImageRecord;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Decode an encoded image payload (PNG, JPEG, TIFF, ...) into a record.
pub fn decode_image(location: u32, bytes: &[u8]) -> Result<ImageRecord> {
    let pixels = image::load_from_memory(bytes)
        .map_err(|e| Error::DecodeError(format!("image at location {}: {}", location, e)))?;
    log::debug!(
        "Decoded {}x{} image at location {}",
        pixels.width(),
        pixels.height(),
        location
    );
    Ok(ImageRecord::from_bitmap(location, pixels))
}

/// Encode a bitmap as PNG bytes.
pub fn encode_png(pixels: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    pixels
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(Error::persistence)?;
    Ok(buf)
}
