//! Image payload encoding for the engines.
//!
//! Tesseract reads PNG from stdin, the HTTP recognizers take base64 in a
//! JSON body, and the premium engine takes edgequake-llm `ImageData`.
//!
//! ## Why PNG first?
//!
//! JPEG ringing around glyph edges costs measurable accuracy on Bengali
//! vowel signs. A 600 DPI scan can exceed an upload limit as PNG though, so
//! [`payload`] drops to high-quality JPEG only when it has to.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::{debug, warn};

/// JPEG quality used when a PNG is over the upload limit.
const JPEG_QUALITY: u8 = 92;

/// Encoded image bytes and their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl Payload {
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Encode an image as PNG bytes.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode an image as JPEG; alpha is dropped, grayscale stays grayscale.
pub fn jpeg_bytes(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    match img {
        DynamicImage::ImageLuma8(gray) => encoder.encode_image(gray)?,
        other => encoder.encode_image(&other.to_rgb8())?,
    }
    Ok(buf)
}

/// PNG when it fits in `max_bytes`, JPEG otherwise.
///
/// The JPEG is returned even if it is still too large; the receiving
/// service decides whether to reject it.
pub fn payload(img: &DynamicImage, max_bytes: usize) -> Result<Payload, image::ImageError> {
    let png = png_bytes(img)?;
    if png.len() <= max_bytes {
        return Ok(Payload {
            bytes: png,
            mime_type: "image/png",
        });
    }
    let jpeg = jpeg_bytes(img, JPEG_QUALITY)?;
    if jpeg.len() > max_bytes {
        warn!("Image is {} bytes as JPEG, over the {} byte limit", jpeg.len(), max_bytes);
    } else {
        debug!("PNG {} bytes over limit, sending JPEG {} bytes", png.len(), jpeg.len());
    }
    Ok(Payload {
        bytes: jpeg,
        mime_type: "image/jpeg",
    })
}

/// Encode an image as base64 PNG.
pub fn png_base64(img: &DynamicImage) -> Result<String, image::ImageError> {
    Ok(STANDARD.encode(png_bytes(img)?))
}

/// Page image for a vision LLM, with `detail: "high"` so fine print survives tiling.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    Ok(ImageData::new(png_base64(img)?, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba, RgbaImage};

    fn noisy(w: u32, h: u32) -> DynamicImage {
        let img = image::GrayImage::from_fn(w, h, |x, y| Luma([((x * 7919 + y * 104_729) % 251) as u8]));
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn page_payload_is_png_base64() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert!(decoded.starts_with(b"\x89PNG"));
    }

    #[test]
    fn small_images_stay_png() {
        let p = payload(&noisy(16, 16), 1 << 20).unwrap();
        assert_eq!(p.mime_type, "image/png");
        assert!(p.bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn oversized_png_falls_back_to_jpeg() {
        let img = noisy(200, 200);
        let png_len = png_bytes(&img).unwrap().len();
        let p = payload(&img, png_len - 1).unwrap();
        assert_eq!(p.mime_type, "image/jpeg");
        assert!(p.bytes.starts_with(&[0xFF, 0xD8, 0xFF]));
        assert!(!p.base64().is_empty());
    }

    #[test]
    fn rgba_encodes_as_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 128])));
        assert!(jpeg_bytes(&img, 80).unwrap().starts_with(&[0xFF, 0xD8]));
    }
}
