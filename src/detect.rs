//! File type detection from magic bytes.
//!
//! Pure and infallible: anything that matches no known signature is
//! [`FileKind::Unknown`], and the caller decides whether that is fatal.

use serde::{Deserialize, Serialize};

/// Coarse family of a raw upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Image,
    Unknown,
}

const IMAGE_SIGNATURES: &[&[u8]] = &[
    b"\xff\xd8\xff",  // JPEG
    b"\x89PNG",       // PNG
    b"GIF87a",        // GIF
    b"GIF89a",
    b"BM",            // BMP
    b"II*\x00",       // TIFF little-endian
    b"MM\x00*",       // TIFF big-endian
];

/// Classify `bytes` as PDF, image or unknown.
pub fn detect(bytes: &[u8]) -> FileKind {
    if bytes.starts_with(b"%PDF") {
        return FileKind::Pdf;
    }
    if IMAGE_SIGNATURES.iter().any(|sig| bytes.starts_with(sig)) || is_webp(bytes) {
        return FileKind::Image;
    }
    FileKind::Unknown
}

fn is_webp(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
}

/// Whether a `%PDF` header appears anywhere in the first KiB.
///
/// Some producers prepend junk (BOMs, mail headers) before the header; pdfium
/// tolerates that, so an `unknown` buffer with a late header is still worth
/// one conversion attempt.
pub fn has_late_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(4).any(|w| w == b"%PDF")
}

/// First few bytes, for error messages.
pub fn magic(bytes: &[u8]) -> Vec<u8> {
    bytes[..bytes.len().min(8)].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_header() {
        assert_eq!(detect(b"%PDF-1.7\n..."), FileKind::Pdf);
    }

    #[test]
    fn image_signatures() {
        assert_eq!(detect(b"\xff\xd8\xff\xe0\x00\x10JFIF"), FileKind::Image);
        assert_eq!(detect(b"\x89PNG\r\n\x1a\n"), FileKind::Image);
        assert_eq!(detect(b"GIF89a\x01\x00"), FileKind::Image);
        assert_eq!(detect(b"BM\x36\x00"), FileKind::Image);
        assert_eq!(detect(b"RIFF\x24\x00\x00\x00WEBPVP8 "), FileKind::Image);
        assert_eq!(detect(b"II*\x00\x08\x00"), FileKind::Image);
        assert_eq!(detect(b"MM\x00*\x00\x00"), FileKind::Image);
    }

    #[test]
    fn riff_without_webp_is_unknown() {
        assert_eq!(detect(b"RIFF\x24\x00\x00\x00WAVEfmt "), FileKind::Unknown);
    }

    #[test]
    fn short_and_empty_inputs_are_unknown() {
        assert_eq!(detect(b""), FileKind::Unknown);
        assert_eq!(detect(b"hello"), FileKind::Unknown);
        assert_eq!(detect(b"%PD"), FileKind::Unknown);
    }

    #[test]
    fn late_pdf_header() {
        let mut bytes = vec![b' '; 100];
        bytes.extend_from_slice(b"%PDF-1.4");
        assert_eq!(detect(&bytes), FileKind::Unknown);
        assert!(has_late_pdf_header(&bytes));
        assert!(!has_late_pdf_header(b"hello"));
    }
}
