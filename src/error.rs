//! Error types for the edgequake-ocr library.
//!
//! Three tiers of failure, from widest to narrowest blast radius:
//!
//! * [`OcrError`]: **Fatal**: the request cannot produce a document at all
//!   (file type unknown and nothing decodes, the source cannot be converted,
//!   bad configuration). Returned as `Err(OcrError)` from the `process*`
//!   entry points.
//!
//! * [`EngineError`]: **Per call**: one recognizer invocation failed. The
//!   cascade consumes these and moves on to the next strategy; they never
//!   escape a page task.
//!
//! * [`PageError`]: **Non-fatal, per page**: every strategy for a page
//!   failed. Stored on the degraded [`crate::output::PageResult`] (empty text,
//!   zero confidence) so a bad page is always represented, never dropped.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The request carried no bytes.
    #[error("Input is empty: nothing to recognise")]
    EmptyInput,

    /// File type detection returned `unknown` and no conversion path succeeded.
    #[error("Unsupported file format (first bytes: {magic:02x?})\nSupported: PDF, JPEG, PNG, GIF, BMP, WebP, TIFF.")]
    UnsupportedFormat { magic: Vec<u8> },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The document was recognised but could not be turned into page images.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Malformed or unsupported source document.
///
/// Never retried. For a buffer sniffed as PDF the caller falls back to
/// single-image decoding before giving up.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// pdfium could not parse the buffer (corrupt, encrypted, truncated).
    #[error("Invalid PDF: {detail}")]
    InvalidPdf { detail: String },

    /// No pdfium shared library could be bound.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumUnavailable(String),

    /// A single page failed to rasterise.
    #[error("Rasterisation failed for page {page}: {detail}")]
    PageRender { page: usize, detail: String },

    /// The buffer is not a decodable raster image.
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// The blocking conversion worker panicked or was cancelled.
    #[error("Conversion task failed: {0}")]
    TaskFailed(String),
}

/// Why a recognizer call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Engine not installed / not configured / not reachable.
    Unavailable,
    /// The per-call timeout elapsed.
    Timeout,
    /// Transport or non-success HTTP status.
    Http,
    /// HTTP 429 from a remote engine.
    RateLimited,
    /// The remote engine rejected an oversized payload.
    PayloadTooLarge,
    /// The local engine process exited abnormally or produced unreadable output.
    Process,
    /// The engine answered but the body could not be interpreted.
    InvalidResponse,
}

/// One backend call failed.
#[derive(Debug, Clone, Error)]
#[error("{engine}: {kind:?}: {detail}")]
pub struct EngineError {
    pub engine: String,
    pub kind: EngineErrorKind,
    pub detail: String,
    retryable: bool,
}

impl EngineError {
    pub fn new(engine: impl Into<String>, kind: EngineErrorKind, detail: impl Into<String>) -> Self {
        let retryable = matches!(
            kind,
            EngineErrorKind::Timeout | EngineErrorKind::RateLimited | EngineErrorKind::Http
        );
        Self {
            engine: engine.into(),
            kind,
            detail: detail.into(),
            retryable,
        }
    }

    /// Override the default retryability derived from the kind.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn timeout(engine: impl Into<String>, after: Duration) -> Self {
        Self::new(
            engine,
            EngineErrorKind::Timeout,
            format!("no answer after {}s", after.as_secs()),
        )
    }

    pub fn unavailable(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(engine, EngineErrorKind::Unavailable, detail)
    }

    pub fn payload_too_large(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(engine, EngineErrorKind::PayloadTooLarge, detail)
    }

    /// Whether the same call may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// A premium-engine rejection that must route around to the local family.
    pub fn is_payload_too_large(&self) -> bool {
        self.kind == EngineErrorKind::PayloadTooLarge
    }
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageResult`] when a page degrades to
/// empty text with zero confidence.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page image could not be produced.
    #[error("Page {page}: conversion failed: {detail}")]
    ConversionFailed { page: usize, detail: String },

    /// Every cascade strategy returned an engine error.
    #[error("Page {page}: all {attempts} strategies failed: {detail}")]
    AllStrategiesFailed {
        page: usize,
        attempts: usize,
        detail: String,
    },

    /// The page task panicked or was cancelled before reporting.
    #[error("Page {page}: task lost: {detail}")]
    TaskLost { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display_shows_magic() {
        let e = OcrError::UnsupportedFormat {
            magic: vec![0x01, 0x02, 0xab],
        };
        let msg = e.to_string();
        assert!(msg.contains("ab"), "got: {msg}");
        assert!(msg.contains("PDF"));
    }

    #[test]
    fn conversion_error_is_transparent() {
        let e: OcrError = ConversionError::InvalidPdf {
            detail: "bad xref".into(),
        }
        .into();
        assert_eq!(e.to_string(), "Invalid PDF: bad xref");
    }

    #[test]
    fn timeout_is_retryable() {
        let e = EngineError::timeout("tesseract", Duration::from_secs(60));
        assert!(e.is_retryable());
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn payload_too_large_is_not_retryable() {
        let e = EngineError::payload_too_large("premium", "51 pages");
        assert!(!e.is_retryable());
        assert!(e.is_payload_too_large());
    }

    #[test]
    fn retryable_override() {
        let e = EngineError::new("vision", EngineErrorKind::Http, "400 bad request")
            .with_retryable(false);
        assert!(!e.is_retryable());
    }

    #[test]
    fn page_error_round_trips_through_json() {
        let e = PageError::AllStrategiesFailed {
            page: 4,
            attempts: 3,
            detail: "tesseract: Timeout".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
        assert!(e.to_string().contains("Page 4"));
    }
}
