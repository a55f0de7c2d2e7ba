//! Input resolution: read a user-supplied path or URL into memory.
//!
//! The pipeline works on byte buffers (pdfium loads from a slice, images
//! decode from memory), so unlike a path-based converter nothing needs to
//! touch disk here. Type detection happens later, on the bytes, so a file
//! named `.pdf` that is really a PNG still works.

use crate::error::OcrError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Where the bytes came from, for logging and output naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOrigin {
    Local(PathBuf),
    Url(String),
}

/// A fully read input.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub origin: InputOrigin,
    pub bytes: Vec<u8>,
}

impl ResolvedInput {
    /// Short display name: file name, or the last URL path segment.
    pub fn display_name(&self) -> String {
        match &self.origin {
            InputOrigin::Local(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string()),
            InputOrigin::Url(u) => filename_from_url(u).unwrap_or_else(|| u.clone()),
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read `input` from disk, or download it if it is an HTTP(S) URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, OcrError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<ResolvedInput, OcrError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => OcrError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(ResolvedInput {
        origin: InputOrigin::Local(path.to_path_buf()),
        bytes,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, OcrError> {
    info!("Downloading {}", url);
    let failed = |reason: String| OcrError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let timed_out = || OcrError::DownloadTimeout {
        url: url.to_string(),
        secs: timeout_secs,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            timed_out()
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            timed_out()
        } else {
            failed(e.to_string())
        }
    })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(ResolvedInput {
        origin: InputOrigin::Url(url.to_string()),
        bytes: bytes.to_vec(),
    })
}

fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty()).then(|| last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/scan.png"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn url_display_name_is_last_segment() {
        let input = ResolvedInput {
            origin: InputOrigin::Url("https://example.com/files/scan-01.png?x=1".into()),
            bytes: Vec::new(),
        };
        assert_eq!(input.display_name(), "scan-01.png");
    }

    #[tokio::test]
    async fn reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nrest").unwrap();
        let input = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(input.bytes.len(), 12);
        assert_eq!(input.display_name(), "page.png");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }));
    }
}
