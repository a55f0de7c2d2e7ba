//! Engine adapters: uniform wrappers around each OCR backend.
//!
//! Every backend, local or remote, is reduced to one contract:
//! [`Recognizer::recognize`] takes a page image and the caller's script
//! profile and returns text plus a 0–100 confidence, or an
//! [`EngineError`] flagged retryable or not. The cascade never needs to
//! know which backend it is talking to.
//!
//! | Module | Backend |
//! |--------|---------|
//! | [`tesseract`] | Tesseract CLI, one segmentation pass per call |
//! | [`local`]     | multi-pass local stack built on a pass runner, with neural backup |
//! | [`neural`]    | neural detection/recognition sidecar over HTTP |
//! | [`vision`]    | cloud vision API, confidence from token scores |
//! | [`premium`]   | whole-document premium recognizer via edgequake-llm |
//!
//! Handles that are expensive to build (a loaded neural model per language
//! set) go through an [`EngineCache`] passed in by the owner, never a global.

pub mod local;
pub mod neural;
pub mod premium;
pub mod tesseract;
pub mod vision;

use crate::error::EngineError;
use crate::pipeline::render::PageImage;
use crate::script::ScriptProfile;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::sleep;
use tracing::warn;

/// Text and confidence produced by one engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// 0–100.
    pub confidence: f64,
    /// Which engine / configuration produced it.
    pub label: String,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f64, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 100.0),
            label: label.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A per-page recognizer.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Engine name used in logs, errors and provenance labels.
    fn name(&self) -> &str;

    /// Engine calls one `recognize` may make; callers scale the per-call
    /// timeout by this when bounding the whole invocation.
    fn call_budget(&self) -> u32 {
        1
    }

    async fn recognize(&self, page: &PageImage, profile: ScriptProfile) -> Result<Recognition, EngineError>;
}

// ── Engine-handle cache ──────────────────────────────────────────────────

/// Cache key: engine name plus the (order-insensitive) language set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineKey {
    pub engine: String,
    pub languages: Vec<String>,
}

impl EngineKey {
    pub fn new<S: AsRef<str>>(engine: impl Into<String>, languages: &[S]) -> Self {
        let mut languages: Vec<String> = languages.iter().map(|l| l.as_ref().to_string()).collect();
        languages.sort();
        languages.dedup();
        Self {
            engine: engine.into(),
            languages,
        }
    }
}

/// Lazily constructed, shared engine handles.
///
/// Concurrent first use of the same key runs the factory once; the other
/// callers wait for it. A failed construction is not cached, so a later call
/// retries it. Once built, a handle is shared read-only.
pub struct EngineCache<T: ?Sized, K = EngineKey> {
    cells: Mutex<HashMap<K, Arc<OnceCell<Arc<T>>>>>,
}

impl<T: ?Sized, K: Eq + Hash + Clone> Default for EngineCache<T, K> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: ?Sized, K: Eq + Hash + Clone> EngineCache<T, K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<Arc<T>>> {
        let mut cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(cells.entry(key.clone()).or_default())
    }

    /// Return the handle for `key`, building it with `factory` on first use.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &K, factory: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, E>>,
    {
        let cell = self.cell(key);
        cell.get_or_try_init(factory).await.map(Arc::clone)
    }

    /// Number of keys with a constructed handle.
    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
        cells.values().filter(|c| c.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Call helpers ─────────────────────────────────────────────────────────

/// Bound one engine call by `limit`; expiry is a retryable timeout error.
pub async fn with_timeout<T, Fut>(engine: &str, limit: Duration, fut: Fut) -> Result<T, EngineError>
where
    Fut: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(EngineError::timeout(engine, limit)),
    }
}

/// Retry policy for remote calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

/// Repeat `op` on retryable errors with exponential backoff.
///
/// With 500 ms base and 3 retries the waits are 500 ms → 1 s → 2 s.
/// Non-retryable errors return immediately.
pub async fn with_retry<T, F, Fut>(engine: &str, policy: RetryPolicy, mut op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let backoff = policy.backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms: {}",
                    engine, attempt, policy.max_retries, backoff, e
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a non-success HTTP status from a remote engine to an [`EngineError`].
///
/// 413 is the premium route-around signal; 429 and 5xx are worth retrying;
/// auth failures mean the engine is not usable as configured.
pub fn http_status_error(engine: &str, status: reqwest::StatusCode, body: &str) -> EngineError {
    use crate::error::EngineErrorKind;
    let detail = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
    match status.as_u16() {
        413 => EngineError::payload_too_large(engine, detail),
        429 => EngineError::new(engine, EngineErrorKind::RateLimited, detail),
        401 | 403 => EngineError::unavailable(engine, detail),
        500..=599 => EngineError::new(engine, EngineErrorKind::Http, detail),
        _ => EngineError::new(engine, EngineErrorKind::Http, detail).with_retryable(false),
    }
}

/// Map a reqwest transport failure.
pub fn http_transport_error(engine: &str, err: reqwest::Error) -> EngineError {
    use crate::error::EngineErrorKind;
    if err.is_timeout() {
        EngineError::new(engine, EngineErrorKind::Timeout, err.to_string())
    } else if err.is_connect() {
        EngineError::unavailable(engine, err.to_string()).with_retryable(true)
    } else if err.is_decode() {
        EngineError::new(engine, EngineErrorKind::InvalidResponse, err.to_string())
    } else {
        EngineError::new(engine, EngineErrorKind::Http, err.to_string())
    }
}
