//! Progress-callback trait for per-page recognition events.
//!
//! Inject an [`Arc<dyn OcrProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to observe the
//! pipeline as it converts batches and settles pages.
//!
//! # Event order
//!
//! `on_document_start` fires once the page count is known. Batch events
//! (`on_batch_converted`) interleave freely with page events because
//! conversion of batch N+1 overlaps dispatch of batch N. For a given page,
//! `on_page_start` fires after the task has acquired a worker slot and
//! exactly one of `on_page_complete` / `on_page_error` fires before the slot
//! is released. `on_document_complete` fires after the aggregation barrier.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr::{OcrProgressCallback, OcrConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl OcrProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, confidence: f64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({:.1}%)", page_num, total_pages, confidence);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = OcrConfig::builder()
//!     .progress_callback(counter as Arc<dyn OcrProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it converts and recognises pages.
///
/// Implementations must be `Send + Sync`: page events arrive concurrently
/// from different tasks. All methods default to no-ops.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once the document's page count is known.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a batch of pages (1-indexed, inclusive) has been converted.
    fn on_batch_converted(&self, first_page: usize, last_page: usize) {
        let _ = (first_page, last_page);
    }

    /// Called when a page task acquires a worker slot.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page settles with a usable result.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, confidence: f64) {
        let _ = (page_num, total_pages, confidence);
    }

    /// Called when a page degrades to an empty, zero-confidence result.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been accounted for.
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;
