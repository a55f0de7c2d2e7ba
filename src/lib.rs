//! # edgequake-ocr
//!
//! Confidence-driven OCR orchestration for scanned PDFs and images, tuned for
//! Bangla, English and mixed Bangla/English documents.
//!
//! ## Why this crate?
//!
//! A single OCR engine is rarely good enough on real scans: Tesseract is fast
//! but weak on degraded Bengali, neural readers are strong but slow, cloud
//! engines are accurate but cost money and reject large payloads. This crate
//! is the policy layer that decides *when* and *how many times* to call each
//! of them, and how to reconcile their disagreeing answers into one
//! confidence-scored result per page and per document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes
//!  │
//!  ├─ 1. Detect    PDF / image / unknown from magic bytes
//!  ├─ 2. Select    caller tier → local stack or premium cloud
//!  ├─ 3. Convert   ranged pdfium rendering, overlapped with dispatch
//!  ├─ 4. Cascade   primary → raw → remote fallback, per page, until
//!  │               confidence clears the "good" threshold
//!  ├─ 5. Merge     multi-pass / multi-engine tie-breaks, script filter
//!  ├─ 6. Aggregate page order restored, mean confidence
//!  └─ 7. Detect    languages actually present in the text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr::{CallerTier, OcrConfig, OcrPipeline, ScriptProfile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder().concurrency(4).build()?;
//!     let pipeline = OcrPipeline::new(config);
//!     let bytes = std::fs::read("scan.pdf")?;
//!     let doc = pipeline
//!         .process(bytes, ScriptProfile::Mixed, CallerTier::Free)
//!         .await?;
//!     println!("{} ({}%, {:?})", doc.text, doc.confidence, doc.languages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `edgeocr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocr = { version = "0.1", default-features = false }
//! ```
//!
//! ## External engines
//!
//! | Engine | Needs | Used for |
//! |--------|-------|----------|
//! | Tesseract | `tesseract` on `PATH` (or `tesseract_cmd`) with `ben`/`eng` data | every local pass |
//! | Neural sidecar | `neural_endpoint` | second opinion on Bengali |
//! | Vision service | `vision_endpoint` (+ key) | remote fallback for weak pages |
//! | Premium provider | an edgequake-llm provider / API key | whole-document premium tier |
//! | pdfium | `PDFIUM_LIB_PATH` or a system library | PDF rendering |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod input;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod script;
pub mod select;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CascadeThresholds, FilterPolicy, LanguagePolicy, MergePolicy, OcrConfig, OcrConfigBuilder,
};
pub use detect::{detect, FileKind};
pub use engine::premium::DocumentRecognizer;
pub use engine::{EngineCache, Recognition, Recognizer};
pub use error::{ConversionError, EngineError, EngineErrorKind, OcrError, PageError};
pub use ocr::{OcrPipeline, OcrPipelineBuilder};
pub use output::{DocumentResult, EngineAttempt, PageResult};
pub use pipeline::aggregate::aggregate;
pub use pipeline::render::{PageImage, PageSource};
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
pub use script::{Script, ScriptProfile};
pub use select::{select_family, CallerTier, EngineFamily};
