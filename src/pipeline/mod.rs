//! Pipeline stages for confidence-driven OCR.
//!
//! Each submodule implements one step. Keeping them apart makes each
//! independently testable and lets an engine or a policy change without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ scheduler ──▶ cascade ──────────────▶ aggregate ──▶ language
//! (pages)    (batches,     (primary/raw/remote;    (page order,   (scripts
//!             semaphore)    local stack merges,     mean conf)     found)
//!                           filters, cleans)
//! ```
//!
//! 1. [`render`]: PDF or raster upload to [`render::PageImage`]s, in
//!    ranges, on the blocking pool
//! 2. [`scheduler`]: converts batch N+1 while batch N's page tasks run,
//!    at most `concurrency` pages in flight
//! 3. [`cascade`]: per-page escalation until confidence clears the
//!    "good" threshold
//! 4. [`enhance`], [`encode`]: image preparation and payload encoding used
//!    by the engines
//! 5. [`merge`], [`filter`], [`postprocess`]: ensemble tie-breaks,
//!    foreign-script suppression and deterministic cleanup
//! 6. [`aggregate`]: the single point where page order is restored
//! 7. [`language`]: scripts actually present in the final text

pub mod aggregate;
pub mod cascade;
pub mod encode;
pub mod enhance;
pub mod filter;
pub mod language;
pub mod merge;
pub mod postprocess;
pub mod render;
pub mod scheduler;
