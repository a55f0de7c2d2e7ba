//! Request entry points.
//!
//! [`OcrPipeline`] wires the pieces together for one request:
//!
//! ```text
//! bytes ─▶ detect ─▶ open source ─▶ select family
//!                                    ├─ premium-cloud: whole document, one call
//!                                    │    (any failure routes to the local stack)
//!                                    └─ local-stack: scheduler ─▶ cascade per page
//!                     ─▶ aggregate ─▶ detect languages ─▶ DocumentResult
//! ```
//!
//! ## Why a pipeline object?
//!
//! Engine handles (the neural reader cache, HTTP clients, a resolved premium
//! provider) are expensive to build and safe to share. Building them once in
//! an `OcrPipeline` and reusing it across requests keeps them warm; tests
//! build one with fake recognizers through [`OcrPipelineBuilder`].

use crate::config::OcrConfig;
use crate::detect::{self, FileKind};
use crate::engine::local::LocalStack;
use crate::engine::neural::{NeuralReader, NeuralRecognizer};
use crate::engine::premium::{DocumentRecognizer, PremiumRecognizer};
use crate::engine::tesseract::TesseractCli;
use crate::engine::vision::VisionRecognizer;
use crate::engine::{EngineCache, Recognizer, RetryPolicy};
use crate::error::{ConversionError, EngineError, EngineErrorKind, OcrError};
use crate::input;
use crate::output::{DocumentResult, PageResult};
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::cascade::{Cascade, Strategy};
use crate::pipeline::language::detect_languages;
use crate::pipeline::render::{PageSource, PdfConverter, SingleImageSource};
use crate::pipeline::scheduler::{CascadeWorker, PageWorker, Scheduler};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::script::ScriptProfile;
use crate::select::{select_family, CallerTier, EngineFamily};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Feature label added when a PDF could not be rendered and the upload was
/// read as a single image instead.
pub const FEATURE_IMAGE_FALLBACK: &str = "image-fallback";

/// Feature label added when the premium family failed and the local stack
/// produced the result.
pub const FEATURE_ROUTE_AROUND: &str = "route-around";

/// An opened document plus what it took to open it.
struct Opened {
    source: Arc<dyn PageSource>,
    features: Vec<String>,
}

/// The OCR orchestrator. Cheap to share behind an `Arc`; every method takes
/// `&self`.
pub struct OcrPipeline {
    config: OcrConfig,
    cascade: Arc<Cascade>,
    premium: OnceCell<Arc<dyn DocumentRecognizer>>,
}

impl std::fmt::Debug for OcrPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrPipeline")
            .field("config", &self.config)
            .field("premium_ready", &self.premium.initialized())
            .finish()
    }
}

impl OcrPipeline {
    /// Build a pipeline with the engines `config` describes.
    pub fn new(config: OcrConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: OcrConfig) -> OcrPipelineBuilder {
        OcrPipelineBuilder {
            config,
            local: None,
            fallback: None,
            premium: None,
            readers: None,
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    fn progress(&self) -> ProgressCallback {
        self.config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback))
    }

    /// Recognise an in-memory upload.
    ///
    /// `hint` is advisory: it picks engine languages and filter behaviour,
    /// while the reported `languages` come from the recognised text. `tier`
    /// only chooses the engine family.
    ///
    /// # Errors
    /// Only document-wide failures: empty input, an undetectable or
    /// undecodable format. Page failures degrade their page and are kept.
    pub async fn process(
        &self,
        bytes: impl Into<Vec<u8>>,
        hint: ScriptProfile,
        tier: CallerTier,
    ) -> Result<DocumentResult, OcrError> {
        let start = Instant::now();
        let bytes: Arc<Vec<u8>> = Arc::new(bytes.into());
        if bytes.is_empty() {
            return Err(OcrError::EmptyInput);
        }
        let source_bytes = bytes.len();
        let family = select_family(tier);
        info!(
            "OCR request: {} bytes, hint {}, tier {:?} → {}",
            source_bytes, hint, tier, family
        );

        let opened = self.open_source(bytes).await?;
        let mut features = opened.features;

        let pages = match family {
            EngineFamily::PremiumCloud => {
                match self.run_premium(opened.source.as_ref(), source_bytes, hint).await {
                    Ok(pages) => {
                        features.insert(0, EngineFamily::PremiumCloud.label().to_string());
                        Some(pages)
                    }
                    Err(e) => {
                        if e.is_payload_too_large() {
                            warn!("Premium engine rejected the payload, routing to local stack: {}", e);
                        } else {
                            warn!("Premium engine failed, routing to local stack: {}", e);
                        }
                        features.push(FEATURE_ROUTE_AROUND.to_string());
                        None
                    }
                }
            }
            EngineFamily::LocalStack => None,
        };

        let result = match pages {
            Some(pages) => {
                let total = opened.source.page_count();
                self.finish(pages, total, EngineFamily::PremiumCloud, features)
            }
            None => self.run_local(opened.source, hint, features).await,
        };

        info!(
            "OCR finished in {}ms: {} pages, confidence {:.2}, engine {}",
            start.elapsed().as_millis(),
            result.pages,
            result.confidence,
            result.engine
        );
        Ok(result)
    }

    /// Run the local stack over any [`PageSource`].
    ///
    /// This is the seam for callers that already hold page images, and for
    /// tests that want to observe conversion.
    pub async fn process_source(
        &self,
        source: Arc<dyn PageSource>,
        hint: ScriptProfile,
    ) -> Result<DocumentResult, OcrError> {
        if source.page_count() == 0 {
            return Err(OcrError::EmptyInput);
        }
        Ok(self.run_local(source, hint, Vec::new()).await)
    }

    /// Read a local path or download an HTTP(S) URL, then [`process`](Self::process) it.
    pub async fn process_file(
        &self,
        input: impl AsRef<str>,
        hint: ScriptProfile,
        tier: CallerTier,
    ) -> Result<DocumentResult, OcrError> {
        let resolved = input::resolve_input(input.as_ref(), self.config.download_timeout_secs).await?;
        debug!("Resolved input {}", resolved.display_name());
        self.process(resolved.bytes, hint, tier).await
    }

    /// Process `input` and write the result as pretty JSON to `output_path`.
    ///
    /// The write is atomic: a temporary file next to the target is renamed
    /// into place, so readers never see a partial document.
    pub async fn process_to_file(
        &self,
        input: impl AsRef<str>,
        output_path: impl AsRef<Path>,
        hint: ScriptProfile,
        tier: CallerTier,
    ) -> Result<DocumentResult, OcrError> {
        let result = self.process_file(input, hint, tier).await?;
        write_json_atomic(output_path.as_ref(), &result).await?;
        Ok(result)
    }

    /// Synchronous wrapper around [`process`](Self::process).
    ///
    /// Creates a temporary tokio runtime internally. Do not call from within
    /// an async context.
    pub fn process_sync(
        &self,
        bytes: impl Into<Vec<u8>>,
        hint: ScriptProfile,
        tier: CallerTier,
    ) -> Result<DocumentResult, OcrError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.process(bytes, hint, tier))
    }

    // ── Source opening ───────────────────────────────────────────────────

    async fn open_source(&self, bytes: Arc<Vec<u8>>) -> Result<Opened, OcrError> {
        let dpi = self.config.dpi;
        let kind = detect::detect(&bytes);
        debug!("Detected file kind: {:?}", kind);

        match kind {
            FileKind::Pdf => match PdfConverter::open(Arc::clone(&bytes), dpi, self.config.max_rendered_pixels).await {
                Ok(pdf) => Ok(Opened {
                    source: Arc::new(pdf),
                    features: Vec::new(),
                }),
                Err(pdf_err) => {
                    warn!("PDF conversion failed ({}), trying single-image decode", pdf_err);
                    match SingleImageSource::open(bytes, dpi).await {
                        Ok(img) => Ok(Opened {
                            source: Arc::new(img),
                            features: vec![FEATURE_IMAGE_FALLBACK.to_string()],
                        }),
                        Err(_) => Err(OcrError::Conversion(pdf_err)),
                    }
                }
            },
            FileKind::Image => {
                let img = SingleImageSource::open(bytes, dpi).await?;
                Ok(Opened {
                    source: Arc::new(img),
                    features: Vec::new(),
                })
            }
            FileKind::Unknown => self.open_unknown(bytes).await,
        }
    }

    async fn open_unknown(&self, bytes: Arc<Vec<u8>>) -> Result<Opened, OcrError> {
        let magic = detect::magic(&bytes);
        match SingleImageSource::open(Arc::clone(&bytes), self.config.dpi).await {
            Ok(img) => {
                debug!("Unknown signature decoded as an image");
                return Ok(Opened {
                    source: Arc::new(img),
                    features: Vec::new(),
                });
            }
            Err(e) => debug!("Unknown input is not an image: {}", e),
        }

        if detect::has_late_pdf_header(&bytes) {
            match PdfConverter::open(bytes, self.config.dpi, self.config.max_rendered_pixels).await {
                Ok(pdf) => {
                    return Ok(Opened {
                        source: Arc::new(pdf),
                        features: Vec::new(),
                    })
                }
                Err(e) => warn!("Late %PDF header found but conversion failed: {}", e),
            }
        }

        Err(OcrError::UnsupportedFormat { magic })
    }

    // ── Engine families ──────────────────────────────────────────────────

    async fn premium_engine(&self) -> Result<Arc<dyn DocumentRecognizer>, EngineError> {
        self.premium
            .get_or_try_init(|| async {
                let engine = PremiumRecognizer::from_config(&self.config)?;
                Ok::<_, EngineError>(Arc::new(engine) as Arc<dyn DocumentRecognizer>)
            })
            .await
            .map(Arc::clone)
    }

    async fn run_premium(
        &self,
        source: &dyn PageSource,
        source_bytes: usize,
        hint: ScriptProfile,
    ) -> Result<Vec<PageResult>, EngineError> {
        let engine = self.premium_engine().await?;
        let total = source.page_count();
        engine.check_payload(total, source_bytes)?;

        let pages = source.convert_range(1, total).await.map_err(|e: ConversionError| {
            EngineError::new(engine.name(), EngineErrorKind::Process, e.to_string())
        })?;

        let recognitions = engine.recognize_document(&pages, source_bytes, hint).await?;
        if recognitions.len() != pages.len() {
            return Err(EngineError::new(
                engine.name(),
                EngineErrorKind::InvalidResponse,
                format!("{} pages in, {} results out", pages.len(), recognitions.len()),
            ));
        }

        // Progress only once the family is settled; a route-around starts
        // its own document in the scheduler.
        let progress = self.progress();
        progress.on_document_start(total);
        progress.on_batch_converted(1, total);
        let results = pages
            .iter()
            .zip(recognitions)
            .map(|(page, rec)| {
                progress.on_page_complete(page.page_number, total, rec.confidence);
                PageResult::resolved(page.page_number, rec.text, rec.confidence, rec.label)
            })
            .collect();
        Ok(results)
    }

    async fn run_local(
        &self,
        source: Arc<dyn PageSource>,
        hint: ScriptProfile,
        mut features: Vec<String>,
    ) -> DocumentResult {
        let worker: Arc<dyn PageWorker> = Arc::new(CascadeWorker::new(Arc::clone(&self.cascade), hint));
        let scheduled = Scheduler::new(self.config.batch_size, self.config.concurrency)
            .with_progress(self.config.progress_callback.clone())
            .run(source, worker)
            .await;

        let ran: BTreeSet<String> = scheduled
            .outputs
            .iter()
            .flat_map(|o| o.features.iter().cloned())
            .collect();
        // Strategy labels in cascade order, then anything else in name order.
        let mut strategy_features: Vec<String> = Strategy::ORDER
            .iter()
            .map(|s| s.label())
            .filter(|l| ran.contains(*l))
            .map(str::to_string)
            .collect();
        strategy_features.extend(
            ran.iter()
                .filter(|l| !Strategy::ORDER.iter().any(|s| s.label() == l.as_str()))
                .cloned(),
        );

        features.insert(0, EngineFamily::LocalStack.label().to_string());
        features.extend(strategy_features);

        let pages = scheduled.outputs.into_iter().map(|o| o.result).collect();
        self.finish(pages, scheduled.total_pages, EngineFamily::LocalStack, features)
    }

    fn finish(
        &self,
        pages: Vec<PageResult>,
        total_pages: usize,
        family: EngineFamily,
        mut features: Vec<String>,
    ) -> DocumentResult {
        let aggregated = aggregate(pages, total_pages);
        let detected = detect_languages(&aggregated.text, &self.config.language);

        let mut seen = BTreeSet::new();
        features.retain(|f| seen.insert(f.clone()));

        let result = DocumentResult {
            text: aggregated.text,
            confidence: aggregated.confidence,
            pages: total_pages,
            languages: detected.codes(),
            mode: detected.mode,
            engine: family.label().to_string(),
            features,
            pages_data: aggregated.pages,
        };

        let failed = result.failed_pages().count();
        if failed > 0 {
            warn!("{} of {} pages degraded", failed, total_pages);
        }
        self.progress()
            .on_document_complete(total_pages, result.succeeded_pages());
        result
    }
}

async fn write_json_atomic(path: &Path, result: &DocumentResult) -> Result<(), OcrError> {
    let write_err = |source: std::io::Error| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let json = serde_json::to_vec_pretty(result)
        .map_err(|e| OcrError::Internal(format!("Failed to serialise result: {}", e)))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builds an [`OcrPipeline`], optionally with injected engines.
///
/// Anything not injected is built from the config: Tesseract (plus the
/// neural sidecar when `neural_endpoint` is set) as the local stack, the
/// vision service as the remote fallback when `vision_endpoint` is set, and
/// the premium engine lazily on first premium request.
pub struct OcrPipelineBuilder {
    config: OcrConfig,
    local: Option<Arc<dyn Recognizer>>,
    fallback: Option<Arc<dyn Recognizer>>,
    premium: Option<Arc<dyn DocumentRecognizer>>,
    readers: Option<Arc<EngineCache<NeuralReader>>>,
}

impl OcrPipelineBuilder {
    /// Replace the local multi-pass stack.
    pub fn local(mut self, engine: Arc<dyn Recognizer>) -> Self {
        self.local = Some(engine);
        self
    }

    /// Replace the remote fallback recognizer.
    pub fn fallback(mut self, engine: Arc<dyn Recognizer>) -> Self {
        self.fallback = Some(engine);
        self
    }

    /// Use this whole-document engine for the premium family.
    pub fn premium(mut self, engine: Arc<dyn DocumentRecognizer>) -> Self {
        self.premium = Some(engine);
        self
    }

    /// Share a neural reader cache with other pipelines.
    pub fn reader_cache(mut self, cache: Arc<EngineCache<NeuralReader>>) -> Self {
        self.readers = Some(cache);
        self
    }

    pub fn build(self) -> OcrPipeline {
        let config = self.config;
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
        };

        let local = match self.local {
            Some(local) => local,
            None => {
                let mut stack = LocalStack::new(
                    Arc::new(TesseractCli::new(config.tesseract_cmd.clone())),
                    config.merge,
                    config.filter,
                    config.engine_timeout(),
                );
                if let Some(ref endpoint) = config.neural_endpoint {
                    let readers = self.readers.unwrap_or_default();
                    stack = stack.with_neural(Arc::new(NeuralRecognizer::new(endpoint.clone(), readers, retry)));
                }
                Arc::new(stack) as Arc<dyn Recognizer>
            }
        };

        let fallback = self.fallback.or_else(|| {
            config.vision_endpoint.as_ref().map(|endpoint| {
                Arc::new(VisionRecognizer::new(endpoint.clone(), config.vision_api_key.clone(), retry))
                    as Arc<dyn Recognizer>
            })
        });

        let mut cascade = Cascade::new(local, config.thresholds, config.engine_timeout());
        if let Some(fallback) = fallback {
            cascade = cascade.with_fallback(fallback);
        }

        let premium = match self.premium {
            Some(engine) => OnceCell::new_with(Some(engine)),
            None => OnceCell::new(),
        };

        OcrPipeline {
            config,
            cascade: Arc::new(cascade),
            premium,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Recognition;
    use crate::pipeline::render::PageImage;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use crate::progress::OcrProgressCallback;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Constant(f64, &'static str);

    #[async_trait]
    impl Recognizer for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        async fn recognize(&self, _page: &PageImage, _p: ScriptProfile) -> Result<Recognition, EngineError> {
            Ok(Recognition::new(self.1, self.0, "constant"))
        }
    }

    struct TooLarge;

    #[async_trait]
    impl DocumentRecognizer for TooLarge {
        fn name(&self) -> &str {
            "premium"
        }

        fn check_payload(&self, page_count: usize, _bytes: usize) -> Result<(), EngineError> {
            Err(EngineError::payload_too_large("premium", format!("{page_count} pages")))
        }

        async fn recognize_document(
            &self,
            _pages: &[PageImage],
            _bytes: usize,
            _p: ScriptProfile,
        ) -> Result<Vec<Recognition>, EngineError> {
            unreachable!("payload check rejects first")
        }
    }

    /// Answers every page with the same text, or a fixed number of results.
    struct Scripted {
        text: &'static str,
        confidence: f64,
        results: Option<usize>,
    }

    #[async_trait]
    impl DocumentRecognizer for Scripted {
        fn name(&self) -> &str {
            "premium"
        }

        async fn recognize_document(
            &self,
            pages: &[PageImage],
            _bytes: usize,
            _p: ScriptProfile,
        ) -> Result<Vec<Recognition>, EngineError> {
            let n = self.results.unwrap_or(pages.len());
            Ok((0..n)
                .map(|_| Recognition::new(self.text, self.confidence, "premium"))
                .collect())
        }
    }

    #[derive(Default)]
    struct Starts {
        starts: AtomicUsize,
        completes: AtomicUsize,
    }

    impl OcrProgressCallback for Starts {
        fn on_document_start(&self, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _total_pages: usize, _success_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn png() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([250, 250, 250])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn pipeline(local: Constant) -> OcrPipelineBuilder {
        OcrPipeline::builder(OcrConfig::default()).local(Arc::new(local))
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let p = pipeline(Constant(95.0, "x")).build();
        let err = p.process(Vec::new(), ScriptProfile::English, CallerTier::Free).await.unwrap_err();
        assert!(matches!(err, OcrError::EmptyInput));
    }

    #[tokio::test]
    async fn image_upload_runs_local_stack() {
        let p = pipeline(Constant(95.0, "Hello there")).build();
        let doc = p.process(png(), ScriptProfile::English, CallerTier::Free).await.unwrap();
        assert_eq!(doc.pages, 1);
        assert_eq!(doc.engine, "local-stack");
        assert_eq!(doc.features, vec!["local-stack", "primary"]);
        assert_eq!(doc.text, "Hello there");
        assert_eq!(doc.confidence, 95.0);
    }

    #[tokio::test]
    async fn oversized_premium_payload_routes_to_local() {
        let p = pipeline(Constant(92.0, "local text"))
            .premium(Arc::new(TooLarge))
            .build();
        let doc = p.process(png(), ScriptProfile::English, CallerTier::Subscriber).await.unwrap();
        assert_eq!(doc.engine, "local-stack");
        assert!(doc.features.contains(&FEATURE_ROUTE_AROUND.to_string()));
        assert_eq!(doc.text, "local text");
    }

    #[tokio::test]
    async fn json_output_is_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.png");
        std::fs::write(&input, png()).unwrap();
        let out = dir.path().join("nested").join("scan.json");

        let p = pipeline(Constant(91.0, "Some words")).build();
        let doc = p
            .process_to_file(input.to_str().unwrap(), &out, ScriptProfile::English, CallerTier::Trial)
            .await
            .unwrap();

        let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(written["text"], doc.text);
        assert_eq!(written["pages"], 1);
        assert_eq!(written["engine"], "local-stack");
        assert!(!out.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn premium_success_reports_premium_family() {
        let p = pipeline(Constant(50.0, "unused"))
            .premium(Arc::new(Scripted {
                text: "Premium words here",
                confidence: 97.0,
                results: None,
            }))
            .build();
        let doc = p.process(png(), ScriptProfile::English, CallerTier::Subscriber).await.unwrap();

        assert_eq!(doc.engine, "premium-cloud");
        assert_eq!(doc.features[0], "premium-cloud");
        assert!(!doc.features.contains(&FEATURE_ROUTE_AROUND.to_string()));
        assert_eq!(doc.pages_data.len(), 1);
        assert_eq!(doc.pages_data[0].page_number, 1);
        assert_eq!(doc.pages_data[0].text, "Premium words here");
        assert_eq!(doc.pages_data[0].confidence, 97.0);
        assert_eq!(doc.pages_data[0].strategy.as_deref(), Some("premium"));
        assert_eq!(doc.text, "Premium words here");
        assert_eq!(doc.confidence, 97.0);
    }

    #[tokio::test]
    async fn premium_result_count_mismatch_routes_to_local() {
        let p = pipeline(Constant(93.0, "local text"))
            .premium(Arc::new(Scripted {
                text: "extra",
                confidence: 99.0,
                results: Some(2),
            }))
            .build();
        let doc = p.process(png(), ScriptProfile::English, CallerTier::Subscriber).await.unwrap();

        assert_eq!(doc.engine, "local-stack");
        assert_eq!(doc.features[0], "local-stack");
        assert!(doc.features.contains(&FEATURE_ROUTE_AROUND.to_string()));
        assert_eq!(doc.text, "local text");
    }

    #[tokio::test]
    async fn route_around_starts_the_document_once() {
        let starts = Arc::new(Starts::default());
        let config = OcrConfig::builder()
            .progress_callback(starts.clone())
            .build()
            .unwrap();
        let p = OcrPipeline::builder(config)
            .local(Arc::new(Constant(93.0, "local text")))
            .premium(Arc::new(Scripted {
                text: "short",
                confidence: 99.0,
                results: Some(0),
            }))
            .build();
        let doc = p.process(png(), ScriptProfile::English, CallerTier::Subscriber).await.unwrap();

        assert_eq!(doc.engine, "local-stack");
        assert_eq!(starts.starts.load(Ordering::SeqCst), 1);
        assert_eq!(starts.completes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn premium_success_starts_the_document_once() {
        let starts = Arc::new(Starts::default());
        let config = OcrConfig::builder()
            .progress_callback(starts.clone())
            .build()
            .unwrap();
        let p = OcrPipeline::builder(config)
            .local(Arc::new(Constant(93.0, "local text")))
            .premium(Arc::new(Scripted {
                text: "Premium words",
                confidence: 96.0,
                results: None,
            }))
            .build();
        p.process(png(), ScriptProfile::English, CallerTier::Subscriber).await.unwrap();

        assert_eq!(starts.starts.load(Ordering::SeqCst), 1);
        assert_eq!(starts.completes.load(Ordering::SeqCst), 1);
    }
}
