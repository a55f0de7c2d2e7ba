//! Configuration types for OCR orchestration.
//!
//! Every threshold the cascade, merger, filter and language detector use is a
//! field here rather than a constant in the code that reads it. The numbers
//! were tuned against scanned Bangla and English office documents; callers
//! with a different corpus should recalibrate them, not patch the pipeline.
//!
//! # Design choice: builder over constructor
//! Same as elsewhere in the crate: callers set only what they care about,
//! `build()` validates the combination.

use crate::error::OcrError;
use crate::progress::ProgressCallback;
use crate::script::Script;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for one OCR pipeline.
///
/// # Example
/// ```rust
/// use edgequake_ocr::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .dpi(300)
///     .concurrency(4)
///     .batch_size(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Rendering DPI for PDF pages. Range: 72–600. Default: 300.
    ///
    /// Bengali conjuncts and diacritics lose strokes below ~250 DPI; 300 is
    /// the lowest setting where the classic engine reads them reliably.
    pub dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 4000.
    ///
    /// A4 at 300 DPI is 2480 × 3508, so ordinary pages are untouched; the
    /// cap only bites on posters and engineering drawings.
    pub max_rendered_pixels: u32,

    /// Pages converted per batch before their tasks are dispatched. Default: 4.
    pub batch_size: usize,

    /// Maximum page tasks in flight at once. Default: min(4, CPUs).
    ///
    /// Independent of `batch_size`: conversion of the next batch continues
    /// while tasks wait for a slot.
    pub concurrency: usize,

    /// Cascade escalation thresholds.
    pub thresholds: CascadeThresholds,

    /// Ensemble merge tie-break policy.
    pub merge: MergePolicy,

    /// Hallucination filter policy.
    pub filter: FilterPolicy,

    /// Language auto-detection policy.
    pub language: LanguagePolicy,

    /// Per engine call timeout in seconds. Default: 60.
    pub engine_timeout_secs: u64,

    /// Retry attempts for retryable remote-engine failures. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Tesseract executable. Default: `tesseract` on `PATH`.
    pub tesseract_cmd: String,

    /// Neural text-detection/recognition sidecar base URL. `None` disables it.
    pub neural_endpoint: Option<String>,

    /// Cloud vision recognizer endpoint used as the per-page fallback.
    /// `None` disables the remote fallback stage.
    pub vision_endpoint: Option<String>,

    /// Bearer token for the cloud vision recognizer.
    pub vision_api_key: Option<String>,

    /// Pre-constructed LLM provider for the premium engine.
    /// Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Premium provider name (e.g. "mistral", "openai").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Premium model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Sampling temperature for the premium engine. Default: 0.0.
    pub temperature: f32,

    /// Output token budget for the premium whole-document call. Default: 8192.
    pub max_tokens: usize,

    /// Documents with more pages are rejected before calling the premium
    /// engine and routed to the local stack. Default: 50.
    pub premium_max_pages: usize,

    /// Same, for the raw upload size in bytes. Default: 50 MiB.
    pub premium_max_bytes: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-page progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(4)
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            batch_size: 4,
            concurrency: default_concurrency(),
            thresholds: CascadeThresholds::default(),
            merge: MergePolicy::default(),
            filter: FilterPolicy::default(),
            language: LanguagePolicy::default(),
            engine_timeout_secs: 60,
            max_retries: 3,
            retry_backoff_ms: 500,
            tesseract_cmd: "tesseract".to_string(),
            neural_endpoint: None,
            vision_endpoint: None,
            vision_api_key: None,
            provider: None,
            provider_name: None,
            model: None,
            temperature: 0.0,
            max_tokens: 8192,
            premium_max_pages: 50,
            premium_max_bytes: 50 * 1024 * 1024,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .field("thresholds", &self.thresholds)
            .field("merge", &self.merge)
            .field("filter", &self.filter)
            .field("language", &self.language)
            .field("engine_timeout_secs", &self.engine_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("neural_endpoint", &self.neural_endpoint)
            .field("vision_endpoint", &self.vision_endpoint)
            .field("vision_api_key", &self.vision_api_key.as_ref().map(|_| "<redacted>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("premium_max_pages", &self.premium_max_pages)
            .field("premium_max_bytes", &self.premium_max_bytes)
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn engine_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.engine_timeout_secs)
    }
}

/// Builder for [`OcrConfig`].
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn thresholds(mut self, t: CascadeThresholds) -> Self {
        self.config.thresholds = t;
        self
    }

    pub fn good_threshold(mut self, v: f64) -> Self {
        self.config.thresholds.good = v.clamp(0.0, 100.0);
        self
    }

    pub fn floor_threshold(mut self, v: f64) -> Self {
        self.config.thresholds.floor = v.clamp(0.0, 100.0);
        self
    }

    pub fn fallback_confidence(mut self, v: f64) -> Self {
        self.config.thresholds.fallback_confidence = v.clamp(0.0, 100.0);
        self
    }

    pub fn merge_policy(mut self, p: MergePolicy) -> Self {
        self.config.merge = p;
        self
    }

    pub fn filter_policy(mut self, p: FilterPolicy) -> Self {
        self.config.filter = p;
        self
    }

    pub fn language_policy(mut self, p: LanguagePolicy) -> Self {
        self.config.language = p;
        self
    }

    pub fn engine_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn neural_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.neural_endpoint = Some(url.into());
        self
    }

    pub fn vision_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.vision_endpoint = Some(url.into());
        self
    }

    pub fn vision_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.vision_api_key = Some(key.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn premium_max_pages(mut self, n: usize) -> Self {
        self.config.premium_max_pages = n.max(1);
        self
    }

    pub fn premium_max_bytes(mut self, n: usize) -> Self {
        self.config.premium_max_bytes = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 || c.batch_size == 0 {
            return Err(OcrError::InvalidConfig(
                "Concurrency and batch size must be ≥ 1".into(),
            ));
        }
        let t = &c.thresholds;
        if t.floor > t.good {
            return Err(OcrError::InvalidConfig(format!(
                "Floor threshold {} exceeds good threshold {}",
                t.floor, t.good
            )));
        }
        if t.fallback_confidence < t.floor {
            return Err(OcrError::InvalidConfig(format!(
                "Fallback confidence {} is below the floor {}; a fallback result would never settle the page",
                t.fallback_confidence, t.floor
            )));
        }
        if !(0.0..=1.0).contains(&c.filter.mixed_token_ratio)
            || !(0.0..=1.0).contains(&c.filter.confirmed_token_ratio)
            || !(0.0..=1.0).contains(&c.language.share_threshold)
        {
            return Err(OcrError::InvalidConfig(
                "Ratios must lie in 0.0–1.0".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Policies ─────────────────────────────────────────────────────────────

/// When the cascade escalates and what a remote fallback is worth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeThresholds {
    /// Confidence at which a page is settled and no more work is done. Default: 90.
    pub good: f64,
    /// Below this after the local strategies, the remote fallback runs. Default: 75.
    pub floor: f64,
    /// Confidence assigned to a successful remote fallback. Default: 100.
    pub fallback_confidence: f64,
}

impl Default for CascadeThresholds {
    fn default() -> Self {
        Self {
            good: 90.0,
            floor: 75.0,
            fallback_confidence: 100.0,
        }
    }
}

/// Tie-break knobs for preferring a secondary engine over the primary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergePolicy {
    /// Secondary wins outright when it beats the primary by more than this. Default: 5.
    pub clear_margin: f64,
    /// A primary below this is "weak". Default: 60.
    pub weak_threshold: f64,
    /// With a weak primary, the secondary wins unless it trails by more than this. Default: 10.
    pub not_worse_tolerance: f64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            clear_margin: 5.0,
            weak_threshold: 60.0,
            not_worse_tolerance: 10.0,
        }
    }
}

/// Hallucination filter knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterPolicy {
    /// A mixed token survives intact if its foreign share is at most this. Default: 0.30.
    pub mixed_token_ratio: f64,
    /// Same, once foreign text has been confirmed by a second pass. Default: 0.60.
    pub confirmed_token_ratio: f64,
    /// Confirmation pass confidence required to trust foreign text. Default: 75.
    pub confirm_threshold: f64,
    /// Minimum letters for a pure-foreign token to survive once confirmed. Default: 3.
    pub confirmed_min_letters: usize,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            mixed_token_ratio: 0.30,
            confirmed_token_ratio: 0.60,
            confirm_threshold: 75.0,
            confirmed_min_letters: 3,
        }
    }
}

/// Language auto-detection knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LanguagePolicy {
    /// A script is reported when its share of letters exceeds this. Default: 0.20.
    pub share_threshold: f64,
    /// Below this many letters the default script is reported. Default: 20.
    pub min_chars: usize,
    /// Reported for short or letterless text. Default: Latin.
    pub default_script: Script,
}

impl Default for LanguagePolicy {
    fn default() -> Self {
        Self {
            share_threshold: 0.20,
            min_chars: 20,
            default_script: Script::Latin,
        }
    }
}
