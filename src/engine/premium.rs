//! Premium whole-document recognizer.
//!
//! Unlike the per-page engines, the premium engine sees every page of the
//! document in a single vision-model call and answers with one structured
//! markup stream (headings, tables, lists). The stream is split back into
//! pages on `<!-- page N -->` markers.
//!
//! ## Confidence
//!
//! The model reports no scores, so each page gets a heuristic in 0–100:
//!
//! ```text
//! 100 × ( 0.4 × (1 − bad_char_ratio)
//!       + 0.3 × alphanumeric_density
//!       + 0.3 × word_like_token_share )
//! ```
//!
//! *bad chars* are U+FFFD and control characters other than `\n \r \t`;
//! density is measured on the text with markup stripped; a token is
//! word-like when it is 2–20 characters long. Clean prose lands in the
//! 90s, symbol soup and decoding failures fall well below the cascade
//! floor, and an empty page scores 0.
//!
//! ## Payload limits
//!
//! Oversized documents are rejected with
//! [`EngineErrorKind::PayloadTooLarge`](crate::error::EngineErrorKind)
//! before any call is made; the provider answering "413" or "too large"
//! maps to the same kind. Either way the request is routed to the local
//! family.

use super::{with_retry, Recognition, RetryPolicy};
use crate::config::OcrConfig;
use crate::error::{EngineError, EngineErrorKind};
use crate::pipeline::{encode, postprocess, render::PageImage};
use crate::prompts::{premium_user_prompt, PREMIUM_SYSTEM_PROMPT};
use crate::script::ScriptProfile;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const ENGINE: &str = "premium";

/// A recognizer that takes the whole document in one call.
#[async_trait]
pub trait DocumentRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Reject a document before conversion if it is over the engine's limits.
    fn check_payload(&self, page_count: usize, source_bytes: usize) -> Result<(), EngineError> {
        let _ = (page_count, source_bytes);
        Ok(())
    }

    /// One [`Recognition`] per entry of `pages`, in the same order.
    async fn recognize_document(
        &self,
        pages: &[PageImage],
        source_bytes: usize,
        profile: ScriptProfile,
    ) -> Result<Vec<Recognition>, EngineError>;
}

/// [`DocumentRecognizer`] backed by an edgequake-llm vision provider.
pub struct PremiumRecognizer {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    max_pages: usize,
    max_bytes: usize,
    retry: RetryPolicy,
}

impl PremiumRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &OcrConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_pages: config.premium_max_pages,
            max_bytes: config.premium_max_bytes,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
            },
        }
    }

    /// Build from config, resolving the provider through [`resolve_provider`].
    pub fn from_config(config: &OcrConfig) -> Result<Self, EngineError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Resolve the premium provider, from most specific to least specific:
///
/// 1. the pre-built `config.provider`;
/// 2. `config.provider_name` (+ `config.model`) through [`ProviderFactory`];
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set;
/// 4. [`ProviderFactory::from_env`] auto-detection.
///
/// Failure means the premium family is unavailable and the caller should
/// use the local stack.
pub fn resolve_provider(config: &OcrConfig) -> Result<Arc<dyn LLMProvider>, EngineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let named = |name: &str, model: &str| {
        ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| EngineError::unavailable(ENGINE, format!("provider '{name}': {e}")))
    };

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("mistral-ocr-latest");
        return named(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return named(&prov, &model);
        }
    }

    let (llm, _embedding) = ProviderFactory::from_env()
        .map_err(|e| EngineError::unavailable(ENGINE, format!("no provider in environment: {e}")))?;
    Ok(llm)
}

/// Limit check shared by [`PremiumRecognizer`] and tests.
pub fn check_limits(
    page_count: usize,
    source_bytes: usize,
    max_pages: usize,
    max_bytes: usize,
) -> Result<(), EngineError> {
    if page_count > max_pages {
        return Err(EngineError::payload_too_large(
            ENGINE,
            format!("{page_count} pages exceeds the {max_pages}-page limit"),
        ));
    }
    if source_bytes > max_bytes {
        return Err(EngineError::payload_too_large(
            ENGINE,
            format!("{source_bytes} bytes exceeds the {max_bytes}-byte limit"),
        ));
    }
    Ok(())
}

fn provider_error(detail: String) -> EngineError {
    let lower = detail.to_lowercase();
    if lower.contains("413") || lower.contains("too large") {
        EngineError::payload_too_large(ENGINE, detail)
    } else if lower.contains("429") || lower.contains("rate limit") {
        EngineError::new(ENGINE, EngineErrorKind::RateLimited, detail)
    } else {
        EngineError::new(ENGINE, EngineErrorKind::Http, detail)
    }
}

#[async_trait]
impl DocumentRecognizer for PremiumRecognizer {
    fn name(&self) -> &str {
        ENGINE
    }

    fn check_payload(&self, page_count: usize, source_bytes: usize) -> Result<(), EngineError> {
        check_limits(page_count, source_bytes, self.max_pages, self.max_bytes)
    }

    async fn recognize_document(
        &self,
        pages: &[PageImage],
        source_bytes: usize,
        profile: ScriptProfile,
    ) -> Result<Vec<Recognition>, EngineError> {
        self.check_payload(pages.len(), source_bytes)?;
        let start = Instant::now();

        let images = pages.to_vec();
        let attachments = tokio::task::spawn_blocking(move || {
            images
                .iter()
                .map(|p| encode::encode_page(&p.image))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| EngineError::new(ENGINE, EngineErrorKind::Process, e.to_string()))?
        .map_err(|e| EngineError::new(ENGINE, EngineErrorKind::Process, e.to_string()))?;

        let messages = vec![
            ChatMessage::system(PREMIUM_SYSTEM_PROMPT),
            ChatMessage::user_with_images(&premium_user_prompt(profile, pages.len()), attachments),
        ];
        let options = self.options();

        let response = with_retry(ENGINE, self.retry, || {
            let (messages, options) = (&messages, &options);
            async move {
                self.provider
                    .chat(messages, Some(options))
                    .await
                    .map_err(|e| provider_error(e.to_string()))
            }
        })
        .await?;

        info!(
            "premium: {} pages, {} input tokens, {} output tokens, {:?}",
            pages.len(),
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let texts = split_pages(&response.content, pages.len());
        Ok(texts
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let text = postprocess::clean_markup(&raw);
                let conf = heuristic_confidence(&text);
                debug!("premium page {}: {:.1}%", i + 1, conf);
                Recognition::new(text, conf, ENGINE)
            })
            .collect())
    }
}

// ── Response splitting ───────────────────────────────────────────────────

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<!--\s*page\s+(\d+)\s*-->\s*$").unwrap());

/// Split one markup stream into `pages` texts on `<!-- page N -->` lines.
///
/// Text before the first marker belongs to page 1. A marker outside
/// 1..=pages is dropped and its content stays with the current page. Pages
/// with no marker come back empty. Fences around the whole stream are
/// removed before splitting.
pub fn split_pages(markup: &str, pages: usize) -> Vec<String> {
    if pages == 0 {
        return Vec::new();
    }
    let markup = postprocess::strip_markdown_fences(markup);
    let mut out: Vec<Vec<&str>> = vec![Vec::new(); pages];
    let mut current = 0usize;
    for line in markup.lines() {
        if let Some(caps) = RE_PAGE_MARKER.captures(line) {
            if let Ok(n) = caps[1].parse::<usize>() {
                if (1..=pages).contains(&n) {
                    current = n - 1;
                }
            }
            continue;
        }
        out[current].push(line);
    }
    out.into_iter()
        .map(|lines| lines.join("\n").trim().to_string())
        .collect()
}

// ── Heuristic confidence ─────────────────────────────────────────────────

static RE_HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<[^>]+>").unwrap());
static RE_MD_SYNTAX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-:| ]+$|[#*_`|>]+").unwrap());

fn is_bad_char(c: char) -> bool {
    c == '\u{FFFD}' || (c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

/// Text-quality score in 0–100; see the module docs for the formula.
pub fn heuristic_confidence(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 || text.trim().is_empty() {
        return 0.0;
    }
    let bad = text.chars().filter(|&c| is_bad_char(c)).count();
    let clean_ratio = 1.0 - bad as f64 / total as f64;

    let without_tags = RE_HTML_TAG.replace_all(text, " ");
    let plain = RE_MD_SYNTAX.replace_all(&without_tags, " ");

    let visible: Vec<char> = plain.chars().filter(|c| !c.is_whitespace()).collect();
    let density = if visible.is_empty() {
        0.0
    } else {
        visible.iter().filter(|c| c.is_alphanumeric()).count() as f64 / visible.len() as f64
    };

    let tokens: Vec<&str> = plain.split_whitespace().collect();
    let word_like = if tokens.is_empty() {
        0.0
    } else {
        tokens
            .iter()
            .filter(|t| (2..=20).contains(&t.chars().count()))
            .count() as f64
            / tokens.len() as f64
    };

    let score = 100.0 * (0.4 * clean_ratio + 0.3 * density + 0.3 * word_like);
    (score.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_page_markers() {
        let markup = "<!-- page 1 -->\n# Title\nText one\n<!-- page 2 -->\nText two\n";
        assert_eq!(split_pages(markup, 2), vec!["# Title\nText one", "Text two"]);
    }

    #[test]
    fn document_wide_fences_do_not_leak_into_pages() {
        let markup = "```markdown\n<!-- page 1 -->\nHello one\n<!-- page 2 -->\nHello two\n```";
        let pages: Vec<String> = split_pages(markup, 2)
            .iter()
            .map(|p| postprocess::clean_markup(p))
            .collect();
        assert_eq!(pages, vec!["Hello one", "Hello two"]);
    }

    #[test]
    fn missing_pages_are_empty_not_omitted() {
        let markup = "<!-- page 1 -->\nA\n<!-- page 3 -->\nC";
        let pages = split_pages(markup, 3);
        assert_eq!(pages, vec!["A", "", "C"]);
    }

    #[test]
    fn unmarked_single_page_is_kept() {
        assert_eq!(split_pages("Just text", 1), vec!["Just text"]);
    }

    #[test]
    fn out_of_range_marker_stays_with_current_page() {
        let markup = "<!-- page 1 -->\nA\n<!-- page 9 -->\nB";
        assert_eq!(split_pages(markup, 1), vec!["A\nB"]);
    }

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(heuristic_confidence(""), 0.0);
        assert_eq!(heuristic_confidence("   \n"), 0.0);
    }

    #[test]
    fn confidence_tracks_text_quality() {
        let clean = heuristic_confidence("The quick brown fox jumps over the lazy dog near the river bank.");
        let noisy = heuristic_confidence("\u{FFFD}\u{FFFD}\u{FFFD} @ # % \u{0001} ~ ^ & * ! ?");
        let bangla = heuristic_confidence("আমার সোনার বাংলা আমি তোমায় ভালোবাসি");
        assert!(clean > 90.0, "clean {clean}");
        assert!(bangla > 90.0, "bangla {bangla}");
        assert!(noisy < 50.0, "noisy {noisy}");
        assert!(clean > noisy);
    }

    #[test]
    fn table_markup_does_not_count_as_noise() {
        let table = "| Name | Price |\n| --- | --- |\n| Rice | 60 |";
        assert!(heuristic_confidence(table) > 80.0);
    }

    #[test]
    fn limits_reject_oversized_documents() {
        assert!(check_limits(50, 10, 50, 100).is_ok());
        let err = check_limits(51, 10, 50, 100).unwrap_err();
        assert!(err.is_payload_too_large());
        assert!(check_limits(1, 101, 50, 100).unwrap_err().is_payload_too_large());
    }

    #[test]
    fn provider_errors_map_to_kinds() {
        assert!(provider_error("HTTP 413 Payload Too Large".into()).is_payload_too_large());
        assert!(provider_error("request too large for model".into()).is_payload_too_large());
        assert_eq!(
            provider_error("429 rate limit".into()).kind,
            EngineErrorKind::RateLimited
        );
        assert!(provider_error("503 upstream".into()).is_retryable());
    }
}
