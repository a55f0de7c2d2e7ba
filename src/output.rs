//! Result types produced by the pipeline.
//!
//! [`DocumentResult`] is the shape handed to the REST and persistence
//! layers; its JSON form is the public contract (`text`, `confidence`,
//! `pages`, `languages`, `mode`, `engine`, `features`, and `pages_data` for
//! multi-page documents).

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// One (engine, configuration) run on one page.
///
/// Attempts live only inside a page's cascade; the winner's text and
/// confidence become the [`PageResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineAttempt {
    /// Strategy label, e.g. `"primary"`, `"auto-segmentation"`, `"enhanced-sharpen"`.
    pub strategy: String,
    pub text: String,
    /// 0–100.
    pub confidence: f64,
    pub elapsed_ms: u64,
}

/// The final answer for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_number: usize,
    pub text: String,
    /// 0–100. Zero for failed pages.
    pub confidence: f64,
    /// Unicode scalar count of `text`.
    pub character_count: usize,
    /// Label of the strategy whose output won.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Set when every strategy failed and the page was degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn resolved(page_number: usize, text: String, confidence: f64, strategy: impl Into<String>) -> Self {
        let character_count = text.chars().count();
        Self {
            page_number,
            text,
            confidence: confidence.max(0.0),
            character_count,
            strategy: Some(strategy.into()),
            error: None,
        }
    }

    /// A degraded page: empty text, zero confidence, error recorded.
    pub fn failed(page_number: usize, error: PageError) -> Self {
        Self {
            page_number,
            text: String::new(),
            confidence: 0.0,
            character_count: 0,
            strategy: None,
            error: Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

fn at_most_one(pages: &[PageResult]) -> bool {
    pages.len() <= 1
}

/// Document-level result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    /// Page texts joined by a blank line.
    pub text: String,
    /// Mean of page confidences, 0–100, two decimals.
    pub confidence: f64,
    /// Page count of the source document.
    pub pages: usize,
    /// Detected script codes, e.g. `["bn", "en"]`.
    pub languages: Vec<String>,
    /// Human label; `mixed` when several scripts were detected.
    pub mode: String,
    /// Engine provenance label.
    pub engine: String,
    /// Strategy and feature labels applied across the document.
    pub features: Vec<String>,
    /// Per-page breakdown, one entry per page 1..=pages.
    ///
    /// Always populated in memory; omitted from JSON for single-page input.
    #[serde(default, skip_serializing_if = "at_most_one")]
    pub pages_data: Vec<PageResult>,
}

impl DocumentResult {
    /// Pages that settled without error.
    pub fn succeeded_pages(&self) -> usize {
        self.pages_data.iter().filter(|p| !p.is_failed()).count()
    }

    pub fn failed_pages(&self) -> impl Iterator<Item = &PageResult> {
        self.pages_data.iter().filter(|p| p.is_failed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pages: Vec<PageResult>) -> DocumentResult {
        DocumentResult {
            text: String::new(),
            confidence: 0.0,
            pages: pages.len(),
            languages: vec!["bn".into()],
            mode: "bangla".into(),
            engine: "local-stack".into(),
            features: vec![],
            pages_data: pages,
        }
    }

    #[test]
    fn character_count_counts_scalars() {
        let p = PageResult::resolved(1, "আমার".into(), 91.0, "primary");
        assert_eq!(p.character_count, 4);
        assert!(!p.is_failed());
    }

    #[test]
    fn failed_page_is_empty_and_zero() {
        let p = PageResult::failed(
            3,
            PageError::TaskLost {
                page: 3,
                detail: "panic".into(),
            },
        );
        assert_eq!(p.text, "");
        assert_eq!(p.confidence, 0.0);
        assert!(p.is_failed());
    }

    #[test]
    fn single_page_json_omits_pages_data() {
        let d = doc(vec![PageResult::resolved(1, "x".into(), 90.0, "primary")]);
        let json = serde_json::to_value(&d).unwrap();
        assert!(json.get("pages_data").is_none());
        assert_eq!(json["pages"], 1);
    }

    #[test]
    fn multi_page_json_has_page_fields() {
        let d = doc(vec![
            PageResult::resolved(1, "a".into(), 90.0, "primary"),
            PageResult::resolved(2, "bc".into(), 80.0, "raw"),
        ]);
        let json = serde_json::to_value(&d).unwrap();
        let pages = json["pages_data"].as_array().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1]["page_number"], 2);
        assert_eq!(pages[1]["character_count"], 2);
        assert!(pages[1].get("error").is_none());
        assert_eq!(d.succeeded_pages(), 2);
    }
}
