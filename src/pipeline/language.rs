//! Language auto-detection over the final text.
//!
//! Counts letters per script and reports every script whose share exceeds
//! the configured threshold. This is authoritative for `languages` and
//! `mode` in the document result, whatever the caller's hint said.

use crate::config::LanguagePolicy;
use crate::script::{script_of, Script};
use std::collections::BTreeMap;

/// Outcome of detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedLanguages {
    /// Qualifying scripts, most frequent first.
    pub scripts: Vec<Script>,
    /// `mixed` for several scripts, else the single script's label.
    pub mode: String,
}

impl DetectedLanguages {
    fn single(script: Script) -> Self {
        Self {
            scripts: vec![script],
            mode: script.label().to_string(),
        }
    }

    /// Script codes, e.g. `["bn", "en"]`.
    pub fn codes(&self) -> Vec<String> {
        self.scripts.iter().map(|s| s.code().to_string()).collect()
    }
}

/// Detect the scripts present in `text`.
pub fn detect_languages(text: &str, policy: &LanguagePolicy) -> DetectedLanguages {
    let mut counts: BTreeMap<Script, usize> = BTreeMap::new();
    for c in text.chars() {
        if let Some(s) = script_of(c) {
            *counts.entry(s).or_default() += 1;
        }
    }
    let total: usize = counts.values().sum();
    if total < policy.min_chars.max(1) {
        return DetectedLanguages::single(policy.default_script);
    }

    let mut qualifying: Vec<(Script, usize)> = counts
        .into_iter()
        .filter(|&(_, n)| n as f64 / total as f64 > policy.share_threshold)
        .collect();
    // Stable: ties keep Script order.
    qualifying.sort_by(|a, b| b.1.cmp(&a.1));

    match qualifying.len() {
        0 => DetectedLanguages::single(policy.default_script),
        1 => DetectedLanguages::single(qualifying[0].0),
        _ => DetectedLanguages {
            scripts: qualifying.into_iter().map(|(s, _)| s).collect(),
            mode: "mixed".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LanguagePolicy {
        LanguagePolicy::default()
    }

    #[test]
    fn pure_bangla() {
        let d = detect_languages("আমার সোনার বাংলা আমি তোমায় ভালোবাসি", &policy());
        assert_eq!(d.codes(), vec!["bn"]);
        assert_eq!(d.mode, "bangla");
    }

    #[test]
    fn mixed_text() {
        let text = "আমার সোনার বাংলা আমি তোমায় ভালোবাসি. My golden Bengal, I love you";
        let d = detect_languages(text, &policy());
        assert_eq!(d.mode, "mixed");
        assert_eq!(d.scripts.len(), 2);
        assert!(d.codes().contains(&"en".to_string()));
    }

    #[test]
    fn minor_script_below_threshold_is_ignored() {
        let text = "The quick brown fox jumps over the lazy dog again and again আমি";
        let d = detect_languages(text, &policy());
        assert_eq!(d.codes(), vec!["en"]);
    }

    #[test]
    fn short_text_falls_back_to_default() {
        let d = detect_languages("আমি", &policy());
        assert_eq!(d.codes(), vec!["en"]);
        let p = LanguagePolicy {
            default_script: Script::Bengali,
            ..policy()
        };
        assert_eq!(detect_languages("", &p).codes(), vec!["bn"]);
    }
}
