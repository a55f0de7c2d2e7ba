//! Hallucination filter: strip spurious foreign-script tokens.
//!
//! Classic recognizers reading a Bangla page with a mixed model happily emit
//! Latin "words" for smudges, stamps and broken conjuncts. When the caller
//! did not ask for Latin, such tokens are almost always noise.
//!
//! ## Token policy
//!
//! Each whitespace-delimited token is classified by its letters:
//!
//! | Token | Action |
//! |-------|--------|
//! | no letters (digits, punctuation) | keep |
//! | target-script letters only | keep |
//! | foreign letters only | drop, unless its letters are an allow-listed unit or abbreviation |
//! | both | keep if the foreign share ≤ `mixed_token_ratio`, else strip the foreign letters |
//!
//! When a second recognizer pass has *confirmed* that the page genuinely
//! contains foreign text, pure-foreign tokens of reasonable length survive and
//! the mixed-token share is relaxed to `confirmed_token_ratio`.
//!
//! The filter is idempotent: every surviving token re-classifies to "keep".

use crate::config::FilterPolicy;
use crate::script::{classify, CharClass, ScriptProfile};
use tracing::debug;

/// Units and abbreviations that legitimately appear in Latin inside Bangla text.
const ALLOWED_FOREIGN: &[&str] = &[
    "kg", "g", "gm", "mg", "km", "m", "cm", "mm", "ml", "l", "ltr", "sq", "ft", "tk", "rs", "no",
    "dr", "mr", "mrs", "ms", "am", "pm", "vs", "etc", "id", "pdf", "www", "com",
];

/// Letter composition of one token.
#[derive(Debug, Default, Clone, Copy)]
struct Composition {
    target: usize,
    foreign: usize,
    total: usize,
}

/// Script-aware token filter for one page.
#[derive(Debug, Clone, Copy)]
pub struct HallucinationFilter {
    profile: ScriptProfile,
    policy: FilterPolicy,
    foreign_confirmed: bool,
}

impl HallucinationFilter {
    pub fn new(profile: ScriptProfile, policy: FilterPolicy) -> Self {
        Self {
            profile,
            policy,
            foreign_confirmed: false,
        }
    }

    /// Mark foreign text as confirmed by a secondary pass.
    pub fn confirmed(mut self, yes: bool) -> Self {
        self.foreign_confirmed = yes;
        self
    }

    /// Whether the filter can change anything for this profile.
    pub fn is_active(&self) -> bool {
        !self.profile.includes_latin()
    }

    /// Whether `text` contains any letter outside the requested scripts.
    pub fn has_foreign(&self, text: &str) -> bool {
        text.chars().any(|c| self.is_foreign(c))
    }

    /// Whether a confirmation pass at `confidence` is strong enough.
    pub fn confirms(&self, confidence: f64) -> bool {
        confidence >= self.policy.confirm_threshold
    }

    fn is_foreign(&self, c: char) -> bool {
        matches!(classify(c), CharClass::Letter(s) if !self.profile.includes(s))
    }

    fn compose(&self, token: &str) -> Composition {
        let mut comp = Composition::default();
        for c in token.chars() {
            comp.total += 1;
            if let CharClass::Letter(s) = classify(c) {
                if self.profile.includes(s) {
                    comp.target += 1;
                } else {
                    comp.foreign += 1;
                }
            }
        }
        comp
    }

    /// Filter a whole text, line by line.
    ///
    /// Lines emptied by filtering are removed; lines that were already blank
    /// are kept so paragraph structure survives.
    pub fn filter(&self, text: &str) -> String {
        if !self.is_active() {
            return text.to_string();
        }
        let mut out: Vec<String> = Vec::new();
        let mut dropped = 0usize;
        for line in text.split('\n') {
            if line.trim().is_empty() {
                out.push(String::new());
                continue;
            }
            let kept: Vec<String> = line
                .split_whitespace()
                .filter_map(|tok| {
                    let res = self.filter_token(tok);
                    if res.is_none() {
                        dropped += 1;
                    }
                    res
                })
                .collect();
            if !kept.is_empty() {
                out.push(kept.join(" "));
            }
        }
        if dropped > 0 {
            debug!("Hallucination filter dropped {} tokens", dropped);
        }
        out.join("\n")
    }

    /// Filter one token. `None` means drop it.
    pub fn filter_token(&self, token: &str) -> Option<String> {
        let comp = self.compose(token);
        if comp.foreign == 0 {
            return Some(token.to_string());
        }

        if comp.target == 0 {
            return self.keep_pure_foreign(token, comp).then(|| token.to_string());
        }

        let limit = if self.foreign_confirmed {
            self.policy.confirmed_token_ratio
        } else {
            self.policy.mixed_token_ratio
        };
        if comp.foreign as f64 / comp.total as f64 <= limit {
            return Some(token.to_string());
        }

        let stripped: String = token.chars().filter(|c| !self.is_foreign(*c)).collect();
        (!stripped.is_empty()).then_some(stripped)
    }

    fn keep_pure_foreign(&self, token: &str, comp: Composition) -> bool {
        let letters: String = token
            .chars()
            .filter(|c| self.is_foreign(*c))
            .flat_map(char::to_lowercase)
            .collect();
        if ALLOWED_FOREIGN.contains(&letters.as_str()) {
            return true;
        }
        self.foreign_confirmed && comp.foreign >= self.policy.confirmed_min_letters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bangla() -> HallucinationFilter {
        HallucinationFilter::new(ScriptProfile::Bangla, FilterPolicy::default())
    }

    #[test]
    fn drops_pure_latin_tokens_from_bangla() {
        assert_eq!(bangla().filter("আমার নাম Hello World দেশ"), "আমার নাম দেশ");
    }

    #[test]
    fn latin_profiles_are_untouched() {
        let f = HallucinationFilter::new(ScriptProfile::Mixed, FilterPolicy::default());
        let text = "আমার নাম Hello   World";
        assert_eq!(f.filter(text), text);
        assert!(!f.is_active());
    }

    #[test]
    fn keeps_numbers_and_units() {
        assert_eq!(bangla().filter("দাম 250 Tk ওজন 5kg (2024)"), "দাম 250 Tk ওজন 5kg (2024)");
    }

    #[test]
    fn mixed_token_under_ratio_is_kept() {
        // 1 foreign letter out of 5 chars = 20%
        assert_eq!(bangla().filter_token("আমারx").as_deref(), Some("আমারx"));
    }

    #[test]
    fn mixed_token_over_ratio_is_stripped() {
        assert_eq!(bangla().filter_token("আমxyz").as_deref(), Some("আম"));
    }

    #[test]
    fn confirmed_foreign_text_survives() {
        let f = bangla().confirmed(true);
        assert_eq!(f.filter("আমার নাম Hello World"), "আমার নাম Hello World");
        // short junk still goes
        assert_eq!(f.filter("দেশ Qx"), "দেশ");
    }

    #[test]
    fn emptied_lines_are_removed_blank_lines_kept() {
        let text = "প্রথম\n\nHello World\nশেষ";
        assert_eq!(bangla().filter(text), "প্রথম\n\nশেষ");
    }

    #[test]
    fn filter_is_idempotent() {
        let samples = [
            "আমার নাম Hello World দেশ",
            "আমxyz  দাম 250 Tk\n\nabc def\n  ঢাকাB ",
            "",
            "\n\n",
            "Dr. রহিম, MBBS",
        ];
        for confirmed in [false, true] {
            let f = bangla().confirmed(confirmed);
            for s in samples {
                let once = f.filter(s);
                assert_eq!(f.filter(&once), once, "input {s:?}");
            }
        }
    }

    #[test]
    fn confirmation_threshold() {
        let f = bangla();
        assert!(f.confirms(75.0));
        assert!(!f.confirms(74.9));
        assert!(f.has_foreign("দেশ A"));
        assert!(!f.has_foreign("দেশ ১২"));
    }
}
