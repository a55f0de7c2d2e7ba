//! Ensemble merging: reduce several engines' answers for one page to one.
//!
//! Two rules live here:
//!
//! * [`merge`]: the general rule. Highest confidence wins; equal
//!   confidences are broken by content (non-empty, then longer, then
//!   lexicographic) so the outcome never depends on input order.
//! * [`prefer_secondary`]: the specialised primary-vs-secondary rule used
//!   when a neural recognizer backs up the classic engine on complex scripts.
//!
//! Both are pure functions of their inputs.

use crate::config::MergePolicy;
use crate::engine::Recognition;
use std::cmp::Ordering;

fn has_text(r: &Recognition) -> bool {
    !r.text.trim().is_empty()
}

/// Total order on candidates; `Greater` means "better".
fn rank(a: &Recognition, b: &Recognition) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then_with(|| has_text(a).cmp(&has_text(b)))
        .then_with(|| a.text.chars().count().cmp(&b.text.chars().count()))
        // Lexicographically smaller text ranks higher.
        .then_with(|| b.text.cmp(&a.text))
        .then_with(|| b.label.cmp(&a.label))
}

/// Pick the best candidate. `None` only for an empty slice.
pub fn merge(candidates: &[Recognition]) -> Option<Recognition> {
    candidates.iter().max_by(|a, b| rank(a, b)).cloned()
}

/// Whether `secondary` should replace `primary`.
///
/// True when the primary is empty and the secondary is not, when the
/// secondary is clearly stronger, or when the primary is weak and the
/// secondary is not clearly worse.
pub fn prefer_secondary(primary: &Recognition, secondary: &Recognition, policy: &MergePolicy) -> bool {
    if !has_text(secondary) {
        return false;
    }
    if !has_text(primary) {
        return true;
    }
    if secondary.confidence > primary.confidence + policy.clear_margin {
        return true;
    }
    primary.confidence < policy.weak_threshold
        && secondary.confidence >= primary.confidence - policy.not_worse_tolerance
}

/// Apply [`prefer_secondary`] and return the winner.
pub fn merge_with_secondary(primary: Recognition, secondary: Recognition, policy: &MergePolicy) -> Recognition {
    if prefer_secondary(&primary, &secondary, policy) {
        secondary
    } else {
        primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(text: &str, confidence: f64, label: &str) -> Recognition {
        Recognition::new(text, confidence, label)
    }

    #[test]
    fn highest_confidence_wins() {
        let out = merge(&[r("a", 70.0, "x"), r("b", 85.0, "y"), r("c", 80.0, "z")]).unwrap();
        assert_eq!(out.text, "b");
    }

    #[test]
    fn empty_input_yields_none() {
        assert!(merge(&[]).is_none());
    }

    #[test]
    fn equal_confidence_is_order_insensitive() {
        let a = r("alpha beta", 80.0, "book");
        let b = r("alpha", 80.0, "auto");
        assert_eq!(merge(&[a.clone(), b.clone()]), merge(&[b.clone(), a.clone()]));
        assert_eq!(merge(&[a.clone(), b]).unwrap().text, "alpha beta");

        let c = r("abc", 80.0, "book");
        let d = r("abd", 80.0, "book");
        assert_eq!(merge(&[c.clone(), d.clone()]), merge(&[d, c]));
    }

    #[test]
    fn merge_is_deterministic() {
        let input = [r("x", 50.0, "a"), r("y", 50.0, "b")];
        assert_eq!(merge(&input), merge(&input));
    }

    #[test]
    fn non_empty_beats_empty_at_equal_confidence() {
        let out = merge(&[r("", 60.0, "a"), r("text", 60.0, "b")]).unwrap();
        assert_eq!(out.text, "text");
    }

    #[test]
    fn secondary_wins_when_primary_empty() {
        let p = MergePolicy::default();
        assert!(prefer_secondary(&r("  ", 95.0, "p"), &r("আমি", 40.0, "s"), &p));
        assert!(!prefer_secondary(&r("", 95.0, "p"), &r("", 99.0, "s"), &p));
    }

    #[test]
    fn secondary_wins_by_clear_margin() {
        let p = MergePolicy::default();
        assert!(prefer_secondary(&r("a", 80.0, "p"), &r("b", 85.5, "s"), &p));
        assert!(!prefer_secondary(&r("a", 80.0, "p"), &r("b", 84.0, "s"), &p));
    }

    #[test]
    fn weak_primary_yields_to_comparable_secondary() {
        let p = MergePolicy::default();
        assert!(prefer_secondary(&r("a", 55.0, "p"), &r("b", 50.0, "s"), &p));
        assert!(!prefer_secondary(&r("a", 55.0, "p"), &r("b", 40.0, "s"), &p));
    }

    #[test]
    fn merge_with_secondary_returns_winner() {
        let p = MergePolicy::default();
        let out = merge_with_secondary(r("", 0.0, "tesseract"), r("Hello", 70.0, "neural"), &p);
        assert_eq!(out.label, "neural");
    }
}
