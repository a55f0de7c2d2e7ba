//! Result aggregation: per-page results → one document.
//!
//! Page tasks finish in any order; this is the single place page order is
//! restored. Missing pages are filled with degraded entries so the result
//! always covers 1..=total_pages.

use crate::error::PageError;
use crate::output::PageResult;

/// Pages plus the numbers derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated {
    /// Sorted by page number, one entry per page 1..=total.
    pub pages: Vec<PageResult>,
    /// Mean page confidence, two decimals; 0 for no pages.
    pub confidence: f64,
    /// Page texts joined by a blank line.
    pub text: String,
}

/// Separator between page texts in the concatenated document text.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Reorder, gap-fill and summarise page results.
///
/// Duplicate page numbers keep the higher-confidence entry. Entries outside
/// 1..=total_pages are ignored.
pub fn aggregate(mut results: Vec<PageResult>, total_pages: usize) -> Aggregated {
    results.retain(|p| p.page_number >= 1 && p.page_number <= total_pages);
    results.sort_by(|a, b| {
        a.page_number
            .cmp(&b.page_number)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
    results.dedup_by_key(|p| p.page_number);

    let mut pages = Vec::with_capacity(total_pages);
    let mut it = results.into_iter().peekable();
    for page_number in 1..=total_pages {
        match it.peek() {
            Some(p) if p.page_number == page_number => {
                if let Some(p) = it.next() {
                    pages.push(p);
                }
            }
            _ => pages.push(PageResult::failed(
                page_number,
                PageError::TaskLost {
                    page: page_number,
                    detail: "no result reported".into(),
                },
            )),
        }
    }

    let confidence = mean_confidence(&pages);
    let text = pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR);

    Aggregated {
        pages,
        confidence,
        text,
    }
}

/// Arithmetic mean rounded to two decimals.
pub fn mean_confidence(pages: &[PageResult]) -> f64 {
    if pages.is_empty() {
        return 0.0;
    }
    let sum: f64 = pages.iter().map(|p| p.confidence).sum();
    (sum / pages.len() as f64 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, conf: f64) -> PageResult {
        PageResult::resolved(n, format!("p{n}"), conf, "primary")
    }

    #[test]
    fn restores_page_order_for_any_completion_order() {
        let orders: [Vec<usize>; 4] = [
            vec![1, 2, 3, 4, 5],
            vec![5, 4, 3, 2, 1],
            vec![3, 1, 5, 2, 4],
            vec![2, 5, 1, 4, 3],
        ];
        for order in orders {
            let results = order.iter().map(|&n| page(n, 90.0)).collect();
            let agg = aggregate(results, 5);
            let nums: Vec<usize> = agg.pages.iter().map(|p| p.page_number).collect();
            assert_eq!(nums, vec![1, 2, 3, 4, 5]);
            assert_eq!(agg.text, "p1\n\np2\n\np3\n\np4\n\np5");
        }
    }

    #[test]
    fn gaps_become_failed_pages() {
        let agg = aggregate(vec![page(3, 90.0), page(1, 80.0)], 3);
        assert_eq!(agg.pages.len(), 3);
        assert!(agg.pages[1].is_failed());
        assert_eq!(agg.pages[1].confidence, 0.0);
        assert_eq!(agg.confidence, 56.67);
    }

    #[test]
    fn no_pages_means_zero_confidence() {
        let agg = aggregate(Vec::new(), 0);
        assert!(agg.pages.is_empty());
        assert_eq!(agg.confidence, 0.0);
        assert_eq!(agg.text, "");
    }

    #[test]
    fn duplicates_keep_best() {
        let agg = aggregate(vec![page(1, 40.0), page(1, 95.0)], 1);
        assert_eq!(agg.pages.len(), 1);
        assert_eq!(agg.pages[0].confidence, 95.0);
    }

    #[test]
    fn out_of_range_pages_are_ignored() {
        let agg = aggregate(vec![page(0, 99.0), page(2, 99.0), page(1, 90.0)], 1);
        assert_eq!(agg.pages.len(), 1);
        assert_eq!(agg.confidence, 90.0);
    }
}
