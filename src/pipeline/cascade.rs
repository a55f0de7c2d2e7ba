//! Confidence cascade: per-page escalation through increasingly expensive
//! strategies.
//!
//! ```text
//!  primary (preprocessed image, local stack)
//!     │ ≥ good ──────────────────────────────▶ Resolved
//!     ▼ < good
//!  raw (untouched image, local stack)          keeps the better of the two
//!     │ ≥ good ──────────────────────────────▶ Resolved
//!     ▼ best < floor
//!  remote fallback                             non-empty text overrides
//!     │                                        everything at fallback_confidence
//!     ▼
//!  Resolved(best so far) or Failed(every strategy errored)
//! ```
//!
//! Each strategy reports a [`StepOutcome`]; the loop in [`Cascade::run`]
//! decides from data alone whether to go on. Engine errors (including
//! timeouts) are recorded and the next strategy runs. Only when no strategy
//! produced any output at all is the page [`CascadeOutcome::Failed`].
//!
//! The chosen confidence never drops below the primary strategy's: later
//! strategies only replace the current best when they beat it, and the
//! remote override is validated to be at least the floor it runs under.

use crate::config::CascadeThresholds;
use crate::engine::{with_timeout, Recognizer};
use crate::error::{EngineError, EngineErrorKind, PageError};
use crate::output::{EngineAttempt, PageResult};
use crate::pipeline::enhance;
use crate::pipeline::render::PageImage;
use crate::script::ScriptProfile;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The strategies, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Primary,
    Raw,
    RemoteFallback,
}

impl Strategy {
    pub const ORDER: [Strategy; 3] = [Strategy::Primary, Strategy::Raw, Strategy::RemoteFallback];

    pub fn label(self) -> &'static str {
        match self {
            Strategy::Primary => "primary",
            Strategy::Raw => "raw",
            Strategy::RemoteFallback => "remote-fallback",
        }
    }
}

/// What one strategy produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Settled; no further strategy runs.
    Resolved { text: String, confidence: f64 },
    /// A candidate; `proceed` says whether escalation may continue.
    Attempted {
        text: String,
        confidence: f64,
        proceed: bool,
    },
}

/// Terminal state of a page's cascade.
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeOutcome {
    Resolved {
        text: String,
        confidence: f64,
        strategy: Strategy,
    },
    /// Every strategy that ran returned an engine error.
    Failed { detail: String, attempts: usize },
}

/// Outcome plus the bookkeeping collected on the way.
#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub page_number: usize,
    pub outcome: CascadeOutcome,
    pub attempts: Vec<EngineAttempt>,
}

impl CascadeReport {
    /// Labels of the strategies that ran, in order.
    pub fn strategies_run(&self) -> impl Iterator<Item = &str> {
        self.attempts.iter().map(|a| a.strategy.as_str())
    }

    pub fn into_page_result(self) -> PageResult {
        match self.outcome {
            CascadeOutcome::Resolved {
                text,
                confidence,
                strategy,
            } => PageResult::resolved(self.page_number, text, confidence, strategy.label()),
            CascadeOutcome::Failed { detail, attempts } => PageResult::failed(
                self.page_number,
                PageError::AllStrategiesFailed {
                    page: self.page_number,
                    attempts,
                    detail,
                },
            ),
        }
    }
}

struct Best {
    text: String,
    confidence: f64,
    strategy: Strategy,
}

impl Best {
    fn beaten_by(&self, text: &str, confidence: f64) -> bool {
        confidence > self.confidence
            || (confidence == self.confidence && self.text.trim().is_empty() && !text.trim().is_empty())
    }
}

/// Per-page cascade controller.
pub struct Cascade {
    local: Arc<dyn Recognizer>,
    fallback: Option<Arc<dyn Recognizer>>,
    thresholds: CascadeThresholds,
    call_timeout: Duration,
}

impl Cascade {
    pub fn new(local: Arc<dyn Recognizer>, thresholds: CascadeThresholds, call_timeout: Duration) -> Self {
        Self {
            local,
            fallback: None,
            thresholds,
            call_timeout,
        }
    }

    /// Enable the remote fallback strategy.
    pub fn with_fallback(mut self, fallback: Arc<dyn Recognizer>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn should_run(&self, strategy: Strategy, best: Option<f64>) -> bool {
        match strategy {
            Strategy::Primary => true,
            Strategy::Raw => best.map_or(true, |c| c < self.thresholds.good),
            Strategy::RemoteFallback => {
                self.fallback.is_some() && best.map_or(true, |c| c < self.thresholds.floor)
            }
        }
    }

    async fn call(
        &self,
        engine: &Arc<dyn Recognizer>,
        page: &PageImage,
        profile: ScriptProfile,
    ) -> Result<crate::engine::Recognition, EngineError> {
        let limit = self.call_timeout * engine.call_budget();
        with_timeout(engine.name(), limit, engine.recognize(page, profile)).await
    }

    async fn local_step(&self, page: &PageImage, profile: ScriptProfile) -> Result<StepOutcome, EngineError> {
        let rec = self.call(&self.local, page, profile).await?;
        Ok(if rec.confidence >= self.thresholds.good {
            StepOutcome::Resolved {
                text: rec.text,
                confidence: rec.confidence,
            }
        } else {
            StepOutcome::Attempted {
                text: rec.text,
                confidence: rec.confidence,
                proceed: true,
            }
        })
    }

    async fn step(&self, strategy: Strategy, page: &PageImage, profile: ScriptProfile) -> Result<StepOutcome, EngineError> {
        match strategy {
            Strategy::Primary => {
                let src = Arc::clone(&page.image);
                let prepared = tokio::task::spawn_blocking(move || enhance::preprocess(&src, profile))
                    .await
                    .map_err(|e| EngineError::new("preprocess", EngineErrorKind::Process, e.to_string()))?;
                let prepared = PageImage::new(page.page_number, prepared, page.dpi);
                self.local_step(&prepared, profile).await
            }
            Strategy::Raw => self.local_step(page, profile).await,
            Strategy::RemoteFallback => {
                let engine = match self.fallback {
                    Some(ref f) => f,
                    None => return Err(EngineError::unavailable("remote-fallback", "not configured")),
                };
                let rec = self.call(engine, page, profile).await?;
                Ok(if rec.is_empty() {
                    StepOutcome::Attempted {
                        text: String::new(),
                        confidence: 0.0,
                        proceed: false,
                    }
                } else {
                    StepOutcome::Resolved {
                        text: rec.text,
                        confidence: self.thresholds.fallback_confidence,
                    }
                })
            }
        }
    }

    /// Run the cascade for one page.
    pub async fn run(&self, page: &PageImage, profile: ScriptProfile) -> CascadeReport {
        let mut best: Option<Best> = None;
        let mut attempts: Vec<EngineAttempt> = Vec::new();
        let mut errors: Vec<EngineError> = Vec::new();

        for strategy in Strategy::ORDER {
            if !self.should_run(strategy, best.as_ref().map(|b| b.confidence)) {
                continue;
            }
            if strategy == Strategy::RemoteFallback {
                warn!(
                    "page {}: confidence {:.1}% below floor, trying remote fallback",
                    page.page_number,
                    best.as_ref().map_or(0.0, |b| b.confidence)
                );
            }

            let start = Instant::now();
            let res = self.step(strategy, page, profile).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let (text, confidence, settled) = match res {
                Ok(StepOutcome::Resolved { text, confidence }) => (text, confidence, true),
                Ok(StepOutcome::Attempted {
                    text,
                    confidence,
                    proceed,
                }) => (text, confidence, !proceed),
                Err(e) => {
                    debug!("page {}: {} failed: {}", page.page_number, strategy.label(), e);
                    errors.push(e);
                    continue;
                }
            };
            debug!(
                "page {}: {} → {:.1}% in {}ms",
                page.page_number,
                strategy.label(),
                confidence,
                elapsed_ms
            );
            attempts.push(EngineAttempt {
                strategy: strategy.label().to_string(),
                text: text.clone(),
                confidence,
                elapsed_ms,
            });

            let resolved = matches!(strategy, Strategy::RemoteFallback) && settled && !text.is_empty();
            if resolved || best.as_ref().map_or(true, |b| b.beaten_by(&text, confidence)) {
                best = Some(Best {
                    text,
                    confidence,
                    strategy,
                });
            }
            if settled {
                break;
            }
        }

        let outcome = match best {
            Some(b) => CascadeOutcome::Resolved {
                text: b.text,
                confidence: b.confidence,
                strategy: b.strategy,
            },
            None => {
                let detail = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                warn!("page {}: all strategies failed: {}", page.page_number, detail);
                CascadeOutcome::Failed {
                    detail,
                    attempts: errors.len(),
                }
            }
        };

        CascadeReport {
            page_number: page.page_number,
            outcome,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Recognition;
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Answer {
        Text(&'static str, f64),
        Fail,
        Hang,
    }

    /// Answers calls in order; an exhausted script fails.
    struct Scripted {
        name: &'static str,
        answers: Mutex<VecDeque<Answer>>,
    }

    impl Scripted {
        fn new(name: &'static str, answers: Vec<Answer>) -> Arc<Self> {
            Arc::new(Self {
                name,
                answers: Mutex::new(answers.into()),
            })
        }

        fn remaining(&self) -> usize {
            self.answers.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Recognizer for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn recognize(&self, _page: &PageImage, _profile: ScriptProfile) -> Result<Recognition, EngineError> {
            let next = self.answers.lock().unwrap().pop_front();
            match next {
                Some(Answer::Text(t, c)) => Ok(Recognition::new(t, c, self.name)),
                Some(Answer::Hang) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Recognition::new("late", 99.0, self.name))
                }
                Some(Answer::Fail) | None => Err(EngineError::new(self.name, EngineErrorKind::Process, "boom")),
            }
        }
    }

    fn page() -> PageImage {
        PageImage::new(1, DynamicImage::new_luma8(16, 16), 300)
    }

    fn cascade(local: Arc<Scripted>, remote: Option<Arc<Scripted>>) -> Cascade {
        let c = Cascade::new(local, CascadeThresholds::default(), Duration::from_millis(200));
        match remote {
            Some(r) => c.with_fallback(r),
            None => c,
        }
    }

    fn resolved(report: &CascadeReport) -> (&str, f64, Strategy) {
        match &report.outcome {
            CascadeOutcome::Resolved {
                text,
                confidence,
                strategy,
            } => (text.as_str(), *confidence, *strategy),
            other => panic!("expected resolved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn good_primary_stops_the_cascade() {
        let local = Scripted::new("local", vec![Answer::Text("ok", 95.0), Answer::Text("raw", 99.0)]);
        let remote = Scripted::new("vision", vec![Answer::Text("remote", 99.0)]);
        let report = cascade(Arc::clone(&local), Some(Arc::clone(&remote)))
            .run(&page(), ScriptProfile::English)
            .await;
        assert_eq!(resolved(&report), ("ok", 95.0, Strategy::Primary));
        assert_eq!(local.remaining(), 1);
        assert_eq!(remote.remaining(), 1);
        assert_eq!(report.strategies_run().collect::<Vec<_>>(), vec!["primary"]);
    }

    #[tokio::test]
    async fn raw_pass_replaces_only_when_better() {
        let local = Scripted::new("local", vec![Answer::Text("pre", 80.0), Answer::Text("raw", 85.0)]);
        let report = cascade(local, None).run(&page(), ScriptProfile::English).await;
        assert_eq!(resolved(&report), ("raw", 85.0, Strategy::Raw));

        let local = Scripted::new("local", vec![Answer::Text("pre", 80.0), Answer::Text("raw", 60.0)]);
        let report = cascade(local, None).run(&page(), ScriptProfile::English).await;
        assert_eq!(resolved(&report), ("pre", 80.0, Strategy::Primary));
    }

    #[tokio::test]
    async fn remote_fallback_overrides_with_fixed_confidence() {
        let local = Scripted::new("local", vec![Answer::Text("", 0.0), Answer::Text("", 0.0)]);
        let remote = Scripted::new("vision", vec![Answer::Text("Hello", 42.0)]);
        let report = cascade(local, Some(remote)).run(&page(), ScriptProfile::English).await;
        assert_eq!(resolved(&report), ("Hello", 100.0, Strategy::RemoteFallback));
    }

    #[tokio::test]
    async fn fallback_skipped_above_floor() {
        let local = Scripted::new("local", vec![Answer::Text("a", 80.0), Answer::Text("b", 78.0)]);
        let remote = Scripted::new("vision", vec![Answer::Text("remote", 99.0)]);
        let report = cascade(local, Some(Arc::clone(&remote)))
            .run(&page(), ScriptProfile::English)
            .await;
        assert_eq!(resolved(&report), ("a", 80.0, Strategy::Primary));
        assert_eq!(remote.remaining(), 1);
    }

    #[tokio::test]
    async fn empty_fallback_keeps_local_result() {
        let local = Scripted::new("local", vec![Answer::Text("weak", 40.0), Answer::Fail]);
        let remote = Scripted::new("vision", vec![Answer::Text("  ", 99.0)]);
        let report = cascade(local, Some(remote)).run(&page(), ScriptProfile::English).await;
        assert_eq!(resolved(&report), ("weak", 40.0, Strategy::Primary));
    }

    #[tokio::test]
    async fn every_strategy_failing_degrades_the_page() {
        let local = Scripted::new("local", vec![Answer::Fail, Answer::Fail]);
        let remote = Scripted::new("vision", vec![Answer::Fail]);
        let report = cascade(local, Some(remote)).run(&page(), ScriptProfile::English).await;
        match &report.outcome {
            CascadeOutcome::Failed { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("expected failure, got {other:?}"),
        }
        let page = report.into_page_result();
        assert!(page.is_failed());
        assert_eq!(page.text, "");
        assert_eq!(page.confidence, 0.0);
    }

    #[tokio::test]
    async fn timeout_moves_on_to_the_next_strategy() {
        let local = Scripted::new("local", vec![Answer::Hang, Answer::Text("raw", 91.0)]);
        let report = cascade(local, None).run(&page(), ScriptProfile::English).await;
        assert_eq!(resolved(&report), ("raw", 91.0, Strategy::Raw));
    }

    #[tokio::test]
    async fn chosen_confidence_never_below_primary() {
        let levels = [0.0, 30.0, 74.0, 75.0, 89.0, 90.0, 100.0];
        for &p in &levels {
            for &r in &levels {
                for &f in &[0.0, 50.0, 99.0] {
                    let local = Scripted::new("local", vec![Answer::Text("p", p), Answer::Text("r", r)]);
                    let remote = Scripted::new("vision", vec![Answer::Text("f", f)]);
                    let report = cascade(local, Some(remote)).run(&page(), ScriptProfile::Bangla).await;
                    let (_, chosen, _) = resolved(&report);
                    assert!(chosen >= p, "primary {p}, raw {r}, remote {f} → {chosen}");
                }
            }
        }
    }
}
