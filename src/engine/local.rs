//! The local multi-pass stack.
//!
//! One [`Recognizer`] built from a [`PassRunner`] (normally Tesseract) and an
//! optional neural backup. A page is read under several segmentation
//! configurations and enhancement variants; which ones run is decided by the
//! confidence of the first pass, so an easy page costs one call and a hard
//! one up to a dozen.
//!
//! ## Pass plan
//!
//! | Profile | Pass | Runs when first pass below |
//! |---------|------|----------------------------|
//! | Bangla  | book (PSM 6) | always first |
//! |         | auto-segmentation (PSM 3) | 90 |
//! |         | column (PSM 4), max-accuracy | 85 |
//! |         | enhanced blur / sharpen | 80 |
//! |         | block | 75 |
//! | English | book | always first |
//! |         | auto-segmentation | 90 |
//! |         | high-accuracy, column | 85 |
//! |         | enhanced blur / sharpen | 80 |
//! |         | sparse (PSM 11) | 70 |
//! | Mixed   | the Bangla plan, then `ben+eng` book, then `ben+eng` auto if that scored below 85 | |
//!
//! If the best pass is still below 50 a script-model pass runs. Complex
//! scripts then consult the neural recognizer through
//! [`merge_with_secondary`]. Last, the hallucination filter runs, backed by
//! a Latin confirmation pass when the text contains foreign letters, and the
//! text is cleaned.

use super::tesseract::{PassRunner, PassSpec};
use super::{with_timeout, Recognition, Recognizer};
use crate::config::{FilterPolicy, MergePolicy};
use crate::error::{EngineError, EngineErrorKind};
use crate::pipeline::enhance::Variant;
use crate::pipeline::filter::HallucinationFilter;
use crate::pipeline::merge::{merge, merge_with_secondary};
use crate::pipeline::postprocess;
use crate::pipeline::render::PageImage;
use crate::script::{Script, ScriptProfile};
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const ENGINE: &str = "local";

const ALWAYS: f64 = f64::INFINITY;
const SCRIPT_FALLBACK_BELOW: f64 = 50.0;
const MIXED_AUTO_BELOW: f64 = 85.0;

/// Upper bound on engine calls for one page: first pass, six follow-ups,
/// two combined passes, script fallback, neural, confirmation.
const MAX_CALLS: u32 = 12;

enum Step {
    Pass(PassSpec),
    Variant(Variant, PassSpec),
}

/// A follow-up pass and the first-pass confidence below which it runs.
struct Gated {
    below: f64,
    step: Step,
}

fn gated(below: f64, pass: PassSpec) -> Gated {
    Gated {
        below,
        step: Step::Pass(pass),
    }
}

fn variants(below: f64, langs: &str) -> impl Iterator<Item = Gated> + '_ {
    Variant::ALL.into_iter().map(move |v| Gated {
        below,
        step: Step::Variant(v, PassSpec::book(langs)),
    })
}

fn primary_lang(profile: ScriptProfile) -> &'static str {
    match profile {
        ScriptProfile::English => Script::Latin.tesseract_lang(),
        ScriptProfile::Bangla | ScriptProfile::Mixed => Script::Bengali.tesseract_lang(),
    }
}

/// Follow-up passes after the first `book` pass.
fn plan(profile: ScriptProfile) -> Vec<Gated> {
    let lang = primary_lang(profile);
    let mut steps = Vec::new();
    match profile {
        ScriptProfile::English => {
            steps.push(gated(90.0, PassSpec::auto(lang)));
            steps.push(gated(85.0, PassSpec::high_accuracy(lang)));
            steps.push(gated(85.0, PassSpec::column(lang)));
            steps.extend(variants(80.0, lang));
            steps.push(gated(70.0, PassSpec::sparse(lang)));
        }
        ScriptProfile::Bangla | ScriptProfile::Mixed => {
            steps.push(gated(90.0, PassSpec::auto(lang)));
            steps.push(gated(85.0, PassSpec::column(lang)));
            steps.push(gated(85.0, PassSpec::max_accuracy(lang)));
            steps.extend(variants(80.0, lang));
            steps.push(gated(75.0, PassSpec::block(lang)));
        }
    }
    if profile == ScriptProfile::Mixed {
        steps.push(gated(
            ALWAYS,
            PassSpec::book(&profile.tesseract_langs()).labelled("mixed-book"),
        ));
    }
    steps
}

/// Successful recognitions and failures for one page.
#[derive(Default)]
struct Attempts {
    ok: Vec<Recognition>,
    errors: Vec<EngineError>,
}

impl Attempts {
    /// Record a pass; the confidence it reached, if it succeeded.
    fn record(&mut self, res: Result<Recognition, EngineError>) -> Option<f64> {
        match res {
            Ok(r) => {
                let conf = r.confidence;
                self.ok.push(r);
                Some(conf)
            }
            Err(e) => {
                debug!("local pass failed: {}", e);
                self.errors.push(e);
                None
            }
        }
    }

    fn best(&self) -> Option<Recognition> {
        merge(&self.ok)
    }

    /// One error standing for every failed pass.
    fn into_error(self) -> EngineError {
        let detail = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        match self.errors.first() {
            Some(first) => EngineError::new(ENGINE, first.kind, detail).with_retryable(first.is_retryable()),
            None => EngineError::new(ENGINE, EngineErrorKind::Process, "no pass produced output"),
        }
    }
}

/// Multi-pass local recognizer.
pub struct LocalStack {
    runner: Arc<dyn PassRunner>,
    neural: Option<Arc<dyn Recognizer>>,
    merge: MergePolicy,
    filter: FilterPolicy,
    pass_timeout: Duration,
}

impl LocalStack {
    pub fn new(runner: Arc<dyn PassRunner>, merge: MergePolicy, filter: FilterPolicy, pass_timeout: Duration) -> Self {
        Self {
            runner,
            neural: None,
            merge,
            filter,
            pass_timeout,
        }
    }

    /// Back complex-script pages with a neural recognizer.
    pub fn with_neural(mut self, neural: Arc<dyn Recognizer>) -> Self {
        self.neural = Some(neural);
        self
    }

    async fn run(&self, image: &DynamicImage, pass: &PassSpec) -> Result<Recognition, EngineError> {
        with_timeout("tesseract", self.pass_timeout, self.runner.run_pass(image, pass)).await
    }

    async fn run_step(&self, image: &Arc<DynamicImage>, step: &Step) -> Result<Recognition, EngineError> {
        match step {
            Step::Pass(pass) => self.run(image, pass).await,
            Step::Variant(variant, pass) => {
                let variant = *variant;
                let src = Arc::clone(image);
                let enhanced = tokio::task::spawn_blocking(move || variant.apply(&src))
                    .await
                    .map_err(|e| EngineError::new(ENGINE, EngineErrorKind::Process, e.to_string()))?;
                self.run(&enhanced, &pass.clone().labelled(variant.label())).await
            }
        }
    }

    /// Run the Latin confirmation pass and return a filter that knows its verdict.
    async fn confirm_foreign(&self, image: &DynamicImage, filter: HallucinationFilter) -> HallucinationFilter {
        let pass = PassSpec::book(Script::Latin.tesseract_lang()).labelled("confirm-foreign");
        match self.run(image, &pass).await {
            Ok(r) => {
                let yes = filter.confirms(r.confidence);
                debug!("foreign text confirmation at {:.1}%: {}", r.confidence, yes);
                filter.confirmed(yes)
            }
            Err(e) => {
                debug!("foreign text confirmation failed: {}", e);
                filter
            }
        }
    }
}

#[async_trait]
impl Recognizer for LocalStack {
    fn name(&self) -> &str {
        ENGINE
    }

    fn call_budget(&self) -> u32 {
        MAX_CALLS
    }

    async fn recognize(&self, page: &PageImage, profile: ScriptProfile) -> Result<Recognition, EngineError> {
        let image = &page.image;
        let mut attempts = Attempts::default();

        let first = self.run(image, &PassSpec::book(primary_lang(profile))).await;
        let gate = attempts.record(first).unwrap_or(0.0);

        for g in plan(profile) {
            if gate < g.below {
                let res = self.run_step(image, &g.step).await;
                let conf = attempts.record(res);
                if profile == ScriptProfile::Mixed && g.below == ALWAYS && conf.unwrap_or(0.0) < MIXED_AUTO_BELOW {
                    let combined = PassSpec::auto(&profile.tesseract_langs()).labelled("mixed-auto");
                    let res = self.run(image, &combined).await;
                    attempts.record(res);
                }
            }
        }

        if attempts.best().map_or(true, |b| b.confidence < SCRIPT_FALLBACK_BELOW) {
            let models = profile
                .scripts()
                .iter()
                .map(|s| s.tesseract_script_model())
                .collect::<Vec<_>>()
                .join("+");
            let res = self.run(image, &PassSpec::script_fallback(&models)).await;
            attempts.record(res);
        }

        let mut best = attempts.best();

        if profile.is_complex() {
            if let Some(ref neural) = self.neural {
                match with_timeout(neural.name(), self.pass_timeout, neural.recognize(page, profile)).await {
                    Ok(secondary) => {
                        best = Some(match best {
                            Some(primary) => merge_with_secondary(primary, secondary, &self.merge),
                            None => secondary,
                        });
                    }
                    Err(e) => {
                        warn!("page {}: neural recognizer failed: {}", page.page_number, e);
                        attempts.errors.push(e);
                    }
                }
            }
        }

        let best = match best {
            Some(b) => b,
            None => return Err(attempts.into_error()),
        };

        let mut filter = HallucinationFilter::new(profile, self.filter);
        if filter.is_active() && filter.has_foreign(&best.text) {
            filter = self.confirm_foreign(image, filter).await;
        }
        let text = postprocess::clean_ocr_text(&filter.filter(&best.text), profile);

        debug!(
            "page {}: local best {} at {:.1}% after {} passes",
            page.page_number,
            best.label,
            best.confidence,
            attempts.ok.len() + attempts.errors.len()
        );
        Ok(Recognition::new(text, best.confidence, best.label))
    }
}
