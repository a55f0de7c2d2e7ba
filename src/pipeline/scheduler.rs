//! Pipeline scheduler: pipelined conversion and bounded page dispatch.
//!
//! ```text
//!  convert 1–4 ─┬─ spawn p1 p2 p3 p4
//!  convert 5–8 ─┼─ spawn p5 p6 p7 p8        ┐ tasks wait on the semaphore,
//!  convert 9–12 ┴─ spawn p9 p10 p11 p12     ┘ never on the converter
//!                               join all ──▶ results (completion order)
//! ```
//!
//! Each batch's tasks are spawned as soon as the batch is converted, and the
//! next batch starts converting right away. A task takes a semaphore permit
//! *inside* the task, so a full worker pool never blocks conversion. The
//! permit count is the only concurrency bound and is independent of the
//! batch size.
//!
//! Failures stay local to a page: a batch that fails to convert degrades its
//! pages to [`PageError::ConversionFailed`], and a panicking task degrades its
//! page to [`PageError::TaskLost`]. Sibling tasks are never cancelled.

use crate::error::PageError;
use crate::output::PageResult;
use crate::pipeline::cascade::Cascade;
use crate::pipeline::render::{PageImage, PageSource};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::script::ScriptProfile;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What a page task hands back.
#[derive(Debug, Clone)]
pub struct PageOutput {
    pub result: PageResult,
    /// Strategy / feature labels applied to this page.
    pub features: Vec<String>,
}

impl PageOutput {
    pub fn degraded(page_number: usize, error: PageError) -> Self {
        Self {
            result: PageResult::failed(page_number, error),
            features: Vec::new(),
        }
    }
}

/// Processes one converted page.
#[async_trait]
pub trait PageWorker: Send + Sync + 'static {
    async fn process(&self, page: PageImage) -> PageOutput;
}

/// [`PageWorker`] running the confidence cascade.
pub struct CascadeWorker {
    cascade: Arc<Cascade>,
    profile: ScriptProfile,
}

impl CascadeWorker {
    pub fn new(cascade: Arc<Cascade>, profile: ScriptProfile) -> Self {
        Self { cascade, profile }
    }
}

#[async_trait]
impl PageWorker for CascadeWorker {
    async fn process(&self, page: PageImage) -> PageOutput {
        let report = self.cascade.run(&page, self.profile).await;
        let features = report.strategies_run().map(str::to_string).collect();
        PageOutput {
            result: report.into_page_result(),
            features,
        }
    }
}

/// Everything the scheduler collected, in completion order.
#[derive(Debug, Clone)]
pub struct Scheduled {
    pub total_pages: usize,
    pub outputs: Vec<PageOutput>,
}

/// Batch size, concurrency bound and progress sink for one run.
#[derive(Clone)]
pub struct Scheduler {
    batch_size: usize,
    concurrency: usize,
    progress: ProgressCallback,
}

impl Scheduler {
    pub fn new(batch_size: usize, concurrency: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            progress: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        if let Some(cb) = progress {
            self.progress = cb;
        }
        self
    }

    /// Convert `source` batch by batch and run `worker` on every page.
    ///
    /// Returns after every spawned task has finished (the aggregation
    /// barrier). Pages are in completion order; restoring page order is
    /// the aggregator's job.
    pub async fn run(&self, source: Arc<dyn PageSource>, worker: Arc<dyn PageWorker>) -> Scheduled {
        let total = source.page_count();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<PageOutput> = JoinSet::new();
        let mut outputs: Vec<PageOutput> = Vec::with_capacity(total);

        info!(
            "Scheduling {} pages: batch {}, {} in flight",
            total, self.batch_size, self.concurrency
        );
        self.progress.on_document_start(total);

        let mut first = 1usize;
        while first <= total {
            let last = (first + self.batch_size - 1).min(total);
            match source.convert_range(first, last).await {
                Ok(images) => {
                    debug!("Converted pages {}-{}", first, last);
                    self.progress.on_batch_converted(first, last);
                    for page in images {
                        self.spawn_page(&mut tasks, &permits, &worker, page, total);
                    }
                }
                Err(e) => {
                    warn!("Pages {}-{} failed to convert: {}", first, last, e);
                    for page_number in first..=last {
                        let err = PageError::ConversionFailed {
                            page: page_number,
                            detail: e.to_string(),
                        };
                        self.progress.on_page_error(page_number, total, err.to_string());
                        outputs.push(PageOutput::degraded(page_number, err));
                    }
                }
            }
            first = last + 1;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(out) => outputs.push(out),
                // The page is gap-filled as TaskLost by the aggregator.
                Err(e) => warn!("Page task did not complete: {}", e),
            }
        }

        Scheduled {
            total_pages: total,
            outputs,
        }
    }

    fn spawn_page(
        &self,
        tasks: &mut JoinSet<PageOutput>,
        permits: &Arc<Semaphore>,
        worker: &Arc<dyn PageWorker>,
        page: PageImage,
        total: usize,
    ) {
        let permits = Arc::clone(permits);
        let worker = Arc::clone(worker);
        let progress = Arc::clone(&self.progress);
        let page_number = page.page_number;

        tasks.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    return PageOutput::degraded(
                        page_number,
                        PageError::TaskLost {
                            page: page_number,
                            detail: e.to_string(),
                        },
                    )
                }
            };
            progress.on_page_start(page_number, total);

            let out = match AssertUnwindSafe(worker.process(page)).catch_unwind().await {
                Ok(out) => out,
                Err(panic) => {
                    let detail = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "page task panicked".to_string());
                    warn!("Page {} task panicked: {}", page_number, detail);
                    PageOutput::degraded(page_number, PageError::TaskLost { page: page_number, detail })
                }
            };

            match out.result.error {
                Some(ref err) => progress.on_page_error(page_number, total, err.to_string()),
                None => progress.on_page_complete(page_number, total, out.result.confidence),
            }
            out
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct BlankSource {
        pages: usize,
        fail_from: Option<usize>,
    }

    #[async_trait]
    impl PageSource for BlankSource {
        fn page_count(&self) -> usize {
            self.pages
        }

        async fn convert_range(&self, first: usize, last: usize) -> Result<Vec<PageImage>, ConversionError> {
            if self.fail_from.is_some_and(|f| first >= f) {
                return Err(ConversionError::PageRender {
                    page: first,
                    detail: "corrupt stream".into(),
                });
            }
            Ok((first..=last)
                .map(|n| PageImage::new(n, DynamicImage::new_luma8(2, 2), 72))
                .collect())
        }
    }

    /// Tracks how many pages are being processed at once.
    #[derive(Default)]
    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PageWorker for Gauge {
        async fn process(&self, page: PageImage) -> PageOutput {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5 + (page.page_number as u64 * 7) % 11)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if page.page_number == 3 {
                panic!("worker blew up");
            }
            PageOutput {
                result: PageResult::resolved(page.page_number, format!("p{}", page.page_number), 90.0, "primary"),
                features: vec!["primary".into()],
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_pages_never_exceed_the_limit() {
        let gauge = Arc::new(Gauge::default());
        let source = Arc::new(BlankSource {
            pages: 40,
            fail_from: None,
        });
        let out = Scheduler::new(4, 3)
            .run(source, Arc::clone(&gauge) as Arc<dyn PageWorker>)
            .await;
        assert_eq!(out.outputs.len(), 40);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
        assert!(gauge.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn panicking_page_is_degraded_not_lost() {
        let source = Arc::new(BlankSource {
            pages: 5,
            fail_from: None,
        });
        let out = Scheduler::new(2, 2).run(source, Arc::new(Gauge::default())).await;
        assert_eq!(out.outputs.len(), 5);
        let p3 = out.outputs.iter().find(|o| o.result.page_number == 3).unwrap();
        assert!(matches!(p3.result.error, Some(PageError::TaskLost { page: 3, .. })));
        assert!(out
            .outputs
            .iter()
            .filter(|o| o.result.page_number != 3)
            .all(|o| !o.result.is_failed()));
    }

    #[tokio::test]
    async fn failed_batch_degrades_only_its_pages() {
        let source = Arc::new(BlankSource {
            pages: 6,
            fail_from: Some(5),
        });
        let out = Scheduler::new(4, 2).run(source, Arc::new(Gauge::default())).await;
        assert_eq!(out.outputs.len(), 6);
        for n in [5, 6] {
            let o = out.outputs.iter().find(|o| o.result.page_number == n).unwrap();
            assert!(matches!(o.result.error, Some(PageError::ConversionFailed { .. })));
        }
        let ok = out.outputs.iter().filter(|o| !o.result.is_failed()).count();
        assert_eq!(ok, 3, "pages 1, 2, 4 succeed; 3 panics");
    }
}
