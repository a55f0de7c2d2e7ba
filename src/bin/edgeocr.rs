//! CLI binary for edgequake-ocr.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `OcrConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr::{
    CallerTier, DocumentResult, OcrConfig, OcrPipeline, OcrProgressCallback, ProgressCallback,
    ScriptProfile,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per page. Pages complete out of
/// order, so start times are kept per page.
struct CliProgressCallback {
    bar: ProgressBar,
    low_confidence: f64,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(low_confidence: f64) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            low_confidence,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&page_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl OcrProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn on_batch_converted(&self, first_page: usize, last_page: usize) {
        self.bar.set_message(format!("converted {first_page}-{last_page}"));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(page_num, Instant::now());
    }

    fn on_page_complete(&self, page_num: usize, total: usize, confidence: f64) {
        let secs = self.elapsed_secs(page_num);
        let conf = format!("{confidence:>6.2}%");
        let conf = if confidence < self.low_confidence {
            yellow(&conf)
        } else {
            dim(&conf)
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            page_num,
            total,
            conf,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: String) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error,
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} pages recognised", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages recognised  ({} failed)",
                if failed == total_pages { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Bangla scan, text to stdout
  edgeocr scan.pdf

  # English image, JSON result
  edgeocr --mode english --json receipt.png

  # Mixed document with the premium engine, written to a file
  edgeocr --mode mixed --tier subscriber report.pdf -o report.json

  # Download and recognise
  edgeocr https://example.com/notice.pdf --json

  # Neural second opinion and a remote fallback
  edgeocr --neural-endpoint http://127.0.0.1:8765 \
          --vision-endpoint https://vision.example.com/v1/ocr scan.pdf

ENGINE FAMILIES:
  free, trial                      local stack (Tesseract passes, optional
                                   neural sidecar, optional remote fallback)
  subscriber, admin, super-user    premium cloud engine; falls back to the
                                   local stack on any failure or oversize

ENVIRONMENT VARIABLES:
  TESSERACT_CMD           Tesseract executable (default: tesseract)
  OCR_PDF_DPI             Rendering DPI
  OCR_MAX_PARALLEL_PAGES  Pages recognised concurrently
  CONFIDENCE_THRESHOLD    Confidence at which a page is accepted
  EDGEQUAKE_LLM_PROVIDER  Premium provider (openai, anthropic, gemini, mistral, …)
  EDGEQUAKE_MODEL         Premium model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Log filter override
"#;

/// Confidence-driven OCR for scanned PDFs and images.
#[derive(Parser, Debug)]
#[command(
    name = "edgeocr",
    version,
    about = "Confidence-driven OCR for scanned PDFs and images (Bangla, English, mixed)",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF / image path or HTTP/HTTPS URL.
    input: String,

    /// Write the JSON result to this file instead of printing to stdout.
    #[arg(short, long, env = "EDGEOCR_OUTPUT")]
    output: Option<PathBuf>,

    /// Expected scripts: bangla, english, mixed.
    #[arg(short, long, env = "OCR_MODE", default_value = "bangla")]
    mode: ScriptProfile,

    /// Caller tier: free, trial, subscriber, admin, super-user.
    #[arg(long, env = "OCR_TIER", default_value = "free")]
    tier: CallerTier,

    /// Print the full JSON result instead of plain text.
    #[arg(long, env = "EDGEOCR_JSON")]
    json: bool,

    /// Rendering DPI (72–600).
    #[arg(long, env = "OCR_PDF_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Largest rendered dimension in pixels.
    #[arg(long, env = "OCR_MAX_RENDERED_PIXELS", default_value_t = 4000)]
    max_pixels: u32,

    /// Pages converted per batch.
    #[arg(long, env = "OCR_BATCH_SIZE", default_value_t = 4)]
    batch_size: usize,

    /// Pages recognised concurrently (default: min(4, CPUs)).
    #[arg(short, long, env = "OCR_MAX_PARALLEL_PAGES")]
    concurrency: Option<usize>,

    /// Confidence at which a page is accepted without escalation.
    #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value_t = 90.0)]
    good_threshold: f64,

    /// Below this confidence the remote fallback is consulted.
    #[arg(long, env = "OCR_FLOOR_THRESHOLD", default_value_t = 75.0)]
    floor_threshold: f64,

    /// Per engine call timeout in seconds.
    #[arg(long, env = "OCR_ENGINE_TIMEOUT", default_value_t = 60)]
    engine_timeout: u64,

    /// Retries for remote engines.
    #[arg(long, env = "OCR_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Tesseract executable.
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract_cmd: String,

    /// Neural recognizer sidecar base URL.
    #[arg(long, env = "OCR_NEURAL_ENDPOINT")]
    neural_endpoint: Option<String>,

    /// Remote vision recognizer URL used as the last-resort fallback.
    #[arg(long, env = "OCR_VISION_ENDPOINT")]
    vision_endpoint: Option<String>,

    /// Bearer token for the vision recognizer.
    #[arg(long, env = "OCR_VISION_API_KEY", hide_env_values = true)]
    vision_api_key: Option<String>,

    /// Premium LLM provider.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Premium LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Premium engine page limit; larger documents use the local stack.
    #[arg(long, env = "OCR_PREMIUM_MAX_PAGES", default_value_t = 50)]
    premium_max_pages: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "EDGEOCR_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "EDGEOCR_NO_PROGRESS")]
    no_progress: bool,

    /// Never download pdfium; PDFs need PDFIUM_LIB_PATH or a system library.
    #[arg(long, env = "EDGEOCR_NO_PDFIUM_DOWNLOAD")]
    no_pdfium_download: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EDGEOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EDGEOCR_QUIET")]
    quiet: bool,
}

// ── pdfium provisioning ──────────────────────────────────────────────────────

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

/// Inputs with an image extension never reach pdfium; anything else might.
fn may_need_pdfium(input: &str) -> bool {
    let path = input.split(['?', '#']).next().unwrap_or(input);
    match std::path::Path::new(path).extension().and_then(|e| e.to_str()) {
        Some(ext) => !IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}

/// Make sure a pdfium library can be bound, downloading it into the
/// pdfium-auto cache on first use.
fn ensure_pdfium(show_progress: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() || edgequake_ocr::pipeline::render::bind_pdfium().is_ok() {
        return Ok(());
    }

    if !show_progress {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download pdfium")?;
        return Ok(());
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_strings(TICKS),
    );
    bar.set_prefix("pdfium");
    bar.enable_steady_tick(Duration::from_millis(80));

    let progress = bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if progress.length() != Some(t) {
                    progress.set_length(t);
                }
            }
            progress.set_position(downloaded);
        }))
    })
    .context("Failed to download pdfium")?;

    bar.finish_with_message("ready");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new(cli.floor_threshold) as Arc<dyn OcrProgressCallback>)
    } else {
        None
    };

    if !cli.no_pdfium_download && may_need_pdfium(&cli.input) {
        ensure_pdfium(!cli.quiet && !cli.json)?;
    }

    let config = build_config(&cli, progress_cb)?;
    let pipeline = OcrPipeline::new(config);
    let started = Instant::now();

    if let Some(ref output_path) = cli.output {
        let doc = pipeline
            .process_to_file(&cli.input, output_path, cli.mode, cli.tier)
            .await
            .context("OCR failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} pages  {:.2}%  {}ms  →  {}",
                if doc.failed_pages().count() == 0 { green("✔") } else { yellow("⚠") },
                doc.pages,
                doc.confidence,
                started.elapsed().as_millis(),
                bold(&output_path.display().to_string()),
            );
        }
        return Ok(());
    }

    let doc = pipeline
        .process_file(&cli.input, cli.mode, cli.tier)
        .await
        .context("OCR failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&doc).context("Failed to serialise result")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(doc.text.as_bytes())
            .context("Failed to write to stdout")?;
        if !doc.text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        print_summary(&doc, started.elapsed());
    }
    Ok(())
}

fn print_summary(doc: &DocumentResult, elapsed: Duration) {
    eprintln!(
        "{}  {} pages  confidence {:.2}%  languages {}  engine {}  {}ms",
        dim("─"),
        doc.pages,
        doc.confidence,
        doc.languages.join(","),
        doc.engine,
        elapsed.as_millis(),
    );
    for page in doc.failed_pages() {
        if let Some(ref err) = page.error {
            eprintln!("   {} {}", red("✗"), err);
        }
    }
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<OcrConfig> {
    let mut builder = OcrConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .batch_size(cli.batch_size)
        .good_threshold(cli.good_threshold)
        .floor_threshold(cli.floor_threshold)
        .engine_timeout_secs(cli.engine_timeout)
        .max_retries(cli.max_retries)
        .tesseract_cmd(cli.tesseract_cmd.clone())
        .premium_max_pages(cli.premium_max_pages)
        .download_timeout_secs(cli.download_timeout);

    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref url) = cli.neural_endpoint {
        builder = builder.neural_endpoint(url.clone());
    }
    if let Some(ref url) = cli.vision_endpoint {
        builder = builder.vision_endpoint(url.clone());
    }
    if let Some(ref key) = cli.vision_api_key {
        builder = builder.vision_api_key(key.clone());
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn only_image_inputs_skip_pdfium() {
        assert!(may_need_pdfium("scan.pdf"));
        assert!(may_need_pdfium("upload"));
        assert!(may_need_pdfium("https://example.com/doc?id=7"));
        assert!(!may_need_pdfium("page.PNG"));
        assert!(!may_need_pdfium("https://example.com/page.jpg?size=large"));
    }

    #[test]
    fn flags_map_onto_config() {
        let cli = Cli::parse_from([
            "edgeocr",
            "--mode",
            "mixed",
            "--tier",
            "super-user",
            "--dpi",
            "200",
            "-c",
            "2",
            "--good-threshold",
            "85",
            "scan.pdf",
        ]);
        assert_eq!(cli.mode, ScriptProfile::Mixed);
        assert_eq!(cli.tier, CallerTier::SuperUser);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.dpi, 200);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.thresholds.good, 85.0);
    }
}
