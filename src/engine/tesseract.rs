//! Tesseract CLI adapter: one segmentation pass per call.
//!
//! The multi-pass policy lives in [`super::local`]; this module only knows
//! how to run a single [`PassSpec`] and turn Tesseract's TSV output into text
//! plus a mean word confidence.
//!
//! ## Why the CLI and not bindings?
//!
//! The binary is what every deployment already has installed with its
//! language packs. Running it as a child process also keeps a crash inside
//! Tesseract from taking the pipeline down, and `kill_on_drop` lets the
//! per-call timeout actually stop the work.

use super::Recognition;
use crate::error::{EngineError, EngineErrorKind};
use crate::pipeline::encode;
use async_trait::async_trait;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::io::Write;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

const ENGINE: &str = "tesseract";

/// One Tesseract configuration: language models, segmentation mode and
/// extra `-c` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSpec {
    pub label: String,
    /// `-l` argument, e.g. `ben+eng`.
    pub langs: String,
    /// `--psm` page segmentation mode.
    pub psm: u8,
    pub vars: Vec<(&'static str, &'static str)>,
}

const PRESERVE_SPACES: (&str, &str) = ("preserve_interword_spaces", "1");

impl PassSpec {
    fn new(label: impl Into<String>, langs: impl Into<String>, psm: u8) -> Self {
        Self {
            label: label.into(),
            langs: langs.into(),
            psm,
            vars: Vec::new(),
        }
    }

    fn var(mut self, kv: (&'static str, &'static str)) -> Self {
        self.vars.push(kv);
        self
    }

    /// Uniform block of text (PSM 6): printed books.
    pub fn book(langs: &str) -> Self {
        Self::new("book", langs, 6).var(PRESERVE_SPACES)
    }

    /// Fully automatic layout analysis (PSM 3).
    pub fn auto(langs: &str) -> Self {
        Self::new("auto-segmentation", langs, 3).var(PRESERVE_SPACES)
    }

    /// Single column of variable-size text (PSM 4).
    pub fn column(langs: &str) -> Self {
        Self::new("column", langs, 4).var(PRESERVE_SPACES)
    }

    /// Block mode without space preservation.
    pub fn block(langs: &str) -> Self {
        Self::new("block", langs, 6)
    }

    /// Sparse text in no particular order (PSM 11): noisy scans.
    pub fn sparse(langs: &str) -> Self {
        Self::new("sparse", langs, 11)
    }

    /// Block mode with table-rule glyphs blacklisted.
    pub fn high_accuracy(langs: &str) -> Self {
        Self::new("high-accuracy", langs, 6).var(("tessedit_char_blacklist", "|~`"))
    }

    /// Block mode with spaces preserved and symbol noise blacklisted.
    pub fn max_accuracy(langs: &str) -> Self {
        Self::new("max-accuracy", langs, 6)
            .var(PRESERVE_SPACES)
            .var(("tessedit_char_blacklist", "|~`@#$%^&*"))
    }

    /// Script-level model (`script/Bengali`…) with automatic layout.
    pub fn script_fallback(script_models: &str) -> Self {
        Self::new("script-fallback", script_models, 3)
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-l".to_string(),
            self.langs.clone(),
            "--oem".to_string(),
            "1".to_string(),
            "--psm".to_string(),
            self.psm.to_string(),
        ];
        for (k, v) in &self.vars {
            args.push("-c".to_string());
            args.push(format!("{k}={v}"));
        }
        args.push("tsv".to_string());
        args
    }
}

/// Runs a single recognition pass over an image.
#[async_trait]
pub trait PassRunner: Send + Sync {
    async fn run_pass(&self, image: &DynamicImage, pass: &PassSpec) -> Result<Recognition, EngineError>;
}

/// [`PassRunner`] backed by the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    cmd: String,
}

impl TesseractCli {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

#[async_trait]
impl PassRunner for TesseractCli {
    async fn run_pass(&self, image: &DynamicImage, pass: &PassSpec) -> Result<Recognition, EngineError> {
        let img = image.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<tempfile::NamedTempFile, String> {
            let png = encode::png_bytes(&img).map_err(|e| e.to_string())?;
            let mut f = tempfile::Builder::new()
                .suffix(".png")
                .tempfile()
                .map_err(|e| e.to_string())?;
            f.write_all(&png).map_err(|e| e.to_string())?;
            Ok(f)
        })
        .await
        .map_err(|e| EngineError::new(ENGINE, EngineErrorKind::Process, e.to_string()))?
        .map_err(|e| EngineError::new(ENGINE, EngineErrorKind::Process, e))?;

        let output = Command::new(&self.cmd)
            .arg(file.path())
            .arg("stdout")
            .args(pass.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::unavailable(ENGINE, format!("'{}' not found on PATH", self.cmd))
                } else {
                    EngineError::new(ENGINE, EngineErrorKind::Process, e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::new(
                ENGINE,
                EngineErrorKind::Process,
                format!("{} ({})", output.status, stderr.trim()),
            ));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let (text, confidence) = parse_tsv(&tsv);
        debug!(
            "tesseract {} [{}]: {:.1}% over {} chars",
            pass.label,
            pass.langs,
            confidence,
            text.chars().count()
        );
        Ok(Recognition::new(text, confidence, format!("tesseract:{}", pass.label)))
    }
}

/// Parse Tesseract TSV into (text, mean word confidence).
///
/// Words are joined by spaces within a line and lines by newlines, in
/// reading order. Only words with a positive confidence count towards the
/// mean; no such words means confidence 0.
pub fn parse_tsv(tsv: &str) -> (String, f64) {
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<String>> = BTreeMap::new();
    let mut confs: Vec<f64> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        lines
            .entry((num(1), num(2), num(3), num(4)))
            .or_default()
            .push(word.to_string());
        if let Ok(c) = cols[10].trim().parse::<f64>() {
            if c > 0.0 {
                confs.push(c);
            }
        }
    }

    let text = lines
        .into_values()
        .map(|words| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let confidence = if confs.is_empty() {
        0.0
    } else {
        confs.iter().sum::<f64>() / confs.len() as f64
    };
    (text, confidence)
}
