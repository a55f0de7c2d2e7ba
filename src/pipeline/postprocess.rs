//! Post-processing: deterministic cleanup of recognized text.
//!
//! Two entry points for two kinds of engine output:
//!
//! * [`clean_ocr_text`]: plain text from the local stack. Collapses the
//!   character stutter the classic engine produces on Bengali glyphs
//!   (doubled vowel signs, `।।`, runs of `০`), strips invisible code points
//!   and normalises whitespace.
//! * [`clean_markup`]: structured markup from the premium engine. Fixes
//!   model quirks (outer fences, CRLF, blank-line runs, stray table
//!   separators) without touching content.
//!
//! ## Why keep ZWJ / ZWNJ?
//!
//! In Bengali the zero-width joiner and non-joiner select between conjunct
//! and explicit-hasanta forms; removing them changes the rendered word. Only
//! the code points that never carry meaning in the supported scripts are
//! stripped.
//!
//! Every rule is a pure `&str → String` pass, and both entry points are
//! idempotent.

use crate::script::ScriptProfile;
use once_cell::sync::Lazy;
use regex::Regex;

const BENGALI_DANDA: char = '\u{0964}';
const BENGALI_ZERO: char = '\u{09E6}';

/// Clean plain OCR text for the given profile.
pub fn clean_ocr_text(input: &str, profile: ScriptProfile) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = if profile.includes(crate::script::Script::Bengali) {
        collapse_bengali_stutter(&s)
    } else {
        s
    };
    normalise_whitespace(&s)
}

/// Clean premium-engine markup for one page.
pub fn clean_markup(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_mid_table_separators(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Bengali stutter ──────────────────────────────────────────────────────

/// Dependent vowel signs U+09BE..=U+09CC and the au length mark.
fn is_bengali_vowel_sign(c: char) -> bool {
    matches!(c, '\u{09BE}'..='\u{09CC}' | '\u{09D7}')
}

/// A doubled vowel sign or danda is never valid Bengali; keep one.
/// A token made only of `০` collapses to a single zero, but zeros inside
/// a number (`১০০`) are left alone.
fn collapse_bengali_stutter(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev: Option<char> = None;
    for c in input.chars() {
        if prev == Some(c) && (is_bengali_vowel_sign(c) || c == BENGALI_DANDA) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    RE_ZERO_RUN
        .replace_all(&out, format!("${{1}}{BENGALI_ZERO}${{2}}").as_str())
        .into_owned()
}

static RE_ZERO_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\u{09E6}-\u{09EF}0-9])\u{09E6}{2,}([^\u{09E6}-\u{09EF}0-9]|$)").unwrap());

// ── Whitespace ───────────────────────────────────────────────────────────

static RE_INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{00A0}]+").unwrap());

/// Single spaces inside lines, no trailing space, at most one blank line.
fn normalise_whitespace(input: &str) -> String {
    let lines: Vec<String> = input
        .split('\n')
        .map(|l| RE_INLINE_SPACE.replace_all(l, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    RE_PARAGRAPH_GAP
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

static RE_PARAGRAPH_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

// ── Markup rules ─────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md|html)?\n(.*)\n```\s*$").unwrap());

/// Remove one pair of fences wrapping the whole input, if present.
pub fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

/// GFM allows a separator only as the second row of a table.
fn remove_mid_table_separators(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut table_line_count = 0usize;

    for line in input.split('\n') {
        if is_table_row(line) {
            table_line_count += 1;
            if is_separator_row(line) && table_line_count != 2 {
                continue;
            }
        } else {
            table_line_count = 0;
        }
        result.push(line);
    }

    result.join("\n")
}

// ── Invisible code points ────────────────────────────────────────────────

/// Zero-width space, BOM, soft hyphen, word joiner. ZWJ/ZWNJ are kept.
fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}
