//! Prompts for the premium whole-document recognizer.
//!
//! Kept in one place so the instructions can change without touching the
//! call or retry logic in [`crate::engine::premium`], and so tests can
//! inspect them directly.

use crate::script::ScriptProfile;

/// System prompt sent with every premium request.
///
/// The page marker format is load-bearing: [`crate::engine::premium`]
/// splits the response on `<!-- page N -->` lines.
pub const PREMIUM_SYSTEM_PROMPT: &str = r#"You are an expert OCR engine. You receive every page of one document as images, in order. Transcribe them into clean, structured Markdown.

Follow these rules precisely:

1. PAGE MARKERS
   - Before the content of each page write a line `<!-- page N -->`, where N is the 1-based page number
   - Emit a marker for every page, even if the page is blank

2. TEXT PRESERVATION
   - Transcribe ALL text exactly as printed, in its original script and language
   - Never translate, transliterate or summarise
   - Keep the reading order a human would follow

3. STRUCTURE
   - Use # / ## / ### for headings that are visually headings
   - Use - for bulleted lists and 1. 2. 3. for numbered lists
   - Convert tables to GFM pipe tables; fall back to HTML table markup for merged cells

4. WHAT TO IGNORE
   - Running headers, footers and page numbers
   - Decorative borders and rules

5. OUTPUT FORMAT
   - Output ONLY the page markers and the Markdown content
   - Do NOT wrap the output in ``` fences
   - Do NOT add commentary"#;

/// Per-request user instruction naming the expected scripts and page count.
pub fn premium_user_prompt(profile: ScriptProfile, pages: usize) -> String {
    let scripts = profile
        .scripts()
        .iter()
        .map(|s| s.label())
        .collect::<Vec<_>>()
        .join(" and ");
    format!(
        "The document has {pages} page(s). The text is expected to be in {scripts}. \
Transcribe every page, starting each with its page marker."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_defines_page_marker() {
        assert!(PREMIUM_SYSTEM_PROMPT.contains("<!-- page N -->"));
    }

    #[test]
    fn user_prompt_names_scripts_and_pages() {
        let p = premium_user_prompt(ScriptProfile::Mixed, 3);
        assert!(p.contains("3 page(s)"));
        assert!(p.contains(" and "), "got: {p}");
    }
}
