//! Cleanup of raw model replies before JSON parsing.
//!
//! Even when told to return raw JSON, models wrap the object in
//! ```` ```json ```` fences or add a sentence before it. These rules
//! recover the object without trying to repair its contents; anything that
//! still fails to parse is reported as malformed.
//!
//! Rules (applied in order):
//! 1. Strip invisible Unicode (BOM, zero-width spaces)
//! 2. Strip outer code fences, with or without a `json` tag
//! 3. Cut to the outermost `{ … }` span when prose surrounds it

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model reply.
pub fn clean_json_reply(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = strip_code_fences(&s);
    outermost_object(&s).to_string()
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].trim().to_string()
    } else {
        trimmed.replace("```json", "").replace("```", "").trim().to_string()
    }
}

// ── Rule 3: Outermost object ─────────────────────────────────────────────────

fn outermost_object(input: &str) -> &str {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => &input[start..=end],
        _ => input,
    }
}
