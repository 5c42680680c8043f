//! Tolerant parsing of model JSON output.
//!
//! Even with `response_mime_type=application/json` and explicit instructions,
//! models occasionally return output that is *almost* JSON: wrapped in
//! ```` ```json ```` fences, closed with one brace too many, carrying trailing
//! commas, or writing `4.` for a number. [`parse_model_json`] runs a strict
//! parse first, then a bounded sequence of named textual repairs, and finally
//! fails with a [`JsonParseError`] carrying excerpts of the offending text.
//!
//! ## Repair order
//!
//! Repairs are cumulative and ordered from most to least conservative; the
//! text is re-parsed after every repair that changes it:
//!
//! 1. [`trim_trailing_doubled_brace`]: `...}}` at the very end → `...}`
//! 2. [`remove_trailing_commas`]: `,]` / `,}` → `]` / `}`
//! 3. [`complete_bare_decimals`]: `4.` → `4.0`
//! 4. [`collapse_doubled_braces`]: every `}}` → `}`

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Length of the head/tail excerpts kept in [`JsonParseError`].
pub const EXCERPT_CHARS: usize = 200;

/// A model response that could not be parsed even after repairs.
#[derive(Debug, Error)]
#[error("Failed to parse LLM response as JSON. Length: {length}. Start: {head}... End: ...{tail}")]
pub struct JsonParseError {
    pub length: usize,
    pub head: String,
    pub tail: String,
    #[source]
    pub source: serde_json::Error,
}

impl JsonParseError {
    fn new(text: &str, source: serde_json::Error) -> Self {
        Self {
            length: text.len(),
            head: head_chars(text, EXCERPT_CHARS),
            tail: tail_chars(text, EXCERPT_CHARS),
            source,
        }
    }
}

type Repair = fn(&str) -> Option<String>;

/// Named repairs in application order.
const REPAIRS: &[(&str, Repair)] = &[
    ("trim_trailing_doubled_brace", trim_trailing_doubled_brace),
    ("remove_trailing_commas", remove_trailing_commas),
    ("complete_bare_decimals", complete_bare_decimals),
    ("collapse_doubled_braces", collapse_doubled_braces),
];

/// Strip fences, parse strictly, then fall back to the repair sequence.
pub fn parse_model_json(raw: &str) -> Result<Value, JsonParseError> {
    let text = strip_code_fences(raw);

    let first_err = match serde_json::from_str::<Value>(&text) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };
    debug!("Strict JSON parse failed ({}), attempting repair", first_err);

    let mut current = text.clone();
    for (name, repair) in REPAIRS {
        let Some(next) = repair(&current) else {
            continue;
        };
        current = next;
        if let Ok(v) = serde_json::from_str::<Value>(&current) {
            info!("JSON repair '{}' succeeded", name);
            return Ok(v);
        }
    }

    Err(JsonParseError::new(&text, first_err))
}

// ── Fences ───────────────────────────────────────────────────────────────────

/// Remove a leading ```` ```json ```` / ```` ``` ```` and a trailing ```` ``` ````.
///
/// Works on unbalanced input too, since a truncated response may open a fence
/// without closing it.
pub fn strip_code_fences(input: &str) -> String {
    let mut s = input.trim();
    if let Some(rest) = s.strip_prefix("```json").or_else(|| s.strip_prefix("```JSON")) {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim().to_string()
}

// ── Repairs ──────────────────────────────────────────────────────────────────

/// Drop one brace from a doubled closing brace at the end of the text.
pub fn trim_trailing_doubled_brace(input: &str) -> Option<String> {
    let trimmed = input.trim_end();
    trimmed
        .strip_suffix("}}")
        .map(|body| format!("{}}}", body))
}

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[\]}])").unwrap());

/// Remove commas directly preceding a closing bracket or brace.
pub fn remove_trailing_commas(input: &str) -> Option<String> {
    if !RE_TRAILING_COMMA.is_match(input) {
        return None;
    }
    Some(RE_TRAILING_COMMA.replace_all(input, "$1").into_owned())
}

static RE_BARE_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\.(\s*[,\]}])").unwrap());

/// Turn numbers written as `4.` into `4.0`.
pub fn complete_bare_decimals(input: &str) -> Option<String> {
    if !RE_BARE_DECIMAL.is_match(input) {
        return None;
    }
    Some(RE_BARE_DECIMAL.replace_all(input, "${1}.0${2}").into_owned())
}

/// Replace every `}}` with `}`.
///
/// Blunt, so it runs last: the bill schema never legitimately closes two
/// objects back to back, but other shapes would be damaged by it.
pub fn collapse_doubled_braces(input: &str) -> Option<String> {
    if !input.contains("}}") {
        return None;
    }
    Some(input.replace("}}", "}"))
}

// ── Excerpts ─────────────────────────────────────────────────────────────────

fn head_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn tail_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────
