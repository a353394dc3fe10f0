//! Starting-index estimation for tracked files.
//!
//! `FileTracker.startTrackingUsingLLM` asks a text-completion collaborator
//! where the real instructions of an uploaded pattern file begin, instead
//! of blindly starting at line 0. The collaborator is behind the
//! [`TextCompletion`] trait; [`IndexEstimator`] owns the prompt, the JSON
//! extraction, and the bounds checks, so completions are free to return
//! sloppy text around the JSON object.
//!
//! [`HeuristicCompletion`] is the bundled deterministic implementation: it
//! scans the prompt's numbered preview lines for the first instruction-like
//! line after the preamble sections. It keeps the whole crate runnable and
//! testable without network access.

use std::sync::OnceLock;

use async_trait::async_trait;
use miette::Diagnostic;
use regex::Regex;
use thiserror::Error;

/// How many preview lines of the file the prompt includes.
const PREVIEW_LINES: usize = 50;

/// Section headings that precede the instructions in a pattern file.
const PREAMBLE_SECTIONS: &[&str] = &[
    "materials",
    "stitch abbreviations",
    "finished size",
    "notes",
    "gauge",
    "stitch terms",
    "tools",
];

#[derive(Debug, Error, Diagnostic)]
pub enum EstimateError {
    #[error("completion failed: {message}")]
    #[diagnostic(code(weft::estimate::completion))]
    Completion { message: String },

    #[error("no JSON object found in completion response")]
    #[diagnostic(
        code(weft::estimate::no_json),
        help("The completion must return a `{{\"currentIndex\": n}}` object; extra prose around it is tolerated, its absence is not.")
    )]
    NoJsonObject,

    #[error("completion response carries no integer \"currentIndex\"")]
    #[diagnostic(code(weft::estimate::missing_index))]
    MissingIndex,

    #[error("estimated index {index} is outside [0, {max_index}]")]
    #[diagnostic(
        code(weft::estimate::out_of_bounds),
        help("The prompt states the valid range; a completion ignoring it is rejected rather than clamped.")
    )]
    OutOfBounds { index: i64, max_index: i64 },

    #[error("malformed JSON in completion response")]
    #[diagnostic(code(weft::estimate::malformed_json))]
    Malformed(#[from] serde_json::Error),
}

/// A text-completion backend: prompt in, free-form text out.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, EstimateError>;
}

/// Estimates the starting index of a file via a completion backend.
pub struct IndexEstimator {
    completion: std::sync::Arc<dyn TextCompletion>,
}

impl IndexEstimator {
    pub fn new(completion: std::sync::Arc<dyn TextCompletion>) -> Self {
        Self { completion }
    }

    /// Ask the backend for the first-instruction index of `lines`.
    ///
    /// `max_index` is the last valid index of the *full* file; the prompt
    /// only previews the first [`PREVIEW_LINES`] lines.
    pub async fn estimate(&self, lines: &[String], max_index: i64) -> Result<i64, EstimateError> {
        let prompt = tracking_prompt(lines, max_index);
        let text = self.completion.complete(&prompt).await?;
        parse_index(&text, max_index)
    }
}

impl std::fmt::Debug for IndexEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexEstimator").finish_non_exhaustive()
    }
}

/// Build the estimation prompt: a numbered preview plus the valid range.
pub fn tracking_prompt(lines: &[String], max_index: i64) -> String {
    let preview: Vec<String> = lines
        .iter()
        .take(PREVIEW_LINES)
        .enumerate()
        .map(|(i, line)| format!("[{i}]: {line}"))
        .collect();
    format!(
        "You are locating the first real instruction line of a crochet \
         pattern file.\n\
         The file may contain OCR noise; preamble sections such as \
         Materials, Gauge or Notes come before the instructions.\n\
         The full file has {total} lines; you see the first {shown} below.\n\
         \n\
         FILE PREVIEW:\n{preview}\n\
         \n\
         Return ONLY a JSON object of the exact shape \
         {{\"currentIndex\": n}} where n is an integer in [0, {max_index}].",
        total = max_index + 1,
        shown = preview.len(),
        preview = preview.join("\n"),
    )
}

/// Extract and validate the index from a completion response.
///
/// Tolerates prose around the JSON object; rejects missing, non-integer,
/// or out-of-range indices instead of clamping them.
pub fn parse_index(response: &str, max_index: i64) -> Result<i64, EstimateError> {
    static JSON_OBJECT: OnceLock<Regex> = OnceLock::new();
    let re = JSON_OBJECT.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap());

    let raw = re
        .find(response)
        .ok_or(EstimateError::NoJsonObject)?
        .as_str();
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let index = value
        .get("currentIndex")
        .and_then(serde_json::Value::as_i64)
        .ok_or(EstimateError::MissingIndex)?;
    if index < 0 || index > max_index {
        return Err(EstimateError::OutOfBounds { index, max_index });
    }
    Ok(index)
}

/// Deterministic offline completion: scans the prompt preview for the first
/// instruction-like line after the preamble sections.
#[derive(Debug, Default)]
pub struct HeuristicCompletion;

#[async_trait]
impl TextCompletion for HeuristicCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, EstimateError> {
        static PREVIEW_LINE: OnceLock<Regex> = OnceLock::new();
        static INSTRUCTION: OnceLock<Regex> = OnceLock::new();
        let preview = PREVIEW_LINE.get_or_init(|| Regex::new(r"^\[(\d+)\]: (.*)$").unwrap());
        let instruction =
            INSTRUCTION.get_or_init(|| Regex::new(r"^(row\s+\d+|\d+[.):])").unwrap());

        let mut saw_preamble = false;
        let mut fallback = 0i64;
        for line in prompt.lines() {
            let Some(caps) = preview.captures(line) else {
                continue;
            };
            let index: i64 = caps[1].parse().unwrap_or(0);
            let text = caps[2].trim().to_lowercase();
            if PREAMBLE_SECTIONS.iter().any(|s| text.starts_with(s)) {
                saw_preamble = true;
                // Instructions start somewhere after the last heading.
                fallback = index + 1;
                continue;
            }
            // "1. …", "2) …", "row 1 …" after the preamble is the start.
            if saw_preamble && instruction.is_match(&text) {
                return Ok(format!("{{\"currentIndex\": {index}}}"));
            }
        }
        Ok(format!("{{\"currentIndex\": {fallback}}}"))
    }
}
