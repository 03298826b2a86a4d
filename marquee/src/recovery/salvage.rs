//! Extraction of JSON candidates from surrounding prose.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").unwrap());

static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)`\s*(\[\s*\{.*\}\s*\]|\{.*\})\s*`").unwrap());

static ARRAY_OF_OBJECTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").unwrap());

static OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

static ARRAY_START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*\{").unwrap());

static ESCAPED_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\\?"title\\?"\s*:\s*\\?"([^"\\]+)"#).unwrap());

/// Contents of fenced code blocks, then of inline code spans, in order of
/// appearance.
pub fn code_block_candidates(text: &str) -> Vec<&str> {
    let mut candidates: Vec<&str> = FENCE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();
    if candidates.is_empty() {
        candidates.extend(
            INLINE_CODE_RE
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim()),
        );
    }
    candidates
}

/// Widest `[ { ... } ]` span, else widest `{ ... }` span.
pub fn pattern_candidate(text: &str) -> Option<PatternMatch<'_>> {
    if let Some(m) = ARRAY_OF_OBJECTS_RE.find(text) {
        return Some(PatternMatch::Array(m.as_str()));
    }
    OBJECT_RE.find(text).map(|m| PatternMatch::Object(m.as_str()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMatch<'a> {
    Array(&'a str),
    /// A lone object span, to be wrapped in a one-element sequence
    Object(&'a str),
}

pub fn looks_like_sequence(text: &str) -> bool {
    text.trim_start().starts_with('[') || ARRAY_START_RE.is_match(text)
}

/// Byte span of one top-level object; `end` is `None` when the text ends
/// before the object closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectSpan {
    pub start: usize,
    pub end: Option<usize>,
}

impl ObjectSpan {
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        match self.end {
            Some(end) => &text[self.start..end],
            None => &text[self.start..],
        }
    }
}

/// Every outermost `{ ... }` span, string-aware. Brackets are ignored so the
/// elements of an array come out individually.
pub fn object_spans(text: &str) -> Vec<ObjectSpan> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(ObjectSpan {
                        start,
                        end: Some(i + 1),
                    });
                }
            }
            _ => {}
        }
    }
    if depth > 0 {
        spans.push(ObjectSpan { start, end: None });
    }
    spans
}

/// Last resort for movie-shaped output: pull bare titles out of a
/// `movies_json` payload that could not be repaired.
pub fn domain_titles(text: &str) -> Vec<Map<String, Value>> {
    if !text.contains("movies_json") || !text.contains('[') {
        return Vec::new();
    }
    ESCAPED_TITLE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
        .map(|title| {
            let mut record = Map::new();
            record.insert("title".to_string(), Value::String(title.to_string()));
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_blocks_are_found_in_order() {
        let text = "Sure!\n```json\n[{\"title\": \"A\"}]\n```\nand\n```\n{\"b\": 1}\n```";
        assert_eq!(
            code_block_candidates(text),
            vec!["[{\"title\": \"A\"}]", "{\"b\": 1}"]
        );
    }

    #[test]
    fn test_inline_code_is_used_without_fences() {
        let text = "Result: `[{\"title\": \"A\"}]` done";
        assert_eq!(code_block_candidates(text), vec!["[{\"title\": \"A\"}]"]);
    }

    #[test]
    fn test_pattern_candidate_prefers_arrays() {
        let text = "I found {these}: [{\"title\": \"A\"}] ok";
        assert_eq!(
            pattern_candidate(text),
            Some(PatternMatch::Array("[{\"title\": \"A\"}]"))
        );
        assert_eq!(
            pattern_candidate("only {\"a\": 1} here"),
            Some(PatternMatch::Object("{\"a\": 1}"))
        );
        assert_eq!(pattern_candidate("nothing"), None);
    }

    #[test]
    fn test_object_spans_ignore_braces_in_strings() {
        let text = r#"[{"t": "a}b"}, {"t": {"x": 1}}, {"t": "cut"#;
        let spans = object_spans(text);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].slice(text), r#"{"t": "a}b"}"#);
        assert_eq!(spans[1].slice(text), r#"{"t": {"x": 1}}"#);
        assert_eq!(spans[2].end, None);
    }

    #[test]
    fn test_domain_titles_from_escaped_payload() {
        let text = r#"{"movies_json": "[{\"title\": \"Dune: Part Two\", \"id\": 1 {\"title\": \"Wicked\""#;
        let titles: Vec<_> = domain_titles(text)
            .into_iter()
            .map(|r| r["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Dune: Part Two", "Wicked"]);
        assert!(domain_titles(r#"[{"title": "A"#).is_empty());
    }
}
