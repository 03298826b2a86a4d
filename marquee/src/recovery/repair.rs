//! Textual repairs applied to malformed JSON-ish agent output.
//!
//! Each repair is a pure `&str -> String` function that only touches
//! structure outside JSON string literals. [`PRE_REPAIRS`] lists them in the
//! order they are applied; the targeted repairs at the bottom of the module
//! are driven by a concrete `serde_json` parse error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub type Repair = fn(&str) -> String;

/// The pre-parse battery, applied in order.
pub const PRE_REPAIRS: &[(&str, Repair)] = &[
    ("nested_json_fields", repair_nested_json_fields),
    ("single_quotes", normalize_single_quotes),
    ("python_literals", normalize_python_literals),
    ("trailing_commas", strip_trailing_commas),
    ("adjacent_containers", insert_commas_between_containers),
    ("missing_value_commas", insert_commas_before_keys),
    ("balance_brackets", balance_brackets),
    ("wrap_top_level", wrap_top_level_sequence),
];

/// Repairs re-applied to the inner text of a nested `*_json` string field.
const INNER_REPAIRS: &[Repair] = &[
    normalize_single_quotes,
    normalize_python_literals,
    strip_trailing_commas,
    insert_commas_between_containers,
    insert_commas_before_keys,
    balance_brackets,
];

pub fn pre_repair(text: &str) -> String {
    PRE_REPAIRS
        .iter()
        .fold(text.to_string(), |acc, (_, repair)| repair(&acc))
}

static NESTED_JSON_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([A-Za-z0-9_]*_json)"\s*:\s*""#).unwrap());

static BARE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").unwrap());

/// A quoted key (either quote style) followed by its colon
static QUOTED_KEY_AHEAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^['"]\w+['"]\s*:"#).unwrap());

static PYTHON_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(True|False|None)\b").unwrap());

// ============================================================================
// Lexing helpers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    /// Outside any string literal
    Structural,
    StringOpen,
    StringBody,
    StringClose,
}

/// Tracks whether the scan position is inside a double-quoted literal.
#[derive(Debug, Default)]
struct StringState {
    in_string: bool,
    escaped: bool,
}

impl StringState {
    fn step(&mut self, c: char) -> Lexeme {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
                Lexeme::StringBody
            } else if c == '\\' {
                self.escaped = true;
                Lexeme::StringBody
            } else if c == '"' {
                self.in_string = false;
                Lexeme::StringClose
            } else {
                Lexeme::StringBody
            }
        } else if c == '"' {
            self.in_string = true;
            Lexeme::StringOpen
        } else {
            Lexeme::Structural
        }
    }
}

fn next_significant(text: &str, from: usize) -> Option<char> {
    next_significant_at(text, from).map(|(_, c)| c)
}

fn next_significant_at(text: &str, from: usize) -> Option<(usize, char)> {
    text.get(from..)?
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, c)| (from + i, c))
}

/// Whether a quoted key and its colon start at `at`.
fn key_ahead(text: &str, at: usize) -> bool {
    text.get(at..).is_some_and(|rest| QUOTED_KEY_AHEAD_RE.is_match(rest))
}

fn prev_significant(out: &str) -> Option<char> {
    out.chars().rev().find(|c| !c.is_whitespace())
}

// ============================================================================
// Pre-parse battery
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Outside,
    Double,
    Single,
}

/// Turn single-quoted string delimiters into double quotes.
///
/// A `'` opens a string only where a value or key can start (after `{`, `[`,
/// `,`, `:`, at the beginning, or as a key right after another string). It
/// closes one only before a structural character or before the next quoted
/// key, so apostrophes in prose and inside values survive.
pub fn normalize_single_quotes(text: &str) -> String {
    if !text.contains('\'') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut state = QuoteState::Outside;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        let after = i + c.len_utf8();
        match state {
            QuoteState::Double => {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    state = QuoteState::Outside;
                }
            }
            QuoteState::Single => {
                if escaped {
                    if c == '\'' {
                        // `\'` is not a JSON escape
                        out.pop();
                    }
                    out.push(c);
                    escaped = false;
                } else if c == '\\' {
                    out.push(c);
                    escaped = true;
                } else if c == '\'' {
                    let closes = match next_significant_at(text, after) {
                        None => true,
                        Some((at, '\'' | '"')) => key_ahead(text, at),
                        Some((_, n)) => matches!(n, ',' | ':' | '}' | ']'),
                    };
                    if closes {
                        out.push('"');
                        state = QuoteState::Outside;
                    } else {
                        out.push('\'');
                    }
                } else if c == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(c);
                }
            }
            QuoteState::Outside => {
                if c == '"' {
                    state = QuoteState::Double;
                    out.push(c);
                } else if c == '\''
                    && (matches!(prev_significant(&out), None | Some('{' | '[' | ',' | ':'))
                        || key_ahead(text, i))
                {
                    state = QuoteState::Single;
                    out.push('"');
                } else {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// `True`, `False` and `None` outside strings become `true`, `false` and
/// `null`.
pub fn normalize_python_literals(text: &str) -> String {
    if !PYTHON_LITERAL_RE.is_match(text) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut strings = StringState::default();
    let mut word = String::new();
    for c in text.chars() {
        if strings.step(c) == Lexeme::Structural && (c.is_ascii_alphanumeric() || c == '_') {
            word.push(c);
            continue;
        }
        flush_word(&mut out, &mut word);
        out.push(c);
    }
    flush_word(&mut out, &mut word);
    out
}

fn flush_word(out: &mut String, word: &mut String) {
    out.push_str(match word.as_str() {
        "True" => "true",
        "False" => "false",
        "None" => "null",
        other => other,
    });
    word.clear();
}

/// Drop commas that directly precede a closing brace or bracket.
pub fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut strings = StringState::default();
    for (i, c) in text.char_indices() {
        if strings.step(c) == Lexeme::Structural
            && c == ','
            && matches!(next_significant(text, i + 1), Some('}' | ']'))
        {
            continue;
        }
        out.push(c);
    }
    out
}

/// `}{` → `},{`, `][` → `],[`, `}[` → `},[`, `]{` → `],{`.
pub fn insert_commas_between_containers(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut strings = StringState::default();
    for (i, c) in text.char_indices() {
        out.push(c);
        if strings.step(c) == Lexeme::Structural
            && matches!(c, '}' | ']')
            && matches!(next_significant(text, i + 1), Some('{' | '['))
        {
            out.push(',');
        }
    }
    out
}

/// Insert a comma when a value terminator (digit, literal, closing quote,
/// brace or bracket) is followed directly by a new quoted string.
pub fn insert_commas_before_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut strings = StringState::default();
    // Last significant token outside strings; `'"'` stands for a closed string
    let mut last: Option<char> = None;

    for c in text.chars() {
        match strings.step(c) {
            Lexeme::StringOpen => {
                let terminated = matches!(last, Some(t) if t == '"' || t == '}' || t == ']' || t.is_ascii_alphanumeric());
                if terminated {
                    out.push(',');
                }
                out.push(c);
            }
            Lexeme::StringClose => {
                out.push(c);
                last = Some('"');
            }
            Lexeme::StringBody => out.push(c),
            Lexeme::Structural => {
                out.push(c);
                if !c.is_whitespace() {
                    last = Some(c);
                }
            }
        }
    }
    out
}

/// Append whatever closing quote, braces and brackets are missing at the end
/// of the text. Dangling `,` is removed and a dangling `:` gets a `null`.
pub fn balance_brackets(text: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut strings = StringState::default();
    for c in text.chars() {
        if strings.step(c) != Lexeme::Structural {
            continue;
        }
        match c {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() && !strings.in_string {
        return text.to_string();
    }

    let mut out = text.to_string();
    if strings.in_string {
        if strings.escaped {
            out.pop();
        }
        out.push('"');
    }
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str(" null");
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

/// Wrap several comma-separated top-level objects into one array.
pub fn wrap_top_level_sequence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return text.to_string();
    }
    let mut strings = StringState::default();
    let mut depth: i32 = 0;
    let mut values = 0;
    for c in trimmed.chars() {
        if strings.step(c) != Lexeme::Structural {
            continue;
        }
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    values += 1;
                }
            }
            _ => {}
        }
    }
    if values >= 2 && depth == 0 {
        format!("[{}]", trimmed)
    } else {
        text.to_string()
    }
}

/// Re-repair `"<name>_json": "<escaped json>"` fields whose string value is
/// itself malformed JSON, re-serializing the inner value when it parses.
pub fn repair_nested_json_fields(text: &str) -> String {
    if !text.contains("_json") {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(m) = NESTED_JSON_FIELD_RE.find_at(text, cursor) {
        // `m.end()` sits just after the opening quote of the value
        let value_start = m.end();
        let Some((content, value_end)) = nested_string_span(text, value_start) else {
            break;
        };
        out.push_str(&text[cursor..value_start - 1]);
        match repair_inner_json(content) {
            Some(literal) => out.push_str(&literal),
            None => out.push_str(&text[value_start - 1..value_end]),
        }
        cursor = value_end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Find the raw content of a string literal starting at `start` (just after
/// its opening quote). Returns the content and the index just past the
/// closing quote.
fn nested_string_span(text: &str, start: usize) -> Option<(&str, usize)> {
    let rest = text.get(start..)?;
    let mut escaped = false;
    let mut close = None;
    for (i, c) in rest.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            close = Some(i);
            break;
        }
    }

    let looks_structured = rest.trim_start().starts_with(&['[', '{'][..]);
    match close {
        // A quote right after the opening bracket means the inner JSON was
        // not escaped; fall back to the last `]"` / `}"` instead.
        Some(i) if looks_structured && !closes_structure(&rest[..i]) => {
            let end = rest.rfind("]\"").or_else(|| rest.rfind("}\""))?;
            Some((&rest[..=end], start + end + 2))
        }
        Some(i) => Some((&rest[..i], start + i + 1)),
        None => None,
    }
}

fn closes_structure(content: &str) -> bool {
    let t = content.trim_end();
    t.ends_with(']') || t.ends_with('}')
}

fn repair_inner_json(content: &str) -> Option<String> {
    let unescaped = serde_json::from_str::<String>(&format!("\"{}\"", content))
        .unwrap_or_else(|_| content.replace("\\\"", "\"").replace("\\\\", "\\"));
    let repaired = INNER_REPAIRS
        .iter()
        .fold(unescaped, |acc, repair| repair(&acc));
    let value: Value = serde_json::from_str(&repaired).ok()?;
    let compact = serde_json::to_string(&value).ok()?;
    serde_json::to_string(&compact).ok()
}

// ============================================================================
// Targeted repairs driven by a parse error
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// `expected ',' or '}'` / `expected ',' or ']'`
    DelimiterExpected,
    /// A property name without quotes
    UnquotedKey,
    /// Valid JSON followed by more text
    TrailingData,
    /// A value that is neither a literal, a number nor a string
    BareValue,
    Other,
}

pub fn classify(err: &serde_json::Error) -> ParseFailure {
    let msg = err.to_string();
    if msg.contains("expected `,` or") {
        ParseFailure::DelimiterExpected
    } else if msg.contains("key must be a string") {
        ParseFailure::UnquotedKey
    } else if msg.contains("trailing characters") {
        ParseFailure::TrailingData
    } else if msg.contains("expected value") || msg.contains("expected ident") {
        ParseFailure::BareValue
    } else {
        ParseFailure::Other
    }
}

/// Byte offset of the character a parse error points at.
pub fn error_offset(text: &str, err: &serde_json::Error) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(err.line().saturating_sub(1))
        .map(str::len)
        .sum();
    let mut offset = (line_start + err.column().saturating_sub(1)).min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// One surgical fix matching the parse error, or `None` when the error kind
/// has no targeted repair.
pub fn targeted_repair(text: &str, err: &serde_json::Error) -> Option<String> {
    match classify(err) {
        ParseFailure::DelimiterExpected => {
            let offset = error_offset(text, err);
            let insert_at = text[..offset].trim_end().len();
            if insert_at == 0 {
                return None;
            }
            let mut fixed = String::with_capacity(text.len() + 1);
            fixed.push_str(&text[..insert_at]);
            fixed.push(',');
            fixed.push_str(&text[insert_at..]);
            Some(fixed)
        }
        ParseFailure::UnquotedKey => {
            let fixed = BARE_KEY_RE.replace_all(text, r#"$1"$2"$3"#).into_owned();
            (fixed != text).then_some(fixed)
        }
        ParseFailure::TrailingData => {
            let offset = error_offset(text, err);
            let head = text[..offset].trim_end();
            (head.ends_with('}') || head.ends_with(']')).then(|| head.to_string())
        }
        ParseFailure::BareValue => {
            let fixed = quote_bare_values(text);
            (fixed != text).then_some(fixed)
        }
        ParseFailure::Other => None,
    }
}

/// Quote bare word values such as `"status": released`. The JSON literals
/// `true`, `false` and `null` are left alone.
pub fn quote_bare_values(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut strings = StringState::default();
    let mut resume = 0;
    for (i, c) in text.char_indices() {
        if i < resume {
            continue;
        }
        out.push(c);
        if strings.step(c) != Lexeme::Structural || c != ':' {
            continue;
        }

        let rest = &text[i + 1..];
        let gap = rest.len() - rest.trim_start().len();
        let value = &rest[gap..];
        if !value.starts_with(|v: char| v.is_alphabetic() || v == '_') {
            continue;
        }
        let end = value
            .find(|v: char| matches!(v, ',' | '}' | ']' | '"' | '\n'))
            .unwrap_or(value.len());
        let word = value[..end].trim_end();
        if matches!(word, "true" | "false" | "null") {
            continue;
        }
        out.push_str(&rest[..gap]);
        out.push('"');
        out.push_str(&word.replace('\\', "\\\\"));
        out.push('"');
        out.push_str(&value[word.len()..end]);
        resume = i + 1 + gap + end;
    }
    out
}

/// When the error sits in the last 10% of an array, cut back to the last
/// complete `}]` (or `},` closed with `]`) and rebalance.
pub fn truncate_near_end(text: &str, err: &serde_json::Error) -> Option<String> {
    let trimmed = text.trim();
    if !trimmed.starts_with('[') || !trimmed.contains("}]") {
        return None;
    }
    let offset = error_offset(text, err);
    if offset * 10 < text.len() * 9 {
        return None;
    }

    let end = trimmed.rfind("}]")? + 2;
    if end < trimmed.len() {
        return Some(balance_brackets(&trimmed[..end]));
    }
    let last_complete = trimmed.rfind("},")?;
    Some(format!("{}]", &trimmed[..=last_complete]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_single_quotes_become_double_quotes() {
        let fixed = normalize_single_quotes("[{'title': 'Alien', 'year': 1979}]");
        assert_eq!(parse(&fixed), serde_json::json!([{"title": "Alien", "year": 1979}]));
    }

    #[test]
    fn test_single_quotes_keep_apostrophes() {
        let fixed = normalize_single_quotes("{'title': 'Schindler's List'}");
        assert_eq!(parse(&fixed)["title"], "Schindler's List");

        let untouched = r#"{"title": "It's Alive"}"#;
        assert_eq!(normalize_single_quotes(untouched), untouched);
    }

    #[test]
    fn test_trailing_commas_are_removed_outside_strings() {
        let fixed = strip_trailing_commas(r#"{"a": [1, 2,], "b": "x,]",}"#);
        assert_eq!(fixed, r#"{"a": [1, 2], "b": "x,]"}"#);
    }

    #[test]
    fn test_adjacent_containers_get_commas() {
        assert_eq!(
            insert_commas_between_containers(r#"{"a":1}{"b":2} [1][2]"#),
            r#"{"a":1},{"b":2}, [1],[2]"#
        );
    }

    #[test]
    fn test_missing_commas_before_keys() {
        let fixed = insert_commas_before_keys("{\"title\": \"A\"\n\"year\": 2020 \"ok\": true \"n\": null}");
        assert_eq!(
            parse(&fixed),
            serde_json::json!({"title": "A", "year": 2020, "ok": true, "n": null})
        );
    }

    #[test]
    fn test_balance_appends_missing_closers() {
        assert_eq!(balance_brackets(r#"[{"a": "x"}, {"b": "y"#), r#"[{"a": "x"}, {"b": "y"}]"#);
        assert_eq!(balance_brackets(r#"[{"a": 1},"#), r#"[{"a": 1}]"#);
        assert_eq!(balance_brackets(r#"{"a":"#), r#"{"a": null}"#);
        assert_eq!(balance_brackets(r#"{"a": "}"}"#), r#"{"a": "}"}"#);
    }

    #[test]
    fn test_wrap_top_level_sequence() {
        assert_eq!(wrap_top_level_sequence(r#"{"a":1},{"b":2}"#), r#"[{"a":1},{"b":2}]"#);
        assert_eq!(wrap_top_level_sequence(r#"{"a":1}"#), r#"{"a":1}"#);
    }

    #[test]
    fn test_nested_json_field_is_repaired() {
        let raw = r#"{"movies_json": "[{\"title\": \"A\"}{\"title\": \"B\",}]"}"#;
        let fixed = repair_nested_json_fields(raw);
        let outer = parse(&fixed);
        let inner: Value = serde_json::from_str(outer["movies_json"].as_str().unwrap()).unwrap();
        assert_eq!(inner, serde_json::json!([{"title": "A"}, {"title": "B"}]));
    }

    #[test]
    fn test_nested_json_field_with_unescaped_quotes() {
        let raw = r#"{"movies_json": "[{"title": "A"} {"title": "B"}]"}"#;
        let fixed = repair_nested_json_fields(raw);
        let outer = parse(&fixed);
        let inner: Value = serde_json::from_str(outer["movies_json"].as_str().unwrap()).unwrap();
        assert_eq!(inner.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_targeted_comma_insertion() {
        let text = r#"{"a": 1 "b": 2}"#;
        let err = serde_json::from_str::<Value>(text).unwrap_err();
        assert_eq!(classify(&err), ParseFailure::DelimiterExpected);
        let fixed = targeted_repair(text, &err).unwrap();
        assert_eq!(parse(&fixed), serde_json::json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_targeted_bare_keys() {
        let text = r#"{title: "A", year: 2001}"#;
        let err = serde_json::from_str::<Value>(text).unwrap_err();
        assert_eq!(classify(&err), ParseFailure::UnquotedKey);
        let fixed = targeted_repair(text, &err).unwrap();
        assert_eq!(parse(&fixed), serde_json::json!({"title": "A", "year": 2001}));
    }

    #[test]
    fn test_targeted_trailing_data_truncation() {
        let text = r#"[{"title": "A"}] Hope this helps!"#;
        let err = serde_json::from_str::<Value>(text).unwrap_err();
        assert_eq!(classify(&err), ParseFailure::TrailingData);
        let fixed = targeted_repair(text, &err).unwrap();
        assert_eq!(fixed, r#"[{"title": "A"}]"#);
    }

    #[test]
    fn test_single_quoted_value_followed_by_key_without_comma() {
        let fixed = normalize_single_quotes("[{'title': 'A' 'year': 2001}]");
        assert_eq!(fixed, r#"[{"title": "A" "year": 2001}]"#);
        assert_eq!(
            parse(&pre_repair("[{'title': 'A' 'year': 2001}]")),
            serde_json::json!([{"title": "A", "year": 2001}])
        );
    }

    #[test]
    fn test_python_literals_outside_strings() {
        let fixed = normalize_python_literals(r#"[{"title": "None Shall Pass", "adult": False, "rating": None, "ok": True}]"#);
        assert_eq!(
            parse(&fixed),
            serde_json::json!([{"title": "None Shall Pass", "adult": false, "rating": null, "ok": true}])
        );
        assert_eq!(normalize_python_literals(r#"{"NoneType": 1}"#), r#"{"NoneType": 1}"#);
    }

    #[test]
    fn test_targeted_bare_values_are_quoted() {
        let text = r#"[{"title": "A", "status": released, "adult": false}]"#;
        let err = serde_json::from_str::<Value>(text).unwrap_err();
        assert_eq!(classify(&err), ParseFailure::BareValue);
        let fixed = targeted_repair(text, &err).unwrap();
        assert_eq!(
            parse(&fixed),
            serde_json::json!([{"title": "A", "status": "released", "adult": false}])
        );

        let nothing_to_quote = r#"{"a": }"#;
        let err = serde_json::from_str::<Value>(nothing_to_quote).unwrap_err();
        assert_eq!(targeted_repair(nothing_to_quote, &err), None);
    }

    #[test]
    fn test_near_end_truncation_keeps_complete_records() {
        let text = r#"[{"title":"A","url":"https://x/1"},{"title":"B","ur"}]"#;
        let err = serde_json::from_str::<Value>(text).unwrap_err();
        let cut = truncate_near_end(text, &err).unwrap();
        assert_eq!(parse(&cut), serde_json::json!([{"title": "A", "url": "https://x/1"}]));
    }
}
