pub mod hash;

/// Cut `text` to at most `max_chars` characters for logging, appending `...`
/// when something was dropped. Never splits a UTF-8 sequence.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_text_is_untouched() {
        assert_eq!(preview("abc", 10), "abc");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let text = "ééééé";
        assert_eq!(preview(text, 2), "éé...");
    }
}
