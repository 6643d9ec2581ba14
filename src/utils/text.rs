// file: src/utils/text.rs
// description: token estimation and char-boundary safe truncation helpers
// reference: 4 characters per token heuristic

/// Rough characters-per-token ratio used for every budget in the crate.
pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Keeps the head of `text` so that its estimate is at most `max_tokens`.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// First `max_chars` characters with collapsed whitespace.
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &collapsed[..byte_idx]),
        None => collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("日本語の"), 1);
    }

    #[test]
    fn test_truncate_fits_budget() {
        let text = "x".repeat(100);
        let truncated = truncate_to_tokens(&text, 10);
        assert_eq!(truncated.len(), 40);
        assert_eq!(estimate_tokens(truncated), 10);
        assert_eq!(truncate_to_tokens("short", 10), "short");
    }

    #[test]
    fn test_truncate_multibyte() {
        let text = "é".repeat(10);
        assert_eq!(truncate_to_tokens(&text, 1).chars().count(), 4);
    }

    #[test]
    fn test_preview_collapses_whitespace() {
        assert_eq!(preview("a\n\nb   c", 200), "a b c");
        assert_eq!(preview("hello world", 5), "hello...");
    }
}
