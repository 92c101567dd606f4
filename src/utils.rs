// src/utils.rs
use std::ops::RangeInclusive;

use rand::Rng;
use tokio::time::{sleep, Duration};

/// Collapse whitespace and strip blank lines from scraped text.
pub fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a string for fuzzy label/option comparison.
pub fn matching_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Interpret a resolved value as a checkbox target state.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "yes" | "1")
}

/// Sleep for a random duration inside the given millisecond range.
pub async fn humanized_delay(range: RangeInclusive<u64>) {
    let ms = rand::thread_rng().gen_range(range);
    sleep(Duration::from_millis(ms)).await;
}

/// Escape a string for embedding inside a JS expression as a quoted literal.
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Hello \n\n  world  "), "Hello world");
        assert_eq!(clean_text("one\ntwo\n  three"), "one two three");
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("true"));
        assert!(is_truthy("Yes"));
        assert!(is_truthy(" 1 "));
        assert!(!is_truthy("no"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn test_matching_key() {
        assert_eq!(matching_key("  United States "), "united states");
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"he said "hi""#), r#""he said \"hi\"""#);
    }
}
