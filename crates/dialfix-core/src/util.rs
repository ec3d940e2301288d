//! Shared utility functions used across multiple modules.

use std::hash::{Hash, Hasher};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    truncate_chars(value, 180)
}

/// Trim and cut text to at most `max_chars` characters.
///
/// Counts characters, not bytes, so multi-byte text is never split.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    value
        .replace('\n', " ")
        .trim()
        .chars()
        .take(max_chars)
        .collect()
}

/// Stable, non-reversible tag for a user identity in log output.
pub fn user_fingerprint(user: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" +14155550100 ".to_string())),
            Some("+14155550100".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://people.googleapis.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn truncate_chars_counts_characters() {
        let long = "é".repeat(150);
        let truncated = truncate_chars(&long, 100);
        assert_eq!(truncated.chars().count(), 100);
    }

    #[test]
    fn truncate_chars_flattens_newlines() {
        assert_eq!(truncate_chars("  line one\nline two ", 100), "line one line two");
    }

    #[test]
    fn user_fingerprint_is_stable() {
        assert_eq!(user_fingerprint("a@example.com"), user_fingerprint("a@example.com"));
        assert_ne!(user_fingerprint("a@example.com"), user_fingerprint("b@example.com"));
    }
}
