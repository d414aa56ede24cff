//! UTF-8-safe truncation helpers.
//!
//! Trace summaries and error previews truncate text by character count.
//! Byte slicing can panic when the cut falls inside a multi-byte character,
//! so truncation is centralized here.

/// Truncate by characters and append `suffix` when truncation occurs.
pub fn truncate_with_suffix_by_chars(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{prefix}{suffix}")
}

/// Trim and truncate a one-line summary to `limit` characters, ending with an
/// ellipsis marker when longer. The marker counts against the limit.
pub fn truncate_summary(value: &str, limit: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    truncate_with_suffix_by_chars(trimmed, limit.saturating_sub(1), "…")
}
