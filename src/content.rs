//! Structured content extraction for assistant output.
//!
//! Agent responses sometimes append a trailing JSON object after free text,
//! e.g. `{"type":"response","content":"..."}`. The whole message is rarely
//! valid JSON, so the extractor scans for the shortest trailing span that
//! parses and rewrites only that suffix for display.

use serde_json::Value;

/// Reformat assistant content for display.
///
/// Applies only to assistant-role turns; other roles pass through untouched
/// at the call site.
pub fn format_assistant_content(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return content.to_string();
    }

    let Some((json, index)) = extract_trailing_json(trimmed) else {
        return content.to_string();
    };
    let prefix = trimmed[..index].trim_end();

    if let Value::Object(obj) = &json {
        if obj.get("type").and_then(Value::as_str) == Some("response") {
            if let Some(text) = obj.get("content").and_then(Value::as_str) {
                return join_with_prefix(prefix, text);
            }
        }

        if obj.get("type").and_then(Value::as_str) == Some("tool_call") {
            let tool = obj
                .get("tool")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .unwrap_or("tool");
            return join_with_prefix(prefix, &format!("Running {tool}…"));
        }
    }

    // Parsed but unrecognized shape: leave the original alone.
    content.to_string()
}

/// Find the last `{` whose suffix parses as JSON.
///
/// Scanning starts at the rightmost `{` and moves left, so the first hit is
/// the shortest trailing JSON span. Returns the parsed value and the byte
/// offset of the span within `trimmed`.
fn extract_trailing_json(trimmed: &str) -> Option<(Value, usize)> {
    let mut search_end = trimmed.len();
    while let Some(index) = trimmed[..search_end].rfind('{') {
        if let Ok(json) = serde_json::from_str::<Value>(&trimmed[index..]) {
            return Some((json, index));
        }
        search_end = index;
    }
    None
}

fn join_with_prefix(prefix: &str, text: &str) -> String {
    if prefix.is_empty() {
        text.to_string()
    } else {
        format!("{prefix}\n\n{text}")
    }
}
