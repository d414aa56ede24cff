//! Shared helpers for unit tests: compact builders for events and frames.

use crate::types::{AgentEvent, ChatResponse};
use serde_json::json;

/// Build a tagged agent event with plain string content.
pub fn event(tag: &str, content: &str) -> AgentEvent {
    serde_json::from_value(json!({"type": tag, "content": content}))
        .expect("valid tagged event")
}

/// Build an approval-class system notice carrying routing metadata.
pub fn approval_event(approval_id: &str, action: &str) -> AgentEvent {
    serde_json::from_value(json!({
        "type": "system_notice",
        "content": format!("Agent requests approval to {action}"),
        "metadata": {
            "requires_approval": true,
            "approval_id": approval_id,
            "action": action,
            "args": {"target": "demo"},
            "risk": "medium"
        }
    }))
    .expect("valid approval event")
}

/// Deserialize a response body from inline JSON.
pub fn response(body: serde_json::Value) -> ChatResponse {
    serde_json::from_value(body).expect("valid response body")
}
