//! Data model for the conversation engine.
//!
//! Covers both the wire shapes exchanged with the agent backend (chat
//! request/response, streamed events) and the engine-owned transcript types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Transcript roles
// ---------------------------------------------------------------------------

/// Author role for a transcript turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// End-user prompt.
    User,
    /// Agent answer (structured-content formatting applies to this role only).
    Assistant,
    /// Visible failure scoped to one prompt.
    SystemError,
    /// Actionable privileged-action request awaiting a decision.
    ApprovalRequest,
}

// ---------------------------------------------------------------------------
// Agent events
// ---------------------------------------------------------------------------

/// Source tag of an [`AgentEvent`], kept on trace entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AssistantMessage,
    ToolCall,
    ToolResult,
    Thought,
    SystemNotice,
}

/// Untyped content plus optional metadata carried by every event tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventPayload {
    /// Event content; shape depends on the tag, so it stays untyped here.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
    /// Optional metadata mapping (tool names, approval markers, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

/// One event reported by the agent, over either channel.
///
/// Closed tagged union: frames with an unrecognized `type` fail to
/// deserialize and are rejected at the channel boundary instead of being
/// propagated into the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AssistantMessage(EventPayload),
    ToolCall(EventPayload),
    ToolResult(EventPayload),
    Thought(EventPayload),
    SystemNotice(EventPayload),
}

impl AgentEvent {
    /// The tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AssistantMessage(_) => EventKind::AssistantMessage,
            Self::ToolCall(_) => EventKind::ToolCall,
            Self::ToolResult(_) => EventKind::ToolResult,
            Self::Thought(_) => EventKind::Thought,
            Self::SystemNotice(_) => EventKind::SystemNotice,
        }
    }

    /// Content + metadata regardless of tag.
    pub fn payload(&self) -> &EventPayload {
        match self {
            Self::AssistantMessage(p)
            | Self::ToolCall(p)
            | Self::ToolResult(p)
            | Self::Thought(p)
            | Self::SystemNotice(p) => p,
        }
    }

    /// Coerce the content payload into display text.
    ///
    /// Strings pass through, null/absent becomes empty, objects are
    /// pretty-printed so a structured payload stays inspectable.
    pub fn text_content(&self) -> String {
        match &self.payload().content {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other @ (Value::Object(_) | Value::Array(_)) => {
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
            }
            other => other.to_string(),
        }
    }

    /// Look up a string metadata field.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.payload()
            .metadata
            .as_ref()
            .and_then(|meta| meta.get(key))
            .and_then(Value::as_str)
    }

    /// True for a `system_notice` whose metadata marks it as an approval
    /// request.
    pub fn is_approval_request(&self) -> bool {
        matches!(self, Self::SystemNotice(_))
            && self
                .payload()
                .metadata
                .as_ref()
                .and_then(|meta| meta.get("requires_approval"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// Best-effort tool label for tool events.
    ///
    /// `tool_call` events carry the name in their content; `tool_result`
    /// events carry it under `metadata.tool`.
    pub fn tool_name(&self) -> Option<String> {
        if matches!(self, Self::ToolCall(_)) {
            if let Value::String(content) = &self.payload().content {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        self.metadata_str("tool")
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

/// One frame from the push channel: an event plus the session it belongs to.
///
/// `session_id` exists purely for filtering; it is stripped before the event
/// reaches the reconciliation engine.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub event: AgentEvent,
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// One entry in the ephemeral reasoning trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEntry {
    /// Opaque entry id.
    pub id: String,
    /// Tag of the event this entry summarizes.
    pub kind: EventKind,
    /// One-line human-readable summary.
    pub summary: String,
    /// Capture time in unix milliseconds.
    pub timestamp_unix_ms: u64,
}

/// One entry in the visible conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Opaque turn id.
    pub id: String,
    pub role: Role,
    /// Display content (assistant content may be reformatted).
    pub content: String,
    /// Creation time in unix milliseconds.
    pub timestamp_unix_ms: u64,
    /// Trace captured while producing this turn. Immutable once attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TraceEntry>>,
    /// Approval details; only present on approval-request turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<PendingApproval>,
}

// ---------------------------------------------------------------------------
// Approvals
// ---------------------------------------------------------------------------

/// The single outstanding privileged-action request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingApproval {
    /// Server-issued approval id, used to route the decision back.
    pub id: String,
    /// Target action name.
    pub action: String,
    /// Argument mapping for the action.
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
    /// Server-side risk classification, when provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
}

impl PendingApproval {
    /// Build a pending approval from an approval-class event.
    ///
    /// Returns `None` unless the event is marked `requires_approval` and
    /// carries an `approval_id`; without an id there is nothing to respond to.
    pub fn from_event(event: &AgentEvent) -> Option<Self> {
        if !event.is_approval_request() {
            return None;
        }
        let meta = event.payload().metadata.as_ref()?;
        let id = meta.get("approval_id").and_then(Value::as_str)?;
        let action = meta
            .get("action")
            .or_else(|| meta.get("tool"))
            .and_then(Value::as_str)
            .unwrap_or("action");
        let args = meta
            .get("args")
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let risk = meta.get("risk").and_then(Value::as_str).map(str::to_string);
        Some(Self {
            id: id.to_string(),
            action: action.to_string(),
            args,
            risk,
        })
    }
}

/// Persistence scope sent alongside an approval decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalScope {
    Once,
    Session,
    Always,
}

/// Body for `POST /approvals/<id>/respond`.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalReply {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember: Option<ApprovalScope>,
}

// ---------------------------------------------------------------------------
// Chat call
// ---------------------------------------------------------------------------

/// Body for `POST /chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub prompt: String,
    pub session_id: String,
}

/// Response body from `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Authoritative session id; differing from the active one forces a
    /// session handoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Batched events produced while answering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<AgentEvent>,
    /// Final answer summary.
    #[serde(rename = "final", skip_serializing_if = "Option::is_none")]
    pub final_message: Option<String>,
    /// Legacy alias some backends use instead of `final`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Unmodeled body fields, preserved for the debug fallback turn.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ChatResponse {
    /// The final answer text, preferring `final` over the `response` alias.
    pub fn final_text(&self) -> Option<&str> {
        self.final_message.as_deref().or(self.response.as_deref())
    }
}

/// Structured payload under `detail` on a 429 response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RateLimitDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Current wall-clock unix time in milliseconds.
pub(crate) fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Verifies the tagged union accepts every documented event tag.
    #[test]
    fn deserialize_known_event_tags() {
        for tag in [
            "assistant_message",
            "tool_call",
            "tool_result",
            "thought",
            "system_notice",
        ] {
            let raw = format!(r#"{{"type":"{tag}","content":"x"}}"#);
            let event: AgentEvent = serde_json::from_str(&raw).expect("known tag");
            assert_eq!(event.text_content(), "x");
        }
    }

    // Unknown tags must be rejected at the boundary, not propagated.
    #[test]
    fn deserialize_rejects_unknown_event_tag() {
        let raw = r#"{"type":"telemetry","content":"x"}"#;
        assert!(serde_json::from_str::<AgentEvent>(raw).is_err());
        assert!(serde_json::from_str::<StreamFrame>(raw).is_err());
    }

    #[test]
    fn stream_frame_splits_session_id_from_event() {
        let raw = r#"{"type":"thought","content":"hm","session_id":"abcd-1234"}"#;
        let frame: StreamFrame = serde_json::from_str(raw).expect("frame");
        assert_eq!(frame.session_id.as_deref(), Some("abcd-1234"));
        assert_eq!(frame.event.kind(), EventKind::Thought);
    }

    #[test]
    fn text_content_coerces_shapes() {
        let string: AgentEvent =
            serde_json::from_value(json!({"type": "thought", "content": "plain"})).unwrap();
        assert_eq!(string.text_content(), "plain");

        let absent: AgentEvent = serde_json::from_value(json!({"type": "thought"})).unwrap();
        assert_eq!(absent.text_content(), "");

        let object: AgentEvent =
            serde_json::from_value(json!({"type": "thought", "content": {"step": 1}})).unwrap();
        assert!(object.text_content().contains("\"step\": 1"));

        let number: AgentEvent =
            serde_json::from_value(json!({"type": "thought", "content": 7})).unwrap();
        assert_eq!(number.text_content(), "7");
    }

    #[test]
    fn tool_name_prefers_tool_call_content() {
        let call: AgentEvent = serde_json::from_value(json!({
            "type": "tool_call",
            "content": " search ",
            "metadata": {"tool": "other"}
        }))
        .unwrap();
        assert_eq!(call.tool_name().as_deref(), Some("search"));

        let result: AgentEvent = serde_json::from_value(json!({
            "type": "tool_result",
            "content": "done",
            "metadata": {"tool": "search"}
        }))
        .unwrap();
        assert_eq!(result.tool_name().as_deref(), Some("search"));

        let bare: AgentEvent =
            serde_json::from_value(json!({"type": "tool_result", "content": "done"})).unwrap();
        assert_eq!(bare.tool_name(), None);
    }

    // Approval detection requires both the marker and a routable id.
    #[test]
    fn pending_approval_from_event() {
        let event: AgentEvent = serde_json::from_value(json!({
            "type": "system_notice",
            "content": "wants to run a command",
            "metadata": {
                "requires_approval": true,
                "approval_id": "appr-1",
                "action": "run_shell",
                "args": {"command": "ls"},
                "risk": "medium"
            }
        }))
        .unwrap();
        assert!(event.is_approval_request());
        let pending = PendingApproval::from_event(&event).expect("approval");
        assert_eq!(pending.id, "appr-1");
        assert_eq!(pending.action, "run_shell");
        assert_eq!(pending.args.get("command"), Some(&json!("ls")));
        assert_eq!(pending.risk.as_deref(), Some("medium"));
    }

    #[test]
    fn pending_approval_requires_id() {
        let event: AgentEvent = serde_json::from_value(json!({
            "type": "system_notice",
            "content": "wants something",
            "metadata": {"requires_approval": true}
        }))
        .unwrap();
        assert!(event.is_approval_request());
        assert!(PendingApproval::from_event(&event).is_none());
    }

    #[test]
    fn plain_notice_is_not_approval() {
        let event: AgentEvent = serde_json::from_value(json!({
            "type": "system_notice",
            "content": "connected"
        }))
        .unwrap();
        assert!(!event.is_approval_request());
    }

    // Verifies both `final` and the `response` alias deserialize.
    #[test]
    fn chat_response_final_text_fallback() {
        let with_final: ChatResponse = serde_json::from_str(
            r#"{"session_id":"s1","events":[],"final":"done","response":"older"}"#,
        )
        .unwrap();
        assert_eq!(with_final.final_text(), Some("done"));

        let alias_only: ChatResponse =
            serde_json::from_str(r#"{"response":"fallback"}"#).unwrap();
        assert_eq!(alias_only.final_text(), Some("fallback"));

        let neither: ChatResponse = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert_eq!(neither.final_text(), None);
        assert!(neither.extra.contains_key("status"));
    }

    #[test]
    fn approval_reply_omits_absent_scope() {
        let reply = ApprovalReply {
            approved: true,
            remember: None,
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json, json!({"approved": true}));

        let scoped = ApprovalReply {
            approved: false,
            remember: Some(ApprovalScope::Session),
        };
        let json = serde_json::to_value(&scoped).unwrap();
        assert_eq!(json, json!({"approved": false, "remember": "session"}));
    }
}
