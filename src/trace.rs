//! Trace accumulation: the live reasoning/activity log built while a prompt
//! is in flight.
//!
//! The live trace is ephemeral. A sentinel placeholder proves to the
//! presentation layer that "something is happening" before the first real
//! event lands, and must never survive into user-visible content. Ownership
//! of entries transfers to a transcript turn by copy at attachment time, so
//! the live list can be cleared independently afterwards.

use crate::session::generate_id;
use crate::textutil::truncate_summary;
use crate::types::{now_unix_millis, AgentEvent, EventKind, TraceEntry};

/// Sentinel summary occupying position zero while a prompt is in flight.
pub const TRACE_PLACEHOLDER_SUMMARY: &str = "Waiting for response…";

/// Character cap for system-notice summaries. Thoughts are never truncated;
/// they are the primary reasoning signal the user wants to inspect in full.
const NOTICE_SUMMARY_LIMIT: usize = 200;

/// Policy knob for tool events in the trace.
///
/// The default hides `tool_call`/`tool_result` from the trace view; they are
/// surfaced through other means. The summarizing behavior of the richer
/// variant is available by opting in rather than silently dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracePolicy {
    pub include_tool_events: bool,
}

/// The live, unattached trace list plus the panel expansion flag.
#[derive(Debug, Default)]
pub struct TraceLog {
    entries: Vec<TraceEntry>,
    expanded: bool,
}

impl TraceLog {
    /// Clear the live trace; optionally force the panel closed.
    pub fn reset(&mut self, collapse: bool) {
        self.entries.clear();
        if collapse {
            self.expanded = false;
        }
    }

    /// Unconditionally push the sentinel entry.
    pub fn seed_placeholder(&mut self) {
        self.entries.push(TraceEntry {
            id: generate_id(),
            kind: EventKind::SystemNotice,
            summary: TRACE_PLACEHOLDER_SUMMARY.to_string(),
            timestamp_unix_ms: now_unix_millis(),
        });
    }

    /// Remove the sentinel when it occupies position zero. Idempotent.
    pub fn remove_placeholder(&mut self) {
        if self
            .entries
            .first()
            .is_some_and(|entry| entry.summary == TRACE_PLACEHOLDER_SUMMARY)
        {
            self.entries.remove(0);
        }
    }

    /// Append a real entry and return a copy for per-batch collection.
    pub fn record(&mut self, kind: EventKind, summary: impl Into<String>) -> TraceEntry {
        let entry = TraceEntry {
            id: generate_id(),
            kind,
            summary: summary.into(),
            timestamp_unix_ms: now_unix_millis(),
        };
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Copy of the live trace for attachment to a turn, `None` when empty.
    pub fn snapshot(&self) -> Option<Vec<TraceEntry>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.clone())
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn toggle_expanded(&mut self) {
        self.expanded = !self.expanded;
    }

    pub fn expand(&mut self) {
        self.expanded = true;
    }

    pub fn collapse(&mut self) {
        self.expanded = false;
    }
}

/// Derive the one-line trace summary for an event, `None` when the event
/// produces no trace entry.
pub fn summarise_event(event: &AgentEvent, policy: TracePolicy) -> Option<String> {
    match event.kind() {
        // Assistant messages become turns directly, never trace items.
        EventKind::AssistantMessage => None,
        EventKind::Thought => {
            let content = event.text_content();
            if content.is_empty() {
                Some("Thinking…".to_string())
            } else {
                Some(content)
            }
        }
        EventKind::ToolCall => policy.include_tool_events.then(|| {
            let tool = event.tool_name().unwrap_or_else(|| "tool".to_string());
            format!("Invoked {tool}")
        }),
        EventKind::ToolResult => policy.include_tool_events.then(|| match event.tool_name() {
            Some(tool) => format!("{tool} completed"),
            None => "Tool completed".to_string(),
        }),
        EventKind::SystemNotice => {
            let content = truncate_summary(&event.text_content(), NOTICE_SUMMARY_LIMIT);
            if content.is_empty() {
                Some("System notice".to_string())
            } else {
                Some(content)
            }
        }
    }
}
