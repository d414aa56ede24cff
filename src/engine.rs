//! Event reconciliation engine, transcript store, and approval handshake.
//!
//! Two sources report the same logical work: the chat call's response body
//! and the push channel's frames. The server may both stream incremental
//! events and return a final summary, so the engine must never show the same
//! answer twice while never losing an answer that only arrives via one path.
//! [`Conversation`] is the session-scoped state machine for that
//! reconciliation; [`ChatEngine`] drives it against a transport and the
//! inbound frame queue.

use crate::api::{ChatTransport, HttpTransport};
use crate::config::EngineConfig;
use crate::content::format_assistant_content;
use crate::error::ApiError;
use crate::push::PushChannel;
use crate::session::{generate_id, Session};
use crate::textutil::truncate_summary;
use crate::trace::{summarise_event, TraceLog, TracePolicy};
use crate::types::{
    now_unix_millis, AgentEvent, ApprovalReply, ApprovalScope, ChatRequest, ChatResponse,
    ConversationTurn, EventKind, PendingApproval, RateLimitDetail, Role, StreamFrame, TraceEntry,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Panel width bounds consumed by the layout collaborator.
pub const DEFAULT_PANEL_WIDTH: u32 = 360;
pub const MIN_PANEL_WIDTH: u32 = 280;
pub const MAX_PANEL_WIDTH: u32 = 520;

/// Grace period for the push channel to establish before a prompt is sent.
const STREAM_WARMUP_DELAY: Duration = Duration::from_millis(150);
/// Wait before the post-approval refresh so server-side effects can land.
const WORKSPACE_REFRESH_DELAY: Duration = Duration::from_secs(1);

/// Workspace-refresh collaborator: idempotent, asynchronous, best-effort.
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn refresh(&self) -> Result<(), String>;
}

/// Layout-dimension collaborator fed clamped panel widths.
pub trait LayoutSink: Send + Sync {
    fn set_panel_width(&self, width: u32);
}

/// Outcome of a submit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The prompt was sent; transcript and trace reflect the exchange.
    Sent,
    /// Blank draft or a prompt already in flight; nothing happened.
    Ignored,
}

// ---------------------------------------------------------------------------
// Conversation: session-scoped reconciliation state
// ---------------------------------------------------------------------------

/// Transcript, live trace, and approval state for one conversation.
///
/// Pure state machine: no I/O, every transition is a synchronous method, so
/// arbitrary channel interleavings are testable by feeding synthetic batches.
#[derive(Debug)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
    trace: TraceLog,
    pending_approval: Option<PendingApproval>,
    error: Option<String>,
    rate_limit: Option<RateLimitDetail>,
    panel_width: u32,
    policy: TracePolicy,
}

impl Conversation {
    pub fn new(policy: TracePolicy) -> Self {
        Self {
            turns: Vec::new(),
            trace: TraceLog::default(),
            pending_approval: None,
            error: None,
            rate_limit: None,
            panel_width: DEFAULT_PANEL_WIDTH,
            policy,
        }
    }

    /// The ordered transcript, read-only.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    pub fn trace_mut(&mut self) -> &mut TraceLog {
        &mut self.trace
    }

    pub fn pending_approval(&self) -> Option<&PendingApproval> {
        self.pending_approval.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn rate_limit(&self) -> Option<&RateLimitDetail> {
        self.rate_limit.as_ref()
    }

    pub fn clear_rate_limit(&mut self) {
        self.rate_limit = None;
    }

    pub fn panel_width(&self) -> u32 {
        self.panel_width
    }

    /// Clamp and store the panel width, returning the effective value.
    pub fn update_width(&mut self, width: u32) -> u32 {
        self.panel_width = width.clamp(MIN_PANEL_WIDTH, MAX_PANEL_WIDTH);
        self.panel_width
    }

    /// Reconcile one batch of events from either channel.
    ///
    /// `final_message` is only ever supplied on the response-call path.
    /// Returns true when an assistant turn was appended.
    pub fn handle_agent_events(
        &mut self,
        events: &[AgentEvent],
        final_message: Option<&str>,
    ) -> bool {
        self.trace.remove_placeholder();
        let mut assistant_content: Option<String> = None;
        let mut collected: Vec<TraceEntry> = Vec::new();

        for event in events {
            if event.kind() == EventKind::AssistantMessage {
                let content = event.text_content();
                // Last one wins when several arrive in a batch.
                if !content.is_empty() {
                    assistant_content = Some(content);
                }
                continue;
            }

            if event.is_approval_request() {
                if let Some(pending) = PendingApproval::from_event(event) {
                    self.push_approval_turn(event, pending);
                    continue;
                }
                // Marked but unroutable without an id; keep it as a notice.
                warn!("approval-class event without approval_id; tracing as notice");
            }

            if let Some(summary) = summarise_event(event, self.policy) {
                let entry = self.trace.record(event.kind(), summary);
                collected.push(entry);
            }
        }

        let collected = (!collected.is_empty()).then_some(collected);
        if let Some(content) = assistant_content {
            self.append_turn(Role::Assistant, &content, collected, None);
            return true;
        }
        if let Some(final_message) = final_message.filter(|text| !text.is_empty()) {
            self.append_turn(Role::Assistant, final_message, collected, None);
            return true;
        }
        if events.is_empty() {
            // Degenerate zero-event case: nothing arrived, nothing will.
            self.trace.remove_placeholder();
        }
        false
    }

    /// Fold the settled response body into the transcript.
    ///
    /// `stream_seen` selects between the authoritative no-stream path and the
    /// confirmation-only path where the body may only add a differing final.
    pub fn apply_response(&mut self, body: &ChatResponse, stream_seen: bool) {
        if !stream_seen {
            let has_final = body.final_text().is_some_and(|text| !text.is_empty());
            if !body.events.is_empty() || has_final {
                self.handle_agent_events(&body.events, body.final_text());
            } else {
                // Nothing recognizable in the body; surface it raw rather
                // than dropping the exchange on the floor.
                let raw = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
                self.append_turn(Role::Assistant, &raw, None, None);
                self.trace.remove_placeholder();
            }
            return;
        }

        if let Some(final_text) = body.final_text() {
            let normalized = final_text.trim();
            let duplicate = self
                .last_assistant_content()
                .is_some_and(|content| content.trim() == normalized);
            if !normalized.is_empty() && !duplicate {
                let attached = self.trace.snapshot();
                self.append_turn(Role::Assistant, final_text, attached, None);
                self.trace.reset(false);
            }
        }
        self.trace.remove_placeholder();
    }

    /// Record a failed exchange: visible error turn plus a trace entry.
    pub fn record_failure(&mut self, message: &str) {
        self.error = Some(message.to_string());
        self.append_turn(Role::SystemError, message, None, None);
        self.trace.remove_placeholder();
        let summary = truncate_summary(&format!("Error: {message}"), 200);
        self.trace.record(EventKind::SystemNotice, summary);
    }

    pub fn set_rate_limit(&mut self, detail: RateLimitDetail) {
        self.rate_limit = Some(detail);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Append the user's prompt turn.
    pub fn append_user_turn(&mut self, text: &str) {
        self.append_turn(Role::User, text, None, None);
    }

    /// Drop the pending approval without responding.
    pub fn clear_pending_approval(&mut self) {
        self.pending_approval = None;
    }

    /// Delete the approval turn matching `approval_id` from the transcript.
    pub fn remove_approval_turn(&mut self, approval_id: &str) {
        self.turns.retain(|turn| {
            turn.approval
                .as_ref()
                .map(|approval| approval.id.as_str())
                != Some(approval_id)
        });
    }

    /// Empty the transcript and reset per-conversation state.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.error = None;
        self.rate_limit = None;
        self.pending_approval = None;
        self.trace.reset(true);
    }

    fn push_approval_turn(&mut self, event: &AgentEvent, pending: PendingApproval) {
        let content = {
            let text = event.text_content();
            if text.is_empty() {
                format!("Approval required: {}", pending.action)
            } else {
                text
            }
        };
        self.append_turn(
            Role::ApprovalRequest,
            &content,
            None,
            Some(pending.clone()),
        );
        // Single outstanding slot; a new request replaces any prior one.
        self.pending_approval = Some(pending);
    }

    fn append_turn(
        &mut self,
        role: Role,
        content: &str,
        trace: Option<Vec<TraceEntry>>,
        approval: Option<PendingApproval>,
    ) {
        let content = if role == Role::Assistant {
            format_assistant_content(content)
        } else {
            content.to_string()
        };
        self.turns.push(ConversationTurn {
            id: generate_id(),
            role,
            content,
            timestamp_unix_ms: now_unix_millis(),
            trace,
            approval,
        });
    }

    fn last_assistant_content(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant)
            .map(|turn| turn.content.as_str())
    }
}

// ---------------------------------------------------------------------------
// ChatEngine: async driver
// ---------------------------------------------------------------------------

/// The conversation engine: owns the session, the inbound frame queue, and
/// the transport, and runs the submit/reconcile loop.
pub struct ChatEngine {
    config: EngineConfig,
    transport: Arc<dyn ChatTransport>,
    http: reqwest::Client,
    conversation: Conversation,
    session: Option<Session>,
    frame_tx: mpsc::UnboundedSender<StreamFrame>,
    frame_rx: mpsc::UnboundedReceiver<StreamFrame>,
    sending: bool,
    workspace: Option<Arc<dyn Workspace>>,
    layout: Option<Arc<dyn LayoutSink>>,
}

impl ChatEngine {
    /// Build an engine over the production HTTP transport.
    pub fn new(config: EngineConfig) -> Self {
        let transport = HttpTransport::new();
        let http = transport.http_client();
        Self::build(config, Arc::new(transport), http)
    }

    /// Build an engine over a caller-supplied transport (tests, embedding).
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self::build(config, transport, reqwest::Client::new())
    }

    fn build(config: EngineConfig, transport: Arc<dyn ChatTransport>, http: reqwest::Client) -> Self {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let policy = config.trace;
        Self {
            config,
            transport,
            http,
            conversation: Conversation::new(policy),
            session: None,
            frame_tx,
            frame_rx,
            sending: false,
            workspace: None,
            layout: None,
        }
    }

    pub fn set_workspace(&mut self, workspace: Arc<dyn Workspace>) {
        self.workspace = Some(workspace);
    }

    pub fn set_layout_sink(&mut self, layout: Arc<dyn LayoutSink>) {
        self.layout = Some(layout);
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Resolved configuration, including the key-generation URL frontends
    /// surface when prompting for an API key.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        self.conversation.turns()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(Session::id)
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// True when a draft would actually be sent.
    pub fn can_submit(&self, draft: &str) -> bool {
        !draft.trim().is_empty() && !self.sending
    }

    /// Handle to the inbound frame queue.
    ///
    /// The push channel feeds this; tests inject synthetic frame sequences
    /// through it to exercise interleavings without a network.
    pub fn frame_sender(&self) -> mpsc::UnboundedSender<StreamFrame> {
        self.frame_tx.clone()
    }

    /// Ensure a live session: create one if absent, reopen a missing channel.
    pub fn ensure_session(&mut self) {
        match &self.session {
            None => self.start_new_session(),
            Some(session) if !session.has_channel() => self.connect_push_channel(),
            Some(_) => {}
        }
    }

    /// Tear down the current push channel and allocate a fresh identifier.
    pub fn start_new_session(&mut self) {
        if let Some(mut stale) = self.session.take() {
            stale.disconnect();
        }
        self.session = Some(Session::new());
        self.connect_push_channel();
    }

    /// Install a user API key and reconnect the channel under the new auth.
    pub fn set_user_key(&mut self, key: impl Into<String>) {
        self.config.user_key = Some(key.into());
        if self.session.is_some() {
            self.connect_push_channel();
        }
    }

    pub fn clear_user_key(&mut self) {
        self.config.user_key = None;
        if self.session.is_some() {
            self.connect_push_channel();
        }
    }

    /// Clamp and apply the panel width, notifying the layout collaborator.
    pub fn update_width(&mut self, width: u32) -> u32 {
        let clamped = self.conversation.update_width(width);
        if let Some(layout) = &self.layout {
            layout.set_panel_width(clamped);
        }
        clamped
    }

    /// Empty the transcript, clear errors, and start over with a new session.
    pub fn clear_conversation(&mut self) {
        self.conversation.clear();
        self.start_new_session();
    }

    /// Submit one prompt and reconcile both channels until the call settles.
    ///
    /// Failures are recorded into the transcript rather than returned; the
    /// engine stays usable for the next interaction.
    pub async fn submit(&mut self, draft: &str) -> SubmitOutcome {
        let text = draft.trim().to_string();
        if text.is_empty() || self.sending {
            return SubmitOutcome::Ignored;
        }

        self.ensure_session();
        // Give a just-opened push channel a moment to establish before the
        // prompt reaches the server and starts producing frames.
        tokio::time::sleep(STREAM_WARMUP_DELAY).await;

        self.conversation.append_user_turn(&text);
        self.conversation.clear_error();
        let expanded = self.conversation.trace().is_expanded();
        self.conversation.trace_mut().reset(!expanded);
        if let Some(session) = self.session.as_mut() {
            session.clear_stream_seen();
        }
        self.conversation.trace_mut().seed_placeholder();
        self.drain_stale_frames();

        self.sending = true;
        let result = self.exchange(text).await;
        self.sending = false;

        if let Err(err) = result {
            if let ApiError::RateLimited(detail) = &err {
                self.conversation.set_rate_limit(detail.clone());
            }
            self.conversation.record_failure(&err.to_string());
        }
        SubmitOutcome::Sent
    }

    /// Respond to the outstanding approval. On success the pending record is
    /// cleared and, when approved, one workspace refresh is scheduled after a
    /// fixed delay. On failure the pending approval stays for a retry.
    pub async fn respond_to_approval(
        &mut self,
        approved: bool,
        remember: Option<ApprovalScope>,
    ) -> Result<(), ApiError> {
        let Some(pending) = self.conversation.pending_approval().cloned() else {
            debug!("no pending approval to respond to");
            return Ok(());
        };

        let reply = ApprovalReply { approved, remember };
        match self
            .transport
            .respond_approval(&self.config, &pending.id, reply)
            .await
        {
            Ok(()) => {
                self.conversation.clear_pending_approval();
                if approved {
                    self.schedule_workspace_refresh();
                }
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, approval_id = %pending.id, "approval response failed");
                self.conversation.record_failure(&err.to_string());
                Err(err)
            }
        }
    }

    /// Clear the pending approval without responding (decline-to-decide).
    pub fn dismiss_approval(&mut self) {
        self.conversation.clear_pending_approval();
    }

    /// Remove an approval turn after the server independently resolved it.
    pub fn remove_approval_turn(&mut self, approval_id: &str) {
        self.conversation.remove_approval_turn(approval_id);
    }

    fn connect_push_channel(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let url = self.config.events_url(session.id());
        let channel = PushChannel::connect(self.http.clone(), url, self.frame_tx.clone());
        session.bind_channel(channel);
    }

    /// Drop frames queued for an already-finished prompt.
    fn drain_stale_frames(&mut self) {
        while let Ok(frame) = self.frame_rx.try_recv() {
            debug!(kind = ?frame.event.kind(), "dropping push frame for finished turn");
        }
    }

    async fn exchange(&mut self, prompt: String) -> Result<(), ApiError> {
        let session_id = self
            .session
            .as_ref()
            .map(|session| session.id().to_string())
            .unwrap_or_default();
        let request = ChatRequest {
            prompt,
            session_id,
        };

        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        let call = async move { transport.chat(&config, request).await };
        tokio::pin!(call);

        enum Step {
            Settled(Result<ChatResponse, ApiError>),
            Frame(Option<StreamFrame>),
        }

        // Frames interleave arbitrarily with the pending call; both land on
        // this loop, so they never execute concurrently against state.
        let body = loop {
            let step = tokio::select! {
                result = &mut call => Step::Settled(result),
                frame = self.frame_rx.recv() => Step::Frame(frame),
            };
            match step {
                Step::Settled(result) => {
                    // The select is unbiased, so the settled call can win a
                    // poll over frames that arrived while the prompt was
                    // still in flight. Those frames belong to this exchange,
                    // not the next one; fold them in before settling.
                    while let Ok(frame) = self.frame_rx.try_recv() {
                        self.process_frame(frame);
                    }
                    break result?;
                }
                Step::Frame(Some(frame)) => self.process_frame(frame),
                // The engine holds a sender, so the queue never closes; if it
                // somehow does, the call is still the authoritative source.
                Step::Frame(None) => {}
            }
        };

        self.finish_exchange(body);
        Ok(())
    }

    /// Process one push frame while the prompt is awaiting its response.
    fn process_frame(&mut self, frame: StreamFrame) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if frame
            .session_id
            .as_deref()
            .is_some_and(|id| id != session.id())
        {
            debug!("discarding push frame for inactive session");
            return;
        }
        session.mark_stream_seen();
        self.conversation.handle_agent_events(&[frame.event], None);
    }

    fn finish_exchange(&mut self, body: ChatResponse) {
        // The response call is authoritative for session identity; the push
        // channel is a dependent resource and follows it.
        if let Some(new_id) = body.session_id.as_deref() {
            let changed = self
                .session
                .as_ref()
                .is_some_and(|session| session.id() != new_id);
            if changed {
                if let Some(session) = self.session.as_mut() {
                    session.replace_id(new_id);
                }
                self.connect_push_channel();
            }
        }

        let stream_seen = self
            .session
            .as_ref()
            .is_some_and(Session::stream_seen);
        self.conversation.apply_response(&body, stream_seen);
    }

    fn schedule_workspace_refresh(&self) {
        let Some(workspace) = self.workspace.clone() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(WORKSPACE_REFRESH_DELAY).await;
            if let Err(err) = workspace.refresh().await {
                warn!(error = %err, "post-approval workspace refresh failed");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{approval_event, event, response};
    use crate::trace::TRACE_PLACEHOLDER_SUMMARY;

    fn conversation() -> Conversation {
        Conversation::new(TracePolicy::default())
    }

    fn assistant_turns(conversation: &Conversation) -> Vec<&str> {
        conversation
            .turns()
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .map(|turn| turn.content.as_str())
            .collect()
    }

    #[test]
    fn batch_partitions_events_and_attaches_trace() {
        let mut convo = conversation();
        convo.trace_mut().seed_placeholder();

        let emitted = convo.handle_agent_events(
            &[
                event("thought", "planning the answer"),
                event("system_notice", "connected to workspace"),
                event("assistant_message", "All done"),
            ],
            None,
        );
        assert!(emitted);
        assert_eq!(assistant_turns(&convo), vec!["All done"]);

        let turn = convo.turns().last().expect("turn");
        let attached = turn.trace.as_ref().expect("attached trace");
        assert_eq!(attached.len(), 2);
        assert_eq!(attached[0].summary, "planning the answer");
        // The placeholder never survives into attached or live entries.
        assert!(convo
            .trace()
            .entries()
            .iter()
            .all(|entry| entry.summary != TRACE_PLACEHOLDER_SUMMARY));
    }

    #[test]
    fn last_assistant_message_wins_within_batch() {
        let mut convo = conversation();
        convo.handle_agent_events(
            &[
                event("assistant_message", "first draft"),
                event("assistant_message", "final answer"),
            ],
            None,
        );
        assert_eq!(assistant_turns(&convo), vec!["final answer"]);
    }

    #[test]
    fn final_message_fallback_when_no_assistant_event() {
        let mut convo = conversation();
        let emitted = convo.handle_agent_events(&[event("thought", "hmm")], Some("the answer"));
        assert!(emitted);
        assert_eq!(assistant_turns(&convo), vec!["the answer"]);
        let turn = convo.turns().last().expect("turn");
        assert_eq!(turn.trace.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn empty_batch_removes_placeholder() {
        let mut convo = conversation();
        convo.trace_mut().seed_placeholder();
        let emitted = convo.handle_agent_events(&[], None);
        assert!(!emitted);
        assert!(!convo.trace().has_entries());
        assert!(convo.turns().is_empty());
    }

    #[test]
    fn assistant_content_is_formatted() {
        let mut convo = conversation();
        convo.handle_agent_events(
            &[event(
                "assistant_message",
                r#"Here you go{"type":"response","content":"Done"}"#,
            )],
            None,
        );
        assert_eq!(assistant_turns(&convo), vec!["Here you go\n\nDone"]);
    }

    #[test]
    fn user_and_error_content_is_never_formatted() {
        let mut convo = conversation();
        let raw = r#"{"type":"response","content":"Done"}"#;
        convo.append_user_turn(raw);
        convo.record_failure(raw);
        assert_eq!(convo.turns()[0].content, raw);
        assert_eq!(convo.turns()[1].content, raw);
    }

    #[test]
    fn approval_event_sets_single_pending_and_turn() {
        let mut convo = conversation();
        convo.handle_agent_events(&[approval_event("appr-1", "run_shell")], None);

        assert_eq!(convo.turns().len(), 1);
        let turn = &convo.turns()[0];
        assert_eq!(turn.role, Role::ApprovalRequest);
        assert_eq!(
            turn.approval.as_ref().map(|a| a.id.as_str()),
            Some("appr-1")
        );
        assert_eq!(
            convo.pending_approval().map(|a| a.id.as_str()),
            Some("appr-1")
        );
        // Approval events never reach the generic trace.
        assert!(!convo.trace().has_entries());

        // A newer request replaces the outstanding slot.
        convo.handle_agent_events(&[approval_event("appr-2", "write_file")], None);
        assert_eq!(
            convo.pending_approval().map(|a| a.id.as_str()),
            Some("appr-2")
        );
        assert_eq!(convo.turns().len(), 2);
    }

    #[test]
    fn remove_approval_turn_matches_by_approval_id() {
        let mut convo = conversation();
        convo.append_user_turn("hi");
        convo.handle_agent_events(&[approval_event("appr-1", "run_shell")], None);
        convo.remove_approval_turn("appr-1");
        assert_eq!(convo.turns().len(), 1);
        assert_eq!(convo.turns()[0].role, Role::User);
        // Unknown ids are a no-op.
        convo.remove_approval_turn("appr-404");
        assert_eq!(convo.turns().len(), 1);
    }

    #[test]
    fn no_stream_response_routes_through_batch_handling() {
        let mut convo = conversation();
        convo.trace_mut().seed_placeholder();
        let body = response(serde_json::json!({
            "events": [
                {"type": "thought", "content": "let me check"},
                {"type": "assistant_message", "content": "Answer"}
            ],
            "final": "Answer"
        }));
        convo.apply_response(&body, false);
        assert_eq!(assistant_turns(&convo), vec!["Answer"]);
    }

    #[test]
    fn no_stream_empty_body_surfaces_raw_payload() {
        let mut convo = conversation();
        convo.trace_mut().seed_placeholder();
        let body = response(serde_json::json!({"status": "queued"}));
        convo.apply_response(&body, false);
        assert_eq!(convo.turns().len(), 1);
        assert!(convo.turns()[0].content.contains("queued"));
        assert!(!convo.trace().has_entries());
    }

    #[test]
    fn stream_seen_duplicate_final_is_suppressed() {
        let mut convo = conversation();
        convo.handle_agent_events(&[event("assistant_message", "Done")], None);
        let body = response(serde_json::json!({"final": "  Done  "}));
        convo.apply_response(&body, true);
        assert_eq!(assistant_turns(&convo), vec!["Done"]);
    }

    #[test]
    fn stream_seen_differing_final_appends_with_live_trace() {
        let mut convo = conversation();
        convo.handle_agent_events(&[event("assistant_message", "Working on it")], None);
        convo.handle_agent_events(&[event("thought", "double checking")], None);

        let body = response(serde_json::json!({"final": "All finished"}));
        convo.apply_response(&body, true);

        assert_eq!(
            assistant_turns(&convo),
            vec!["Working on it", "All finished"]
        );
        let turn = convo.turns().last().expect("turn");
        let attached = turn.trace.as_ref().expect("attached live trace");
        assert_eq!(attached[0].summary, "double checking");
        // Live trace cleared after attachment.
        assert!(!convo.trace().has_entries());
    }

    #[test]
    fn stream_seen_without_final_appends_nothing() {
        let mut convo = conversation();
        convo.handle_agent_events(&[event("assistant_message", "Done")], None);
        convo.trace_mut().seed_placeholder();
        let body = response(serde_json::json!({}));
        convo.apply_response(&body, true);
        assert_eq!(assistant_turns(&convo), vec!["Done"]);
        assert!(!convo.trace().has_entries());
    }

    #[test]
    fn record_failure_leaves_engine_usable() {
        let mut convo = conversation();
        convo.trace_mut().seed_placeholder();
        convo.record_failure("request failed with status 500: boom");

        assert_eq!(convo.error(), Some("request failed with status 500: boom"));
        assert_eq!(convo.turns().len(), 1);
        assert_eq!(convo.turns()[0].role, Role::SystemError);
        let entries = convo.trace().entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].summary.starts_with("Error:"));
    }

    #[test]
    fn clear_resets_everything() {
        let mut convo = conversation();
        convo.append_user_turn("hello");
        convo.handle_agent_events(&[approval_event("appr-1", "run_shell")], None);
        convo.record_failure("nope");
        convo.set_rate_limit(RateLimitDetail::default());

        convo.clear();
        assert!(convo.turns().is_empty());
        assert!(convo.error().is_none());
        assert!(convo.rate_limit().is_none());
        assert!(convo.pending_approval().is_none());
        assert!(!convo.trace().has_entries());
        assert!(!convo.trace().is_expanded());
    }

    #[test]
    fn width_clamps_to_bounds() {
        let mut convo = conversation();
        assert_eq!(convo.panel_width(), 360);
        assert_eq!(convo.update_width(100), 280);
        assert_eq!(convo.update_width(1000), 520);
        assert_eq!(convo.update_width(400), 400);
    }
}
