//! Session lifecycle state and opaque identifier generation.
//!
//! A session binds the push channel to the chat call. The identifier is
//! generated client-side; the chat response is authoritative and may replace
//! it mid-conversation, at which point the push channel is reopened against
//! the new identifier.

use crate::push::PushChannel;
use rand::rngs::OsRng;
use rand::RngCore;

/// Generate an opaque grouped-hex identifier (`xxxx-xxxx-xxxx-xxxx`).
///
/// Used for session ids, transcript turns, and trace entries. OS RNG is
/// sufficient for low-collision opaque IDs.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    let hex = format!("{:016x}", u64::from_be_bytes(bytes));
    format!(
        "{}-{}-{}-{}",
        &hex[0..4],
        &hex[4..8],
        &hex[8..12],
        &hex[12..16]
    )
}

/// The active session: identifier, bound push channel, and the flag recording
/// whether any push event was observed for the in-flight prompt.
#[derive(Debug)]
pub struct Session {
    id: String,
    channel: Option<PushChannel>,
    stream_seen: bool,
}

impl Session {
    /// Allocate a fresh session with no channel bound yet.
    pub fn new() -> Self {
        Self {
            id: generate_id(),
            channel: None,
            stream_seen: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Bind a push channel, tearing down any stale one first so two channels
    /// are never live at once.
    pub fn bind_channel(&mut self, channel: PushChannel) {
        self.disconnect();
        self.channel = Some(channel);
    }

    /// Close the push channel, degrading to response-only mode.
    pub fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }

    /// Adopt a server-issued identifier during session handoff.
    ///
    /// The stale channel is torn down; the caller reopens one against the new
    /// identifier.
    pub fn replace_id(&mut self, id: impl Into<String>) {
        self.disconnect();
        self.id = id.into();
    }

    /// True when a push event has been observed for the in-flight prompt.
    pub fn stream_seen(&self) -> bool {
        self.stream_seen
    }

    pub fn mark_stream_seen(&mut self) {
        self.stream_seen = true;
    }

    pub fn clear_stream_seen(&mut self) {
        self.stream_seen = false;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensures generated IDs use the documented grouped-hex shape.
    #[test]
    fn generate_id_is_hex_groups() {
        let id = generate_id();
        let parts = id.split('-').collect::<Vec<_>>();
        assert_eq!(parts.len(), 4);
        assert!(parts.iter().all(|part| part.len() == 4));
        assert!(parts
            .iter()
            .all(|part| part.chars().all(|ch| ch.is_ascii_hexdigit())));
    }

    #[test]
    fn fresh_sessions_get_distinct_ids() {
        let a = Session::new();
        let b = Session::new();
        assert_ne!(a.id(), b.id());
        assert!(!a.has_channel());
        assert!(!a.stream_seen());
    }

    #[test]
    fn replace_id_drops_stale_channel() {
        let mut session = Session::new();
        session.replace_id("srv-0001");
        assert_eq!(session.id(), "srv-0001");
        assert!(!session.has_channel());
    }

    #[test]
    fn stream_seen_flag_round_trips() {
        let mut session = Session::new();
        session.mark_stream_seen();
        assert!(session.stream_seen());
        session.clear_stream_seen();
        assert!(!session.stream_seen());
    }
}
