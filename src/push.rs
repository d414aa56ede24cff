//! Push channel: the long-lived server-to-client event feed.
//!
//! A background reader task consumes the streaming response body, decodes SSE
//! frames incrementally, and forwards parsed events into an inbound queue
//! consumed by the engine. Channel errors and unparsable frames are logged
//! and swallowed; a broken push channel degrades the engine to response-only
//! mode, never a hard failure.

use crate::types::StreamFrame;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Incremental SSE decoder.
///
/// The SSE format allows events to contain multiple `data:` lines; payload
/// lines are joined with `\n` and finalized when a blank line is encountered.
/// Bytes are buffered so chunk boundaries may fall anywhere, including inside
/// a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Feed one chunk, returning every completed event payload.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw_line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw_line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    payloads.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data_lines.push(value.to_string());
            }
        }

        payloads
    }
}

/// Parse one SSE payload into a stream frame.
///
/// Frames without a recognized event-type tag are rejected here, at the
/// channel boundary, rather than propagated into the engine.
pub fn parse_frame(payload: &str) -> Option<StreamFrame> {
    let trimmed = payload.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<StreamFrame>(trimmed) {
        Ok(frame) => Some(frame),
        Err(err) => {
            debug!(error = %err, "discarding unparsable push frame");
            None
        }
    }
}

/// Handle for the background push reader task.
#[derive(Debug)]
pub struct PushChannel {
    handle: tokio::task::JoinHandle<()>,
}

impl PushChannel {
    /// Open the push channel and start forwarding frames into `frames`.
    ///
    /// Connection setup happens inside the spawned task, so a dead endpoint
    /// costs nothing on the caller's path.
    pub fn connect(
        http: reqwest::Client,
        url: String,
        frames: mpsc::UnboundedSender<StreamFrame>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            run_reader(http, url, frames).await;
        });
        Self { handle }
    }

    /// Tear down the reader task.
    pub fn close(self) {
        self.handle.abort();
    }
}

async fn run_reader(http: reqwest::Client, url: String, frames: mpsc::UnboundedSender<StreamFrame>) {
    let response = match http.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "unable to open push channel");
            return;
        }
    };
    if !response.status().is_success() {
        warn!(status = %response.status(), "push channel rejected");
        return;
    }

    let mut decoder = SseDecoder::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(error = %err, "push channel read error");
                return;
            }
        };
        for payload in decoder.feed(&chunk) {
            let Some(frame) = parse_frame(&payload) else {
                continue;
            };
            // Receiver gone means the engine moved on; stop reading.
            if frames.send(frame).is_err() {
                return;
            }
        }
    }
}
