//! HTTP transport for the chat call and the approval side channel.
//!
//! [`ChatTransport`] is the seam the engine talks through; tests drive the
//! engine with a mock implementation and synthetic push frames instead of a
//! real network.

use crate::config::EngineConfig;
use crate::error::ApiError;
use crate::types::{ApprovalReply, ChatRequest, ChatResponse, RateLimitDetail};
use async_trait::async_trait;
use serde_json::Value;

/// Fallback user-facing text when a 429 carries no message.
const RATE_LIMIT_FALLBACK: &str = "Rate limit exceeded. Please upgrade your plan.";

/// Request/response transport consumed by the engine.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one prompt exchange.
    async fn chat(
        &self,
        config: &EngineConfig,
        request: ChatRequest,
    ) -> Result<ChatResponse, ApiError>;

    /// Carry an approval decision back to the server.
    async fn respond_approval(
        &self,
        config: &EngineConfig,
        approval_id: &str,
        reply: ApprovalReply,
    ) -> Result<(), ApiError>;
}

/// Production transport over `reqwest`.
#[derive(Debug, Default, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared client handle, reused by the push channel so connections pool.
    pub fn http_client(&self) -> reqwest::Client {
        self.http.clone()
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn chat(
        &self,
        config: &EngineConfig,
        request: ChatRequest,
    ) -> Result<ChatResponse, ApiError> {
        let mut req = self.http.post(config.chat_endpoint()).json(&request);
        if let Some(key) = config.user_key.as_deref().filter(|k| !k.trim().is_empty()) {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req.send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::RateLimited(parse_rate_limit_detail(&body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status(status.as_u16(), body));
        }

        response.json::<ChatResponse>().await.map_err(ApiError::from)
    }

    async fn respond_approval(
        &self,
        config: &EngineConfig,
        approval_id: &str,
        reply: ApprovalReply,
    ) -> Result<(), ApiError> {
        let mut req = self
            .http
            .post(config.approval_endpoint(approval_id))
            .json(&reply);
        if let Some(key) = config.user_key.as_deref().filter(|k| !k.trim().is_empty()) {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status(status.as_u16(), body));
        }
        Ok(())
    }
}

/// Extract the structured `detail` payload from a 429 body.
///
/// Unparsable bodies yield the fallback message; the caller still gets a
/// rate-limit error distinct from generic failures.
fn parse_rate_limit_detail(body: &str) -> RateLimitDetail {
    let mut detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| payload.get("detail").cloned())
        .and_then(|detail| serde_json::from_value::<RateLimitDetail>(detail).ok())
        .unwrap_or_default();
    if detail.message.is_none() {
        detail.message = Some(RATE_LIMIT_FALLBACK.to_string());
    }
    detail
}
