//! Unified error types for the conversation engine.

use crate::types::RateLimitDetail;
use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from the HTTP API layer.
#[derive(Debug)]
pub enum ApiError {
    /// Network / reqwest-level error.
    Http(reqwest::Error),
    /// Non-2xx status from the API (other than 429).
    Status(u16, String),
    /// 429 with the server's structured `detail` payload.
    ///
    /// Kept separate from [`ApiError::Status`] so frontends can raise an
    /// upgrade prompt instead of a generic failure message.
    RateLimited(RateLimitDetail),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status(code, body) => write!(f, "request failed with status {code}: {body}"),
            Self::RateLimited(detail) => match &detail.message {
                Some(message) => write!(f, "{message}"),
                None => write!(f, "rate limit exceeded"),
            },
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// EngineError: top-level
// ---------------------------------------------------------------------------

/// Top-level error type for the engine.
#[derive(Debug)]
pub enum EngineError {
    Config(ConfigError),
    Api(ApiError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Api(e) => write!(f, "api: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ApiError> for EngineError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}
