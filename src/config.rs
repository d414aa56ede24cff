//! Engine configuration: endpoints, auth tokens, trace policy.
//!
//! Configuration resolves from an optional `parley.toml` file overlaid with
//! `PARLEY_*` environment variables. File and env sources are injected as
//! closures so the pipeline is testable without touching the real process
//! environment.

use crate::error::ConfigError;
use crate::trace::TracePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Base endpoint used when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
/// Config file name looked up under the platform config directory.
const CONFIG_FILE_NAME: &str = "parley.toml";

/// Resolved engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Sanitized base endpoint (no trailing slash).
    pub base_url: String,
    /// Environment-level fallback token for the push channel and chat call.
    pub api_token: Option<String>,
    /// User-supplied API key; always preferred over `api_token`.
    pub user_key: Option<String>,
    /// Where users can generate an API key, surfaced by frontends.
    pub key_url: Option<String>,
    /// Trace policy for tool events.
    pub trace: TracePolicy,
}

impl EngineConfig {
    /// Build a config pointing at `base_url` with everything else defaulted.
    pub fn with_base_url(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: sanitize_base_url(Some(base_url.as_ref())),
            ..Self::default()
        }
    }

    /// `POST` endpoint for one prompt exchange.
    pub fn chat_endpoint(&self) -> String {
        format!("{}/chat", self.base_url)
    }

    /// `POST` endpoint carrying an approval decision.
    pub fn approval_endpoint(&self, approval_id: &str) -> String {
        format!("{}/approvals/{approval_id}/respond", self.base_url)
    }

    /// Push-channel URL for a session, with the auth token as a query
    /// parameter when one is available.
    pub fn events_url(&self, session_id: &str) -> String {
        let base = format!("{}/sessions/{session_id}/events", self.base_url);
        let Some(token) = self.auth_token() else {
            return base;
        };
        match reqwest::Url::parse(&base) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("token", token);
                url.to_string()
            }
            // Unparseable base URLs surface later as transport errors; the
            // token is left off rather than appended unencoded.
            Err(_) => base,
        }
    }

    /// The token to authenticate with, preferring the user key.
    pub fn auth_token(&self) -> Option<&str> {
        self.user_key
            .as_deref()
            .or(self.api_token.as_deref())
            .filter(|token| !token.trim().is_empty())
    }
}

/// On-disk config file shape. All fields optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_url: Option<String>,
    api_token: Option<String>,
    key_url: Option<String>,
    trace_tool_events: Option<bool>,
}

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path; otherwise the platform
/// config directory is consulted. A missing file is not an error.
pub fn load_config(path_override: Option<&str>) -> Result<EngineConfig, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        || dirs::config_dir().map(|dir| dir.join("parley")),
    )
}

pub(crate) fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<EngineConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let file = read_file_config(path_override, &read_file, &config_root)?;

    let mut config = EngineConfig {
        base_url: sanitize_base_url(file.base_url.as_deref()),
        api_token: file.api_token,
        user_key: None,
        key_url: file.key_url,
        trace: TracePolicy {
            include_tool_events: file.trace_tool_events.unwrap_or(false),
        },
    };

    // Env vars override resolved file values for immediate use.
    if let Some(url) = env_lookup("PARLEY_BASE_URL") {
        config.base_url = sanitize_base_url(Some(&url));
    }
    if let Some(token) = env_lookup("PARLEY_API_TOKEN") {
        config.api_token = Some(token);
    }
    if let Some(url) = env_lookup("PARLEY_KEY_URL") {
        config.key_url = Some(url);
    }
    if let Some(flag) = env_lookup("PARLEY_TRACE_TOOL_EVENTS") {
        config.trace.include_tool_events = parse_bool_flag("PARLEY_TRACE_TOOL_EVENTS", &flag)?;
    }

    Ok(config)
}

fn read_file_config<FRead, FRoot>(
    path_override: Option<&str>,
    read_file: &FRead,
    config_root: &FRoot,
) -> Result<FileConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let path = match path_override {
        // An explicit path must exist; silent defaults would hide typos.
        Some(explicit) => {
            let text = read_file(Path::new(explicit))?;
            return Ok(toml::from_str(&text)?);
        }
        None => config_root().map(|root| root.join(CONFIG_FILE_NAME)),
    };

    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    match read_file(&path) {
        Ok(text) => Ok(toml::from_str(&text)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(err) => Err(ConfigError::Io(err)),
    }
}

fn parse_bool_flag(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(ConfigError::Invalid(format!(
            "invalid {name} value `{other}`: expected true/false"
        ))),
    }
}

/// Normalize a configured base URL: default when absent, no trailing slash.
pub fn sanitize_base_url(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return DEFAULT_BASE_URL.to_string();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    trimmed.trim_end_matches('/').to_string()
}
