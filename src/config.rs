//! Client configuration.
//!
//! A [`ClientConfig`] can be loaded from a YAML file and layered with command-line overrides
//! through [`ClientConfig::merge`].  Unset fields fall back to the defaults below.
//!
//! ```yaml
//! base_url: http://localhost:8000/
//! timeout_secs: 30
//! token_file: /home/ada/.palaver/token.json
//! debounce_ms: 300
//! history_retries: 3
//! history_backoff_ms: 1000
//! routes:
//!   register: api/auth/register
//!   login: api/auth/login
//!   history: api/chat/chats
//!   send: api/chat/chat
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Base URL used when neither configuration nor `PALAVER_BASE_URL` names one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";

/// Environment variable consulted for the base URL.
pub const BASE_URL_ENV: &str = "PALAVER_BASE_URL";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default debounce window for outgoing messages.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Endpoint paths, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRoutes {
    /// Registration endpoint.
    pub register: String,
    /// Login endpoint (form-encoded).
    pub login: String,
    /// History listing endpoint.
    pub history: String,
    /// Send-message endpoint.
    pub send: String,
}

impl ApiRoutes {
    /// Routes as the reference server mounts them: the chat router lives under `/api/chat`.
    pub fn mounted() -> Self {
        Self {
            register: "api/auth/register".to_string(),
            login: "api/auth/login".to_string(),
            history: "api/chat/chats".to_string(),
            send: "api/chat/chat".to_string(),
        }
    }

    /// Routes with the chat endpoints directly under `/api`.
    pub fn flat() -> Self {
        Self {
            register: "api/auth/register".to_string(),
            login: "api/auth/login".to_string(),
            history: "api/chats".to_string(),
            send: "api/chat".to_string(),
        }
    }
}

impl Default for ApiRoutes {
    fn default() -> Self {
        Self::mounted()
    }
}

/// Connection and behavior settings for the client and chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the remote API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Where the session token is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,

    /// Debounce window for outgoing messages, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,

    /// How many times a failed history fetch is retried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_retries: Option<u32>,

    /// Base backoff between history retries, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_backoff_ms: Option<u64>,

    /// Endpoint paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<ApiRoutes>,
}

impl ClientConfig {
    /// Creates an empty configuration; every field takes its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read config {}", path.display()), err)
        })?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save the configuration to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content)
            .map_err(|err| Error::io("failed to write config", err))
    }

    /// Overlay every field `other` sets onto `self`.
    pub fn merge(mut self, other: ClientConfig) -> Self {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.token_file.is_some() {
            self.token_file = other.token_file;
        }
        if other.debounce_ms.is_some() {
            self.debounce_ms = other.debounce_ms;
        }
        if other.history_retries.is_some() {
            self.history_retries = other.history_retries;
        }
        if other.history_backoff_ms.is_some() {
            self.history_backoff_ms = other.history_backoff_ms;
        }
        if other.routes.is_some() {
            self.routes = other.routes;
        }
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Sets the token file.
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Sets the debounce window.
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = Some(ms);
        self
    }

    /// Sets the endpoint paths.
    pub fn with_routes(mut self, routes: ApiRoutes) -> Self {
        self.routes = Some(routes);
        self
    }

    /// The base URL: configured, else `PALAVER_BASE_URL`, else [`DEFAULT_BASE_URL`].
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// The debounce window.
    pub fn debounce(&self) -> Duration {
        self.debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE)
    }

    /// The endpoint paths.
    pub fn resolved_routes(&self) -> ApiRoutes {
        self.routes.clone().unwrap_or_default()
    }

    /// The history retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();
        if let Some(retries) = self.history_retries {
            policy = policy.with_max_retries(retries);
        }
        if let Some(ms) = self.history_backoff_ms {
            policy = policy.with_base_delay(Duration::from_millis(ms));
        }
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new();
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(config.resolved_routes(), ApiRoutes::mounted());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn route_presets_differ_only_in_chat_paths() {
        let mounted = ApiRoutes::mounted();
        let flat = ApiRoutes::flat();
        assert_eq!(mounted.register, flat.register);
        assert_eq!(mounted.login, flat.login);
        assert_eq!(mounted.history, "api/chat/chats");
        assert_eq!(flat.history, "api/chats");
        assert_eq!(mounted.send, "api/chat/chat");
        assert_eq!(flat.send, "api/chat");
    }

    #[test]
    fn yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("palaver.yaml");
        let config = ClientConfig::new()
            .with_base_url("https://chat.example.com/")
            .with_timeout_secs(5)
            .with_debounce_ms(50)
            .with_routes(ApiRoutes::flat());
        config.to_file(&path).unwrap();

        let loaded = ClientConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn yaml_partial_file() {
        let config: ClientConfig =
            serde_yaml::from_str("base_url: http://10.0.0.2:8000/\nhistory_retries: 5\n").unwrap();
        assert_eq!(config.resolved_base_url(), "http://10.0.0.2:8000/");
        assert_eq!(config.retry_policy().max_retries(), 5);
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn yaml_unknown_field_is_rejected() {
        let result = serde_yaml::from_str::<ClientConfig>("base_uri: http://x/\n");
        assert!(result.is_err());
    }

    #[test]
    fn merge_prefers_other() {
        let file = ClientConfig::new()
            .with_base_url("http://file/")
            .with_timeout_secs(10);
        let flags = ClientConfig::new().with_base_url("http://flag/");
        let merged = file.merge(flags);
        assert_eq!(merged.base_url.as_deref(), Some("http://flag/"));
        assert_eq!(merged.timeout_secs, Some(10));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ClientConfig::from_file("/nonexistent/palaver.yaml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
