//! Configuration types for the chat application.
//!
//! Flags are parsed via `arrrg`.  An optional YAML file supplies the same settings; flags win
//! over the file and the file wins over the environment and built-in defaults.

use std::path::PathBuf;
use std::sync::Arc;

use arrrg_derive::CommandLine;

use crate::config::{ApiRoutes, ClientConfig};
use crate::error::Result;
use crate::session_store::{FileTokenStore, MemoryTokenStore, TokenStore};

/// Command-line arguments for the palaver-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the chat server.
    #[arrrg(optional, "Server base URL (default: $PALAVER_BASE_URL or http://localhost:8000/)", "URL")]
    pub base_url: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "Read settings from a YAML file", "FILE")]
    pub config: Option<String>,

    /// Where the session token is kept.
    #[arrrg(optional, "Token file (default: ~/.palaver/token.json)", "FILE")]
    pub token_file: Option<String>,

    /// Keep the token in memory only.
    #[arrrg(flag, "Do not persist the session token")]
    pub ephemeral: bool,

    /// Per-request timeout.
    #[arrrg(optional, "Request timeout in seconds (default: 60)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// Debounce window for outgoing messages.
    #[arrrg(optional, "Send debounce window in milliseconds (default: 300)", "MS")]
    pub debounce_ms: Option<u64>,

    /// Use /api/chats and /api/chat instead of the /api/chat/ prefixed routes.
    #[arrrg(flag, "Use unprefixed chat routes")]
    pub flat_routes: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for the chat application.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Client settings given on the command line.  Merged over the config file by
    /// [`ChatConfig::client_config`].
    pub client: ClientConfig,

    /// YAML file to read before applying flags.
    pub config_path: Option<PathBuf>,

    /// Keep the token in memory only.
    pub ephemeral: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a config with defaults: colors on, token persisted to the default location.
    pub fn new() -> Self {
        Self {
            client: ClientConfig::default(),
            config_path: None,
            ephemeral: false,
            use_color: true,
        }
    }

    /// Sets the client settings.
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Sets the YAML file.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Keep the token in memory only.
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// The effective client settings: the config file, if any, overridden by flags.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let base = match &self.config_path {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };
        Ok(base.merge(self.client.clone()))
    }

    /// The token store described by `client`.
    pub fn token_store(&self, client: &ClientConfig) -> Result<Arc<dyn TokenStore>> {
        if self.ephemeral {
            return Ok(Arc::new(MemoryTokenStore::new()));
        }
        let store = match &client.token_file {
            Some(path) => FileTokenStore::new(path.clone()),
            None => FileTokenStore::default_location()?,
        };
        Ok(Arc::new(store))
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let client = ClientConfig {
            base_url: args.base_url,
            timeout_secs: args.timeout_secs,
            token_file: args.token_file.map(PathBuf::from),
            debounce_ms: args.debounce_ms,
            routes: args.flat_routes.then(ApiRoutes::flat),
            ..ClientConfig::default()
        };
        ChatConfig {
            client,
            config_path: args.config.map(PathBuf::from),
            ephemeral: args.ephemeral,
            use_color: !args.no_color,
        }
    }
}
