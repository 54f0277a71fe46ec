// Public modules
pub mod chat;
pub mod chat_api;
pub mod client;
pub mod client_logger;
pub mod config;
pub mod debounce;
pub mod error;
pub mod observability;
pub mod retry;
pub mod session;
pub mod session_store;
pub mod types;
pub mod utils;

// Re-exports
pub use chat_api::ChatApi;
pub use client::Palaver;
pub use client_logger::ClientLogger;
pub use config::{ApiRoutes, ClientConfig};
pub use debounce::Debouncer;
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use retry::RetryPolicy;
pub use session::{ChatSession, HistoryState, OutgoingMessage, SessionStats, Transcript};
pub use session_store::{FileTokenStore, MemoryTokenStore, SessionToken, TokenStore};
pub use types::*;
