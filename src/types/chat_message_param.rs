use serde::{Deserialize, Serialize};

/// Body of a send-message request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageParam {
    /// The text to send.
    pub message: String,
}

impl ChatMessageParam {
    /// Create a new `ChatMessageParam`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
