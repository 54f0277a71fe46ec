use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One exchanged chat turn: the user's message, the generated response, and the identity the
/// server assigned to the pair.
///
/// Turns are immutable once received.  The client never fabricates one; ids are server-assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    /// Server-assigned identifier.
    pub id: i64,

    /// The message the user sent.
    pub message: String,

    /// The generated response.
    pub response: String,

    /// When the server recorded the turn.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
}

impl ChatTurn {
    /// Create a new `ChatTurn`.
    pub fn new(
        id: i64,
        message: impl Into<String>,
        response: impl Into<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            message: message.into(),
            response: response.into(),
            created_at,
        }
    }
}
