use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Account information returned by a successful registration.
///
/// The server only promises a confirmation message; anything else it sends is kept verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegisterResponse {
    /// Confirmation message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Any additional account fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
