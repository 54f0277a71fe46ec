use serde::{Deserialize, Serialize};

/// Response to a successful login.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    /// The bearer token for subsequent requests.
    pub access_token: String,

    /// Token scheme, normally `bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}
