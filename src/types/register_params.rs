use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Body of a registration request.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterParams {
    /// The requested username.
    pub username: String,

    /// Contact email.
    pub email: String,

    /// The account password.
    pub password: String,
}

impl RegisterParams {
    /// Create a new `RegisterParams`.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Reject input the server would reject anyway, without a round trip.
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::validation(
                "username must not be empty",
                Some("username".to_string()),
            ));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::validation(
                "email must be a valid address",
                Some("email".to_string()),
            ));
        }
        if self.password.is_empty() {
            return Err(Error::validation(
                "password must not be empty",
                Some("password".to_string()),
            ));
        }
        Ok(())
    }
}

// Passwords stay out of debug output.
impl std::fmt::Debug for RegisterParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterParams")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
