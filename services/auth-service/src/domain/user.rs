use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity payload accepted at login and carried in every session.
///
/// `username` is the only required field; anything else the client sends
/// is kept as-is and handed back on `/me`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub username: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl User {
    pub fn validate(&self) -> Result<(), &'static str> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err("username must not be empty");
        }
        if username.len() > 128 {
            return Err("username is too long");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(flatten)]
    pub user: User,
    /// Optional session lifetime in seconds, at most the configured expiration.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

impl TokenResponse {
    pub fn bearer(token: String, expires_in: u64) -> Self {
        Self {
            token,
            token_type: "Bearer",
            expires_in,
        }
    }
}
