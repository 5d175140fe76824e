//! Session API connection settings.

use serde::{Deserialize, Serialize};

use crate::error::{SessionClientError, SessionClientResult};

#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base URL of the platform (e.g., "https://platform.example.com:8080").
    pub url: String,

    pub username: String,

    pub password: String,

    /// Whether `password` is already hashed the way the platform stores it.
    #[serde(default = "default_true")]
    pub password_hashed: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub tls_verify: bool,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("password_hashed", &self.password_hashed)
            .field("timeout_secs", &self.timeout_secs)
            .field("tls_verify", &self.tls_verify)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl SessionConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            password_hashed: true,
            timeout_secs: default_timeout_secs(),
            tls_verify: true,
        }
    }

    pub fn validate(&self) -> SessionClientResult<()> {
        let url = self.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SessionClientError::InvalidConfig(format!(
                "url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.username.trim().is_empty() {
            return Err(SessionClientError::InvalidConfig(
                "username is required".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(SessionClientError::InvalidConfig(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
