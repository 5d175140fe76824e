//! Session API error types.

use ldapsync_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionClientError {
    #[error("invalid session API configuration: {0}")]
    InvalidConfig(String),

    /// A call was made without a token.
    #[error("no active session, login first")]
    NotLoggedIn,

    /// Login was refused or returned no token.
    #[error("platform login failed for '{username}'{}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    LoginFailed {
        username: String,
        status: Option<u16>,
    },

    /// The platform answered with a non-success status.
    #[error("platform API error (HTTP {status}) on {endpoint}: {detail}")]
    Api {
        status: u16,
        endpoint: String,
        detail: String,
    },

    /// An identifier could not be sent as the platform's numeric id.
    #[error("invalid platform id '{0}'")]
    InvalidId(String),

    #[error("platform request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("platform unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("failed to parse platform response: {0}")]
    Parse(String),
}

impl SessionClientError {
    /// Whether the error is transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unreachable(_))
            || matches!(self, Self::Api { status, .. } if *status >= 500 || *status == 429)
    }

    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::LoginFailed { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SessionClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs: 0 }
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SessionClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<SessionClientError> for SyncError {
    fn from(err: SessionClientError) -> Self {
        match err {
            SessionClientError::NotLoggedIn | SessionClientError::LoginFailed { .. } => {
                SyncError::session(err.to_string())
            }
            other => SyncError::platform(other.status(), other.to_string()),
        }
    }
}

pub type SessionClientResult<T> = Result<T, SessionClientError>;
