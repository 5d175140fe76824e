//! SCIM client error types.

use ldapsync_core::SyncError;
use thiserror::Error;

/// Errors returned by the SCIM client.
#[derive(Debug, Error)]
pub enum ScimClientError {
    /// Client configuration is invalid.
    #[error("invalid SCIM client configuration: {0}")]
    InvalidConfig(String),

    /// The target refused the credentials.
    #[error("SCIM authentication failed: {0}")]
    AuthError(String),

    /// Resource not found on the target.
    #[error("SCIM resource not found: {0}")]
    NotFound(String),

    /// Uniqueness conflict on the target.
    #[error("SCIM conflict: {0}")]
    Conflict(String),

    /// The target asked us to slow down.
    #[error("SCIM target rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success status.
    #[error("SCIM error (HTTP {status}): {detail}")]
    ScimError { status: u16, detail: String },

    /// The request timed out.
    #[error("SCIM request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The target could not be reached.
    #[error("SCIM target unreachable: {0}")]
    Unreachable(String),

    /// Other transport failure.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The response body could not be parsed.
    #[error("failed to parse SCIM response: {0}")]
    ParseError(String),

    /// Retries were exhausted.
    #[error("{message}")]
    MaxRetriesExceeded { attempts: u32, message: String },
}

impl ScimClientError {
    /// Whether the error is transient (network, timeout, rate limit).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Unreachable(_)
        )
    }

    /// Whether the target answered with a 5xx status.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ScimError { status, .. } if *status >= 500)
    }

    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::NotFound(_) => Some(404),
            Self::Conflict(_) => Some(409),
            Self::RateLimited { .. } => Some(429),
            Self::ScimError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ScimClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs: 0 }
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScimClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<ScimClientError> for SyncError {
    fn from(err: ScimClientError) -> Self {
        SyncError::platform(err.status(), err.to_string())
    }
}

/// Result type for SCIM client operations.
pub type ScimClientResult<T> = Result<T, ScimClientError>;
