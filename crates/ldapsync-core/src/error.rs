//! Error types shared across the synchronisation pipeline.

use thiserror::Error;

/// Errors raised while mapping, reconciling or talking to collaborators.
///
/// Collaborator crates convert their own error types into this one at the
/// capability-trait boundary, so the engine only has to reason about these
/// variants.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A mapping table entry could not be compiled into a rule.
    #[error("invalid mapping for '{key}': {message}")]
    InvalidMapping { key: String, message: String },

    /// The group-name extraction pattern is not a valid regular expression.
    #[error("invalid group name pattern '{pattern}': {source}")]
    InvalidGroupPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The directory could not be bound or searched.
    #[error("directory error: {message}")]
    Directory { message: String },

    /// The target platform rejected a call or could not be reached.
    #[error("platform error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Platform {
        status: Option<u16>,
        message: String,
    },

    /// The platform session is missing or was refused.
    #[error("platform session error: {message}")]
    Session { message: String },

    /// A lifecycle hook reported a failure.
    #[error("lifecycle hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },
}

impl SyncError {
    /// Create a directory error.
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            message: message.into(),
        }
    }

    /// Create a platform error with an optional HTTP status.
    pub fn platform(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Platform {
            status,
            message: message.into(),
        }
    }

    /// Create a session error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a hook error.
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// HTTP status attached to a platform error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Platform { status, .. } => *status,
            _ => None,
        }
    }
}

/// Result type used throughout the core crate.
pub type SyncResult<T> = Result<T, SyncError>;
