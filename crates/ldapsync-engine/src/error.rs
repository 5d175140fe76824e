//! Engine error types.

use ldapsync_connector_ldap::DirectoryError;
use ldapsync_core::SyncError;
use ldapsync_scim_client::ScimClientError;
use ldapsync_session_client::SessionClientError;
use thiserror::Error;

/// Configuration errors. All of them are fatal before the first cycle.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing configuration value: {0}")]
    Missing(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("unknown {kind} plugin '{tag}'")]
    UnknownPlugin { kind: &'static str, tag: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while assembling or running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Scim(#[from] ScimClientError),

    #[error(transparent)]
    Session(#[from] SessionClientError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type EngineResult<T> = Result<T, EngineError>;
