//! LDAP source error types.

use ldapsync_core::SyncError;
use thiserror::Error;

/// Errors raised while talking to the directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Directory configuration is invalid.
    #[error("invalid directory configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Unknown directory plugin tag.
    #[error("unknown directory plugin '{0}', expected one of: active_directory, openldap")]
    UnknownPlugin(String),

    /// The server could not be reached or the connection broke.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<ldap3::LdapError>,
    },

    /// The server rejected the bind credentials.
    #[error("Incorrect LDAP credentials for {bind_dn}")]
    AuthenticationFailed { bind_dn: String },

    /// The bind was refused for another reason.
    #[error("LDAP bind failed with code {rc}: {text}")]
    BindFailed { rc: u32, text: String },

    /// The search request failed.
    #[error("LDAP search failed: {message}")]
    SearchFailed { message: String },

    /// The mapping table could not be compiled.
    #[error(transparent)]
    Mapping(#[from] SyncError),
}

impl DirectoryError {
    pub(crate) fn connection(message: impl Into<String>, source: ldap3::LdapError) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: Some(source),
        }
    }
}

impl From<DirectoryError> for SyncError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Mapping(inner) => inner,
            other => SyncError::directory(other.to_string()),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
