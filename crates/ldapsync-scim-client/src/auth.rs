//! SCIM target authentication: HTTP Basic or static Bearer token.

use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{ScimClientError, ScimClientResult};

/// Credentials for a SCIM target.
///
/// The [`Debug`] impl redacts secrets to keep them out of log output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScimCredentials {
    /// HTTP Basic authentication.
    Basic { username: String, password: String },

    /// Bearer token authentication.
    Bearer { token: String },
}

impl std::fmt::Debug for ScimCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[REDACTED]")
                .finish(),
        }
    }
}

impl ScimCredentials {
    pub(crate) fn validate(&self) -> ScimClientResult<()> {
        let missing = match self {
            Self::Basic { username, .. } => username.is_empty().then_some("username"),
            Self::Bearer { token } => token.is_empty().then_some("token"),
        };
        match missing {
            Some(field) => Err(ScimClientError::InvalidConfig(format!(
                "SCIM {field} is required"
            ))),
            None => Ok(()),
        }
    }
}

/// Applies credentials to outgoing requests.
#[derive(Debug, Clone)]
pub struct ScimAuth {
    credentials: ScimCredentials,
}

impl ScimAuth {
    #[must_use]
    pub fn new(credentials: ScimCredentials) -> Self {
        Self { credentials }
    }

    /// Apply authentication to a request builder.
    #[must_use]
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            ScimCredentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            ScimCredentials::Bearer { token } => builder.bearer_auth(token),
        }
    }
}
