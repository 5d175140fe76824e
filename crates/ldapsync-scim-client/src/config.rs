//! SCIM target configuration.

use serde::{Deserialize, Serialize};

use crate::auth::ScimCredentials;
use crate::error::{ScimClientError, ScimClientResult};
use crate::retry::RetryPolicy;

/// Connection settings for a SCIM target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScimConfig {
    /// Base URL of the SCIM endpoint (e.g., "https://platform.example.com/scim/v2").
    pub url: String,

    /// Credentials used on every request.
    pub auth: ScimCredentials,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Verify the server certificate.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Page size for `GET /Users`.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Transport-level retry settings.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Retry settings. No retries by default: the sync engine never retries a
/// failed operation itself and relies on the next cycle instead.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            base_delay_secs: settings.base_delay_secs,
            max_delay_secs: settings.max_delay_secs,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> u32 {
    100
}

fn default_base_delay_secs() -> u64 {
    1
}

fn default_max_delay_secs() -> u64 {
    60
}

impl ScimConfig {
    pub fn new(url: impl Into<String>, auth: ScimCredentials) -> Self {
        Self {
            url: url.into(),
            auth,
            timeout_secs: default_timeout_secs(),
            tls_verify: true,
            page_size: default_page_size(),
            retry: RetrySettings::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ScimClientResult<()> {
        let url = self.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ScimClientError::InvalidConfig(format!(
                "url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.page_size == 0 {
            return Err(ScimClientError::InvalidConfig(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ScimClientError::InvalidConfig(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        self.auth.validate()
    }
}
