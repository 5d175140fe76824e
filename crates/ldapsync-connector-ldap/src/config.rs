//! LDAP source configuration.

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

/// Connection and search settings for the directory.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Server URL, `ldap://host:389` or `ldaps://host:636`.
    pub url: String,

    /// Bind DN (e.g., "cn=sync,ou=services,dc=example,dc=com").
    #[serde(default)]
    pub bind_dn: String,

    /// Bind password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Upgrade a plain `ldap://` connection with STARTTLS.
    #[serde(default)]
    pub starttls: bool,

    /// Verify the server certificate.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Base DN of the user subtree.
    pub base_dn: String,

    /// Search filter selecting user entries.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Attributes to request. Empty means every attribute the mapping
    /// table references.
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Connect and operation timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `userAccountControl` bits meaning "disabled" (Active Directory only).
    #[serde(default = "default_disabled_mask")]
    pub disabled_mask: u64,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("starttls", &self.starttls)
            .field("tls_verify", &self.tls_verify)
            .field("base_dn", &self.base_dn)
            .field("filter", &self.filter)
            .field("attributes", &self.attributes)
            .field("timeout_secs", &self.timeout_secs)
            .field("disabled_mask", &format_args!("{:#x}", self.disabled_mask))
            .finish()
    }
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "(objectClass=person)".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_disabled_mask() -> u64 {
    ldapsync_core::DEFAULT_DISABLED_MASK
}

impl LdapConfig {
    /// Create a config with required fields and defaults for the rest.
    pub fn new(url: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bind_dn: String::new(),
            bind_password: None,
            starttls: false,
            tls_verify: true,
            base_dn: base_dn.into(),
            filter: default_filter(),
            attributes: Vec::new(),
            timeout_secs: default_timeout_secs(),
            disabled_mask: default_disabled_mask(),
        }
    }

    /// Set bind credentials.
    pub fn with_credentials(mut self, bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.bind_dn = bind_dn.into();
        self.bind_password = Some(password.into());
        self
    }

    /// Set the search filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(invalid("url is required"));
        }
        if !(url.starts_with("ldap://") || url.starts_with("ldaps://")) {
            return Err(invalid(format!(
                "url must start with ldap:// or ldaps://, got '{url}'"
            )));
        }
        if self.starttls && url.starts_with("ldaps://") {
            return Err(invalid("starttls cannot be combined with ldaps://"));
        }
        if self.base_dn.trim().is_empty() {
            return Err(invalid("base_dn is required"));
        }
        if self.filter.trim().is_empty() {
            return Err(invalid("filter must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be greater than zero"));
        }
        if !self.bind_dn.is_empty() && self.bind_password.is_none() {
            return Err(invalid("bind_password is required when bind_dn is set"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> DirectoryError {
    DirectoryError::InvalidConfiguration {
        message: message.into(),
    }
}
