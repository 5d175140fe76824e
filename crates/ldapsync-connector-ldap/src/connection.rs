//! Bind-then-search against the directory.

use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use ldapsync_core::RawRecord;

use crate::config::LdapConfig;
use crate::error::{DirectoryError, DirectoryResult};

/// LDAP result code for invalid credentials.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// One-shot directory reader.
///
/// Every [`LdapSource::search`] opens its own connection, binds, searches
/// and unbinds; nothing is kept between cycles.
pub struct LdapSource {
    config: LdapConfig,
}

impl LdapSource {
    /// Create a source after validating the configuration.
    pub fn new(config: LdapConfig) -> DirectoryResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Search the configured subtree and return every matching entry.
    ///
    /// An empty `attributes` list requests all user attributes.
    #[instrument(skip(self, attributes), fields(base_dn = %self.config.base_dn))]
    pub async fn search(&self, attributes: &[String]) -> DirectoryResult<Vec<RawRecord>> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let settings = LdapConnSettings::new()
            .set_conn_timeout(timeout)
            .set_starttls(self.config.starttls)
            .set_no_tls_verify(!self.config.tls_verify);

        debug!(url = %self.config.url, "Connecting to LDAP server");

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| {
                DirectoryError::connection(
                    format!("failed to connect to LDAP server at {}", self.config.url),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = self.config.bind_dn.as_str();
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let bind = ldap
            .with_timeout(timeout)
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| DirectoryError::connection(format!("LDAP bind failed for {bind_dn}"), e))?;

        if bind.rc != 0 {
            if bind.rc == RC_INVALID_CREDENTIALS {
                error!(bind_dn = %bind_dn, "Incorrect LDAP credentials");
                return Err(DirectoryError::AuthenticationFailed {
                    bind_dn: bind_dn.to_string(),
                });
            }
            return Err(DirectoryError::BindFailed {
                rc: bind.rc,
                text: bind.text,
            });
        }

        let attrs: Vec<&str> = if attributes.is_empty() {
            vec!["*"]
        } else {
            attributes.iter().map(String::as_str).collect()
        };

        debug!(filter = %self.config.filter, attributes = ?attrs, "Searching LDAP");

        let outcome = ldap
            .with_timeout(timeout)
            .search(&self.config.base_dn, Scope::Subtree, &self.config.filter, attrs)
            .await;

        if let Err(e) = ldap.unbind().await {
            debug!(error = %e, "LDAP unbind failed");
        }

        let (entries, _) = outcome
            .map_err(|e| DirectoryError::SearchFailed {
                message: e.to_string(),
            })?
            .success()
            .map_err(|e| DirectoryError::SearchFailed {
                message: e.to_string(),
            })?;

        let records: Vec<RawRecord> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(entry_to_record)
            .collect();

        info!(entries = records.len(), "LDAP search completed");

        Ok(records)
    }
}

impl std::fmt::Debug for LdapSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSource")
            .field("config", &self.config)
            .finish()
    }
}

/// Convert a search entry into a raw record.
///
/// `ldap3` splits values into text and binary maps depending on whether
/// they are valid UTF-8; both end up as raw bytes here.
pub(crate) fn entry_to_record(entry: SearchEntry) -> RawRecord {
    let mut record = RawRecord::new(entry.dn);

    for (name, values) in entry.attrs {
        record.insert(name, values.into_iter().map(String::into_bytes).collect());
    }
    for (name, values) in entry.bin_attrs {
        record.insert(name, values);
    }

    record
}
