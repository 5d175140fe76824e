//! Startup-time registry of directory plugins.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use ldapsync_core::{DirectoryPlugin, MappingTable};

use crate::config::LdapConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::vendor::{ActiveDirectory, OpenLdap};

/// Directory vendors known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryKind {
    ActiveDirectory,
    #[serde(rename = "openldap")]
    OpenLdap,
}

impl DirectoryKind {
    /// All registered vendors.
    #[must_use]
    pub fn all() -> &'static [DirectoryKind] {
        &[DirectoryKind::ActiveDirectory, DirectoryKind::OpenLdap]
    }

    /// Configuration tag of the vendor.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectoryKind::ActiveDirectory => "active_directory",
            DirectoryKind::OpenLdap => "openldap",
        }
    }
}

impl fmt::Display for DirectoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DirectoryKind {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active_directory" | "ad" | "ms_active_directory" => Ok(DirectoryKind::ActiveDirectory),
            "openldap" => Ok(DirectoryKind::OpenLdap),
            _ => Err(DirectoryError::UnknownPlugin(s.to_string())),
        }
    }
}

/// Build the directory plugin registered under `kind`.
pub fn build_directory(
    kind: DirectoryKind,
    config: LdapConfig,
    table: &MappingTable,
) -> DirectoryResult<Arc<dyn DirectoryPlugin>> {
    info!(plugin = %kind, url = %config.url, "Directory plugin enabled");
    let plugin: Arc<dyn DirectoryPlugin> = match kind {
        DirectoryKind::ActiveDirectory => Arc::new(ActiveDirectory::new(config, table)?),
        DirectoryKind::OpenLdap => Arc::new(OpenLdap::new(config, table)?),
    };
    Ok(plugin)
}
