//! YAML configuration loading and validation.
//!
//! Scalars tagged `!ENV NAME` are replaced with the value of the environment
//! variable `NAME` before the document is deserialised. When the variable is
//! not set the name itself is kept.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::env::VarError;
use std::path::Path;
use tracing::debug;

use ldapsync_connector_ldap::{DirectoryKind, LdapConfig};
use ldapsync_core::{CommonRules, FieldMapper, GroupReconciler, MappingTable};
use ldapsync_scim_client::ScimConfig;
use ldapsync_session_client::SessionConfig;

use crate::error::{ConfigError, ConfigResult};
use crate::hooks::{FailPolicy, LifecycleKind};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const ENV_TAG: &str = "ENV";

/// Canonical keys the session user API can store and read back.
const SESSION_MAPPING_KEYS: &[&str] = &["userName", "displayName", "active", "memberOf"];

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub sync: ScheduleConfig,
    pub directory: DirectoryConfig,
    pub mapping: MappingTable,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub groups: GroupsConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Delay between the end of a cycle and the start of the next one.
    /// `0` runs a single cycle.
    #[serde(default)]
    pub interval_secs: u64,

    /// Skip the user stages when the directory returns no users.
    #[serde(default = "default_true")]
    pub skip_when_source_empty: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 0,
            skip_when_source_empty: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Directory source: plugin tag plus LDAP connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory plugin tag (`active_directory`, `openldap`).
    pub plugin: String,
    #[serde(flatten)]
    pub ldap: LdapConfig,
}

impl DirectoryConfig {
    pub fn kind(&self) -> ConfigResult<DirectoryKind> {
        self.plugin
            .parse()
            .map_err(|_| ConfigError::UnknownPlugin {
                kind: "directory",
                tag: self.plugin.clone(),
            })
    }
}

/// Which API flavour manages users on the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserApi {
    #[default]
    Scim,
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub user_api: UserApi,
    #[serde(default)]
    pub scim: Option<ScimConfig>,
    #[serde(default)]
    pub session: Option<SessionConfig>,
}

/// Group membership synchronisation. Needs the session API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Remove remote members that no longer belong to the group.
    #[serde(default)]
    pub auto_removal: bool,
    /// Regex extracting the group name from a directory group reference.
    /// Capture group 1 is the name.
    #[serde(default)]
    pub name_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default = "default_lifecycle")]
    pub lifecycle: String,
    #[serde(default)]
    pub fail_policy: FailPolicy,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            lifecycle: default_lifecycle(),
            fail_policy: FailPolicy::default(),
        }
    }
}

fn default_lifecycle() -> String {
    "none".to_string()
}

impl SyncConfig {
    /// Load and validate configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration, resolving `!ENV` tags from the
    /// process environment.
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        Self::from_yaml_with(content, |key| std::env::var(key))
    }

    /// Parse and validate configuration with a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_yaml_with<F>(content: &str, reader: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let mut document: Value = serde_yaml::from_str(content)?;
        resolve_env_tags(&mut document, &reader);
        let config: Self = serde_yaml::from_value(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise fail mid-cycle.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.log.level.trim().is_empty() {
            return Err(ConfigError::invalid("log.level", "must not be empty"));
        }

        self.directory.kind()?;
        self.directory
            .ldap
            .validate()
            .map_err(|e| ConfigError::invalid("directory", e.to_string()))?;

        if self.mapping.is_empty() {
            return Err(ConfigError::Missing("mapping".to_string()));
        }
        FieldMapper::compile(&self.mapping, &CommonRules)
            .map_err(|e| ConfigError::invalid("mapping", e.to_string()))?;

        match self.platform.user_api {
            UserApi::Scim => self
                .platform
                .scim
                .as_ref()
                .ok_or_else(|| ConfigError::Missing("platform.scim".to_string()))?
                .validate()
                .map_err(|e| ConfigError::invalid("platform.scim", e.to_string()))?,
            UserApi::Session => {
                self.session_config("platform.session")?;
                if let Some(key) = self
                    .mapping
                    .keys()
                    .find(|key| !SESSION_MAPPING_KEYS.contains(&key.as_str()))
                {
                    return Err(ConfigError::invalid(
                        "mapping",
                        format!(
                            "'{key}' is not stored by the session user API (supported: {})",
                            SESSION_MAPPING_KEYS.join(", ")
                        ),
                    ));
                }
            }
        }

        if self.groups.enabled {
            self.session_config("platform.session (required by groups)")?;
            GroupReconciler::new(self.groups.name_pattern.as_deref(), self.groups.auto_removal)
                .map_err(|e| ConfigError::invalid("groups.name_pattern", e.to_string()))?;
        }

        self.hooks
            .lifecycle
            .parse::<LifecycleKind>()
            .map_err(|_| ConfigError::UnknownPlugin {
                kind: "lifecycle",
                tag: self.hooks.lifecycle.clone(),
            })?;

        Ok(())
    }

    fn session_config(&self, key: &str) -> ConfigResult<()> {
        self.platform
            .session
            .as_ref()
            .ok_or_else(|| ConfigError::Missing(key.to_string()))?
            .validate()
            .map_err(|e| ConfigError::invalid("platform.session", e.to_string()))
    }
}

/// Replace every `!ENV NAME` scalar with the variable's value, or with
/// `NAME` when the variable is unset.
fn resolve_env_tags<F>(value: &mut Value, reader: &F)
where
    F: Fn(&str) -> Result<String, VarError>,
{
    if let Value::Tagged(tagged) = value {
        if tagged.tag == ENV_TAG {
            if let Value::String(name) = &tagged.value {
                let name = name.trim().to_string();
                let resolved = reader(&name).unwrap_or_else(|_| name.clone());
                *value = Value::String(resolved);
                return;
            }
        }
    }

    match value {
        Value::Mapping(mapping) => {
            for child in mapping.values_mut() {
                resolve_env_tags(child, reader);
            }
        }
        Value::Sequence(sequence) => {
            for child in sequence.iter_mut() {
                resolve_env_tags(child, reader);
            }
        }
        Value::Tagged(tagged) => resolve_env_tags(&mut tagged.value, reader),
        _ => {}
    }
}
