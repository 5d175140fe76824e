//! Lifecycle hooks around user operations.
//!
//! A lifecycle plugin is picked at startup by tag. Its hooks run
//! sequentially around the user batch and around each user operation; the
//! [`FailPolicy`] decides what a hook failure does to the batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use ldapsync_core::{LifecyclePlugin, SyncError, SyncOperation, SyncResult};

/// How to handle hook errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailPolicy {
    /// Hook failure is logged and the batch continues.
    #[default]
    Continue,
    /// Hook failure stops the remaining user operations of the cycle.
    AbortBatch,
}

/// Lifecycle plugins known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    None,
    Logging,
}

impl LifecycleKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleKind::None => "none",
            LifecycleKind::Logging => "logging",
        }
    }
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(LifecycleKind::None),
            "logging" => Ok(LifecycleKind::Logging),
            other => Err(other.to_string()),
        }
    }
}

/// Plugin without hooks.
pub struct NoLifecycle;

impl LifecyclePlugin for NoLifecycle {
    fn name(&self) -> &str {
        "none"
    }
}

/// Plugin logging every hook invocation.
pub struct LoggingLifecycle;

#[async_trait]
impl LifecyclePlugin for LoggingLifecycle {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before_send_all_users(&self) -> SyncResult<()> {
        info!("Sending user operations");
        Ok(())
    }

    async fn before_send_user(&self, op: &SyncOperation) -> SyncResult<()> {
        info!(op = %op.kind(), user = %op.key(), "Sending user operation");
        Ok(())
    }

    async fn after_send_user(&self, op: &SyncOperation, succeeded: bool) -> SyncResult<()> {
        info!(op = %op.kind(), user = %op.key(), succeeded, "User operation sent");
        Ok(())
    }

    async fn after_send_all_users(&self) -> SyncResult<()> {
        info!("User operations sent");
        Ok(())
    }
}

/// Build the lifecycle plugin registered under `kind`.
#[must_use]
pub fn build_lifecycle(kind: LifecycleKind) -> Arc<dyn LifecyclePlugin> {
    debug!(plugin = %kind, "Lifecycle plugin enabled");
    match kind {
        LifecycleKind::None => Arc::new(NoLifecycle),
        LifecycleKind::Logging => Arc::new(LoggingLifecycle),
    }
}

/// A lifecycle plugin together with its failure policy.
#[derive(Clone)]
pub struct Hooks {
    plugin: Arc<dyn LifecyclePlugin>,
    policy: FailPolicy,
}

impl Hooks {
    pub fn new(plugin: Arc<dyn LifecyclePlugin>, policy: FailPolicy) -> Self {
        Self { plugin, policy }
    }

    /// No hooks at all.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Arc::new(NoLifecycle), FailPolicy::Continue)
    }

    #[must_use]
    pub fn policy(&self) -> FailPolicy {
        self.policy
    }

    pub async fn before_send_all_users(&self) -> SyncResult<()> {
        let result = self.plugin.before_send_all_users().await;
        self.apply_policy("before_send_all_users", result)
    }

    pub async fn before_send_user(&self, op: &SyncOperation) -> SyncResult<()> {
        let result = self.plugin.before_send_user(op).await;
        self.apply_policy("before_send_user", result)
    }

    pub async fn after_send_user(&self, op: &SyncOperation, succeeded: bool) -> SyncResult<()> {
        let result = self.plugin.after_send_user(op, succeeded).await;
        self.apply_policy("after_send_user", result)
    }

    pub async fn after_send_all_users(&self) -> SyncResult<()> {
        let result = self.plugin.after_send_all_users().await;
        self.apply_policy("after_send_all_users", result)
    }

    /// `Err` only when the failure must stop the batch.
    fn apply_policy(&self, hook: &str, result: SyncResult<()>) -> SyncResult<()> {
        let Err(e) = result else {
            return Ok(());
        };
        match self.policy {
            FailPolicy::Continue => {
                warn!(plugin = %self.plugin.name(), hook, error = %e, "Lifecycle hook failed, continuing");
                Ok(())
            }
            FailPolicy::AbortBatch => {
                error!(plugin = %self.plugin.name(), hook, error = %e, "Lifecycle hook failed, aborting batch");
                Err(match e {
                    SyncError::Hook { .. } => e,
                    other => SyncError::hook(hook, other.to_string()),
                })
            }
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("plugin", &self.plugin.name())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapsync_core::CanonicalUser;

    struct FailingBefore;

    #[async_trait]
    impl LifecyclePlugin for FailingBefore {
        fn name(&self) -> &str {
            "failing"
        }

        async fn before_send_user(&self, _op: &SyncOperation) -> SyncResult<()> {
            Err(SyncError::hook("before_send_user", "quota exceeded"))
        }
    }

    #[test]
    fn test_parse_lifecycle_tags() {
        assert_eq!("none".parse::<LifecycleKind>().unwrap(), LifecycleKind::None);
        assert_eq!("Logging".parse::<LifecycleKind>().unwrap(), LifecycleKind::Logging);
        assert!("audit".parse::<LifecycleKind>().is_err());
    }

    #[test]
    fn test_fail_policy_default() {
        assert_eq!(FailPolicy::default(), FailPolicy::Continue);
    }

    #[test]
    fn test_registry_builds_named_plugins() {
        assert_eq!(build_lifecycle(LifecycleKind::None).name(), "none");
        assert_eq!(build_lifecycle(LifecycleKind::Logging).name(), "logging");
    }

    #[tokio::test]
    async fn test_continue_policy_swallows_failures() {
        let hooks = Hooks::new(Arc::new(FailingBefore), FailPolicy::Continue);
        let op = SyncOperation::Add(CanonicalUser::new("alice"));
        assert!(hooks.before_send_user(&op).await.is_ok());
    }

    #[tokio::test]
    async fn test_abort_policy_propagates_failures() {
        let hooks = Hooks::new(Arc::new(FailingBefore), FailPolicy::AbortBatch);
        let op = SyncOperation::Add(CanonicalUser::new("alice"));
        let err = hooks.before_send_user(&op).await.unwrap_err();
        assert!(matches!(err, SyncError::Hook { .. }));
        assert!(hooks.after_send_user(&op, true).await.is_ok());
    }
}
