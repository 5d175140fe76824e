//! Assembles the pipeline from configuration.

use std::sync::Arc;
use tracing::info;

use ldapsync_connector_ldap::build_directory;
use ldapsync_core::{GroupPlatform, GroupReconciler, UserPlatform};
use ldapsync_scim_client::ScimProvisioner;
use ldapsync_session_client::SessionClient;

use crate::config::{SyncConfig, UserApi};
use crate::error::{ConfigError, EngineResult};
use crate::hooks::{build_lifecycle, Hooks, LifecycleKind};
use crate::pipeline::SyncPipeline;

/// Build a ready-to-run pipeline. The configuration is expected to have
/// been validated.
pub fn build_pipeline(config: &SyncConfig) -> EngineResult<SyncPipeline> {
    let directory = build_directory(
        config.directory.kind()?,
        config.directory.ldap.clone(),
        &config.mapping,
    )?;

    // Created lazily so both APIs share one session client.
    let mut session: Option<Arc<SessionClient>> = None;
    let mut session_client = || -> EngineResult<Arc<SessionClient>> {
        if let Some(client) = &session {
            return Ok(client.clone());
        }
        let settings = config
            .platform
            .session
            .clone()
            .ok_or_else(|| ConfigError::Missing("platform.session".to_string()))?;
        let client = Arc::new(SessionClient::new(settings)?);
        session = Some(client.clone());
        Ok(client)
    };

    let users: Arc<dyn UserPlatform> = match config.platform.user_api {
        UserApi::Scim => {
            let scim = config
                .platform
                .scim
                .as_ref()
                .ok_or_else(|| ConfigError::Missing("platform.scim".to_string()))?;
            Arc::new(ScimProvisioner::from_config(scim)?)
        }
        UserApi::Session => session_client()?,
    };

    let lifecycle: LifecycleKind = config
        .hooks
        .lifecycle
        .parse()
        .map_err(|tag| ConfigError::UnknownPlugin {
            kind: "lifecycle",
            tag,
        })?;
    let hooks = Hooks::new(build_lifecycle(lifecycle), config.hooks.fail_policy);

    let mut pipeline = SyncPipeline::new(directory, users, hooks)
        .skip_when_source_empty(config.sync.skip_when_source_empty);

    if config.groups.enabled {
        let platform: Arc<dyn GroupPlatform> = session_client()?;
        let reconciler =
            GroupReconciler::new(config.groups.name_pattern.as_deref(), config.groups.auto_removal)?;
        pipeline = pipeline.with_groups(platform, reconciler);
    }

    info!(
        user_api = ?config.platform.user_api,
        groups = pipeline.groups_enabled(),
        lifecycle = %lifecycle,
        fail_policy = ?config.hooks.fail_policy,
        "Pipeline ready"
    );
    Ok(pipeline)
}
