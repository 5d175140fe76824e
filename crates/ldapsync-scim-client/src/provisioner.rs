//! User provisioning over SCIM.

use async_trait::async_trait;
use std::time::Instant;
use tracing::{info, warn};

use ldapsync_core::{SubmitResponse, SyncOperation, SyncResult, TargetUser, UserPlatform};

use crate::client::{ScimClient, ScimResponse};
use crate::config::ScimConfig;
use crate::error::ScimClientResult;
use crate::resource::{target_user, user_resource};

/// [`UserPlatform`] backed by a SCIM 2.0 endpoint.
///
/// Each operation maps to one request:
///
/// | operation | request                                   |
/// |-----------|-------------------------------------------|
/// | add       | `POST /Users` with the full resource      |
/// | update    | `PUT /Users/{id}` with the full resource  |
/// | delete    | `PATCH /Users/{id}` setting `active=false`|
///
/// Users are never hard-deleted.
pub struct ScimProvisioner {
    client: ScimClient,
}

impl ScimProvisioner {
    #[must_use]
    pub fn new(client: ScimClient) -> Self {
        Self { client }
    }

    /// Build a provisioner from configuration.
    pub fn from_config(config: &ScimConfig) -> ScimClientResult<Self> {
        Ok(Self::new(ScimClient::new(config)?))
    }

    #[must_use]
    pub fn client(&self) -> &ScimClient {
        &self.client
    }

    async fn send(&self, op: &SyncOperation) -> ScimClientResult<ScimResponse> {
        match op {
            SyncOperation::Add(user) => self.client.create_user(&user_resource(user, None)).await,
            SyncOperation::Update { id, user } => {
                self.client
                    .replace_user(id, &user_resource(user, Some(id)))
                    .await
            }
            SyncOperation::Delete { id, .. } => self.client.deactivate_user(id).await,
        }
    }
}

#[async_trait]
impl UserPlatform for ScimProvisioner {
    fn name(&self) -> &str {
        "scim"
    }

    async fn list_users(&self) -> SyncResult<Vec<TargetUser>> {
        let resources = self.client.list_all_users().await?;
        let total = resources.len();
        let users: Vec<TargetUser> = resources.iter().filter_map(target_user).collect();
        if users.len() < total {
            warn!(
                skipped = total - users.len(),
                "SCIM resources without id or userName were ignored"
            );
        }
        Ok(users)
    }

    async fn submit_user(&self, op: &SyncOperation) -> SyncResult<SubmitResponse> {
        let started = Instant::now();
        let response = self.send(op).await?;

        info!(
            op = %op.kind(),
            user = %op.key(),
            status = response.status,
            duration_ms = started.elapsed().as_millis() as u64,
            "SCIM operation accepted"
        );

        Ok(SubmitResponse {
            status: response.status,
            returned_user: response.body.as_ref().and_then(target_user),
        })
    }
}
