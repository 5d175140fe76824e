//! Capability trait implementations for [`SessionClient`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::warn;

use ldapsync_core::{
    AttributeValue, GroupPlatform, GroupRef, SubmitResponse, SyncOperation, SyncResult,
    TargetUser, UserPlatform,
};

use crate::client::SessionClient;
use crate::error::{SessionClientError, SessionClientResult};
use crate::models::{ApiUser, PatchUserRequest};

/// The only user attribute the session API stores besides the login name.
const DISPLAY_NAME: &str = "displayName";

fn target_user(user: ApiUser) -> Option<TargetUser> {
    let id = user.id?;
    let mut target = TargetUser::new(id.to_string(), user.username).with_active(user.active);
    if let Some(display_name) = user.display_name {
        target = target.with_attribute(DISPLAY_NAME, display_name);
    }
    Some(target)
}

fn parse_id(id: &str) -> SessionClientResult<i64> {
    id.trim()
        .parse()
        .map_err(|_| SessionClientError::InvalidId(id.to_string()))
}

fn parse_ids(ids: &[String]) -> SessionClientResult<Vec<i64>> {
    ids.iter().map(|id| parse_id(id)).collect()
}

impl SessionClient {
    async fn platform_users(&self) -> SessionClientResult<Vec<TargetUser>> {
        let users = self.get_users().await?;
        let total = users.len();
        let targets: Vec<TargetUser> = users.into_iter().filter_map(target_user).collect();
        if targets.len() < total {
            warn!(skipped = total - targets.len(), "Platform users without id ignored");
        }
        Ok(targets)
    }
}

#[async_trait]
impl UserPlatform for SessionClient {
    fn name(&self) -> &str {
        "session"
    }

    async fn list_users(&self) -> SyncResult<Vec<TargetUser>> {
        Ok(self.platform_users().await?)
    }

    async fn submit_user(&self, op: &SyncOperation) -> SyncResult<SubmitResponse> {
        let (status, returned) = match op {
            SyncOperation::Add(user) => {
                let api_user = ApiUser {
                    id: None,
                    username: user.key.clone(),
                    display_name: user.attributes.get(DISPLAY_NAME).map(AttributeValue::to_string),
                    active: user.active,
                    remote: true,
                };
                self.create_user(&api_user).await?
            }
            SyncOperation::Update { id, user } => {
                let display_name = user.attributes.get(DISPLAY_NAME).map(AttributeValue::to_string);
                let patch = PatchUserRequest {
                    display_name: display_name.as_deref(),
                    active: user.active,
                    remote: Some(true),
                };
                self.patch_user(parse_id(id)?, &patch).await?
            }
            SyncOperation::Delete { id, .. } => {
                let patch = PatchUserRequest {
                    active: false,
                    ..PatchUserRequest::default()
                };
                self.patch_user(parse_id(id)?, &patch).await?
            }
        };

        Ok(SubmitResponse {
            status,
            returned_user: returned.and_then(target_user),
        })
    }

    async fn open_session(&self) -> SyncResult<()> {
        Ok(SessionClient::login(self).await?)
    }

    async fn close_session(&self) -> SyncResult<()> {
        Ok(SessionClient::logout(self).await?)
    }
}

#[async_trait]
impl GroupPlatform for SessionClient {
    async fn login(&self) -> SyncResult<()> {
        Ok(SessionClient::login(self).await?)
    }

    async fn logout(&self) -> SyncResult<()> {
        Ok(SessionClient::logout(self).await?)
    }

    async fn list_platform_users(&self) -> SyncResult<Vec<TargetUser>> {
        Ok(self.platform_users().await?)
    }

    async fn list_groups(&self) -> SyncResult<Vec<GroupRef>> {
        let groups = self.search_groups().await?;
        Ok(groups
            .into_iter()
            .map(|group| GroupRef {
                id: group.group_id.to_string(),
                name: group.name,
            })
            .collect())
    }

    async fn list_group_members(&self, group_id: &str) -> SyncResult<BTreeMap<String, bool>> {
        let group = self.get_group(parse_id(group_id)?).await?;
        Ok(group
            .users
            .into_iter()
            .filter_map(|user| user.id.map(|id| (id.to_string(), user.remote)))
            .collect())
    }

    async fn update_group_members(
        &self,
        group_id: &str,
        add_user_ids: &[String],
        remove_user_ids: &[String],
    ) -> SyncResult<()> {
        let group_id = parse_id(group_id)?;
        let add = parse_ids(add_user_ids)?;
        let remove = parse_ids(remove_user_ids)?;
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }
        Ok(self.update_group(group_id, add, remove).await?)
    }
}
