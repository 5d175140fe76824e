//! Capability contracts for the pipeline's collaborators.
//!
//! Concrete implementations are picked at startup from a registry keyed by
//! a configuration tag and are used through these traits only.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::mapping::FieldMapper;
use crate::model::{CanonicalUser, GroupRef, RawRecord, SyncOperation, TargetUser};

/// A directory source, specialised per vendor.
#[async_trait]
pub trait DirectoryPlugin: Send + Sync {
    /// Registry tag of the plugin.
    fn name(&self) -> &str;

    /// Bind, search and return the raw user entries.
    async fn fetch_records(&self) -> SyncResult<Vec<RawRecord>>;

    /// Mapper compiled with this vendor's rules.
    fn mapper(&self) -> &FieldMapper;

    /// Called for every fetched record before mapping.
    fn handle_raw_record(&self, record: &RawRecord) {
        debug!(dn = %record.dn, attributes = record.len(), "Directory record");
    }

    /// Map raw records to canonical users.
    ///
    /// Records without a login name are dropped, and only the first record
    /// is kept when several map to the same login name, so keys stay unique
    /// within the snapshot.
    fn map_to_canonical(&self, records: &[RawRecord]) -> Vec<CanonicalUser> {
        let mapper = self.mapper();
        let mut seen = HashSet::with_capacity(records.len());
        let mut users = Vec::with_capacity(records.len());

        for record in records {
            self.handle_raw_record(record);
            let user = mapper.map(record);
            if user.key.is_empty() {
                warn!(dn = %record.dn, "Record has no login name, skipping");
                continue;
            }
            if !seen.insert(user.key.clone()) {
                warn!(dn = %record.dn, key = %user.key, "Duplicate login name, skipping");
                continue;
            }
            users.push(user);
        }

        users
    }
}

/// Optional hooks around the user operations of a cycle.
///
/// Every hook defaults to a no-op.
#[async_trait]
pub trait LifecyclePlugin: Send + Sync {
    fn name(&self) -> &str;

    async fn before_send_all_users(&self) -> SyncResult<()> {
        Ok(())
    }

    async fn before_send_user(&self, op: &SyncOperation) -> SyncResult<()> {
        let _ = op;
        Ok(())
    }

    /// `succeeded` tells whether the platform accepted the operation.
    async fn after_send_user(&self, op: &SyncOperation, succeeded: bool) -> SyncResult<()> {
        let _ = (op, succeeded);
        Ok(())
    }

    async fn after_send_all_users(&self) -> SyncResult<()> {
        Ok(())
    }
}

/// Platform answer to a user submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponse {
    /// HTTP status returned by the platform.
    pub status: u16,
    /// The user as stored by the platform, when it was echoed back.
    pub returned_user: Option<TargetUser>,
}

/// User management side of the target platform.
#[async_trait]
pub trait UserPlatform: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Snapshot of every user on the platform.
    async fn list_users(&self) -> SyncResult<Vec<TargetUser>>;

    /// Apply one operation. Deletions deactivate the user.
    async fn submit_user(&self, op: &SyncOperation) -> SyncResult<SubmitResponse>;

    /// Open a session if the platform needs one. Default: nothing to do.
    async fn open_session(&self) -> SyncResult<()> {
        Ok(())
    }

    /// Close the session opened by [`UserPlatform::open_session`].
    async fn close_session(&self) -> SyncResult<()> {
        Ok(())
    }
}

/// Group management side of the target platform, behind a session token.
///
/// The token obtained by [`GroupPlatform::login`] is held by the
/// implementation until [`GroupPlatform::logout`].
#[async_trait]
pub trait GroupPlatform: Send + Sync {
    async fn login(&self) -> SyncResult<()>;

    async fn logout(&self) -> SyncResult<()>;

    /// Users known to the platform, used to resolve login names to ids.
    async fn list_platform_users(&self) -> SyncResult<Vec<TargetUser>>;

    async fn list_groups(&self) -> SyncResult<Vec<GroupRef>>;

    /// Current members of a group: user id to remote flag.
    async fn list_group_members(&self, group_id: &str) -> SyncResult<BTreeMap<String, bool>>;

    /// Add and remove members of one group in a single call.
    async fn update_group_members(
        &self,
        group_id: &str,
        add_user_ids: &[String],
        remove_user_ids: &[String],
    ) -> SyncResult<()>;
}
