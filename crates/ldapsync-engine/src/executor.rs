//! Applies reconciliation plans to the platform.

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use ldapsync_core::{GroupPlan, GroupPlatform, UserPlan, UserPlatform};

use crate::hooks::Hooks;

/// Outcome of applying a user plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserApplyReport {
    pub applied: usize,
    pub failed: usize,
    /// Operations never sent because a hook aborted the batch.
    pub skipped: usize,
    pub aborted: bool,
}

/// Outcome of applying a group plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupApplyReport {
    /// Memberships added by successful calls.
    pub added: usize,
    /// Memberships removed by successful calls.
    pub removed: usize,
    /// Membership update calls that failed.
    pub failed_calls: usize,
}

/// Sends operations one at a time, in plan order.
///
/// A failed platform call abandons that operation only. Nothing is retried
/// here; the next cycle's diff picks up whatever did not apply.
#[derive(Debug, Clone)]
pub struct SyncExecutor {
    hooks: Hooks,
}

impl SyncExecutor {
    pub fn new(hooks: Hooks) -> Self {
        Self { hooks }
    }

    /// Apply user operations in the order delete, update, add, with the
    /// lifecycle hooks around the batch and around each operation.
    #[instrument(skip_all, fields(platform = %platform.name(), operations = plan.len()))]
    pub async fn apply_users(&self, platform: &dyn UserPlatform, plan: &UserPlan) -> UserApplyReport {
        let mut report = UserApplyReport::default();

        if self.hooks.before_send_all_users().await.is_err() {
            report.aborted = true;
            report.skipped = plan.len();
            return report;
        }

        for op in plan.in_apply_order() {
            if self.hooks.before_send_user(op).await.is_err() {
                report.aborted = true;
                break;
            }

            let succeeded = match platform.submit_user(op).await {
                Ok(response) => {
                    debug!(op = %op.kind(), user = %op.key(), status = response.status, "User operation applied");
                    report.applied += 1;
                    true
                }
                Err(e) => {
                    error!(op = %op.kind(), user = %op.key(), error = %e, "User operation failed");
                    report.failed += 1;
                    false
                }
            };

            if self.hooks.after_send_user(op, succeeded).await.is_err() {
                report.aborted = true;
                break;
            }
        }

        report.skipped = plan.len() - report.applied - report.failed;

        if let Err(e) = self.hooks.after_send_all_users().await {
            warn!(error = %e, "after_send_all_users hook failed");
        }

        info!(
            applied = report.applied,
            failed = report.failed,
            skipped = report.skipped,
            "User operations done"
        );
        report
    }

    /// Apply group memberships: every addition first, then every removal,
    /// one call per group and direction. No hooks run here.
    #[instrument(skip_all, fields(additions = plan.additions.len(), removals = plan.removals.len()))]
    pub async fn apply_groups(&self, platform: &dyn GroupPlatform, plan: &GroupPlan) -> GroupApplyReport {
        let mut report = GroupApplyReport::default();

        for delta in plan.additions.iter().filter(|d| !d.add_user_ids.is_empty()) {
            match platform
                .update_group_members(&delta.group_id, &delta.add_user_ids, &[])
                .await
            {
                Ok(()) => report.added += delta.add_user_ids.len(),
                Err(e) => {
                    error!(group_id = %delta.group_id, error = %e, "Adding group members failed");
                    report.failed_calls += 1;
                }
            }
        }

        for delta in plan.removals.iter().filter(|d| !d.remove_user_ids.is_empty()) {
            match platform
                .update_group_members(&delta.group_id, &[], &delta.remove_user_ids)
                .await
            {
                Ok(()) => report.removed += delta.remove_user_ids.len(),
                Err(e) => {
                    error!(group_id = %delta.group_id, error = %e, "Removing group members failed");
                    report.failed_calls += 1;
                }
            }
        }

        info!(
            added = report.added,
            removed = report.removed,
            failed_calls = report.failed_calls,
            "Group memberships done"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::FailPolicy;
    use async_trait::async_trait;
    use ldapsync_core::{
        CanonicalUser, GroupMembershipDelta, GroupRef, LifecyclePlugin, SubmitResponse,
        SyncError, SyncOperation, SyncResult, TargetUser,
    };
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        reject: Vec<String>,
    }

    impl Recorder {
        fn rejecting(keys: &[&str]) -> Self {
            Self {
                calls: Mutex::default(),
                reject: keys.iter().map(|k| (*k).to_string()).collect(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UserPlatform for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn list_users(&self) -> SyncResult<Vec<TargetUser>> {
            Ok(Vec::new())
        }

        async fn submit_user(&self, op: &SyncOperation) -> SyncResult<SubmitResponse> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", op.kind(), op.key()));
            if self.reject.iter().any(|k| k == op.key()) {
                return Err(SyncError::platform(Some(400), "rejected"));
            }
            Ok(SubmitResponse {
                status: 200,
                returned_user: None,
            })
        }
    }

    #[async_trait]
    impl GroupPlatform for Recorder {
        async fn login(&self) -> SyncResult<()> {
            Ok(())
        }

        async fn logout(&self) -> SyncResult<()> {
            Ok(())
        }

        async fn list_platform_users(&self) -> SyncResult<Vec<TargetUser>> {
            Ok(Vec::new())
        }

        async fn list_groups(&self) -> SyncResult<Vec<GroupRef>> {
            Ok(Vec::new())
        }

        async fn list_group_members(&self, _group_id: &str) -> SyncResult<BTreeMap<String, bool>> {
            Ok(BTreeMap::new())
        }

        async fn update_group_members(
            &self,
            group_id: &str,
            add_user_ids: &[String],
            remove_user_ids: &[String],
        ) -> SyncResult<()> {
            self.calls.lock().unwrap().push(format!(
                "group {group_id} +{:?} -{:?}",
                add_user_ids, remove_user_ids
            ));
            if self.reject.iter().any(|g| g == group_id) {
                return Err(SyncError::platform(Some(500), "boom"));
            }
            Ok(())
        }
    }

    fn plan() -> UserPlan {
        UserPlan {
            add: vec![SyncOperation::Add(CanonicalUser::new("carol"))],
            update: vec![SyncOperation::Update {
                id: "2".into(),
                user: CanonicalUser::new("bob"),
            }],
            delete: vec![SyncOperation::Delete {
                id: "1".into(),
                key: "alice".into(),
            }],
            unchanged: 0,
        }
    }

    #[tokio::test]
    async fn test_operations_applied_delete_update_add() {
        let platform = Recorder::default();
        let report = SyncExecutor::new(Hooks::none())
            .apply_users(&platform, &plan())
            .await;

        assert_eq!(platform.calls(), vec!["delete:alice", "update:bob", "add:carol"]);
        assert_eq!(report.applied, 3);
        assert_eq!(report.failed, 0);
        assert!(!report.aborted);
    }

    #[tokio::test]
    async fn test_failed_operation_does_not_stop_batch() {
        let platform = Recorder::rejecting(&["bob"]);
        let report = SyncExecutor::new(Hooks::none())
            .apply_users(&platform, &plan())
            .await;

        assert_eq!(platform.calls().len(), 3);
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 0);
    }

    struct Tracing {
        events: Mutex<Vec<String>>,
        fail_before: Option<String>,
    }

    #[async_trait]
    impl LifecyclePlugin for Tracing {
        fn name(&self) -> &str {
            "tracing"
        }

        async fn before_send_all_users(&self) -> SyncResult<()> {
            self.events.lock().unwrap().push("begin".into());
            Ok(())
        }

        async fn before_send_user(&self, op: &SyncOperation) -> SyncResult<()> {
            self.events.lock().unwrap().push(format!("before {}", op.key()));
            if self.fail_before.as_deref() == Some(op.key()) {
                return Err(SyncError::hook("before_send_user", "refused"));
            }
            Ok(())
        }

        async fn after_send_user(&self, op: &SyncOperation, succeeded: bool) -> SyncResult<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("after {} {succeeded}", op.key()));
            Ok(())
        }

        async fn after_send_all_users(&self) -> SyncResult<()> {
            self.events.lock().unwrap().push("end".into());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hooks_bracket_batch_and_operations() {
        let plugin = Arc::new(Tracing {
            events: Mutex::default(),
            fail_before: None,
        });
        let platform = Recorder::rejecting(&["carol"]);
        SyncExecutor::new(Hooks::new(plugin.clone(), FailPolicy::Continue))
            .apply_users(&platform, &plan())
            .await;

        assert_eq!(
            *plugin.events.lock().unwrap(),
            vec![
                "begin",
                "before alice",
                "after alice true",
                "before bob",
                "after bob true",
                "before carol",
                "after carol false",
                "end"
            ]
        );
    }

    #[tokio::test]
    async fn test_abort_policy_skips_remaining_operations() {
        let plugin = Arc::new(Tracing {
            events: Mutex::default(),
            fail_before: Some("bob".into()),
        });
        let platform = Recorder::default();
        let report = SyncExecutor::new(Hooks::new(plugin.clone(), FailPolicy::AbortBatch))
            .apply_users(&platform, &plan())
            .await;

        assert_eq!(platform.calls(), vec!["delete:alice"]);
        assert!(report.aborted);
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(plugin.events.lock().unwrap().last().unwrap(), "end");
    }

    #[tokio::test]
    async fn test_continue_policy_sends_despite_hook_failure() {
        let plugin = Arc::new(Tracing {
            events: Mutex::default(),
            fail_before: Some("bob".into()),
        });
        let platform = Recorder::default();
        let report = SyncExecutor::new(Hooks::new(plugin, FailPolicy::Continue))
            .apply_users(&platform, &plan())
            .await;

        assert_eq!(report.applied, 3);
        assert!(!report.aborted);
    }

    #[tokio::test]
    async fn test_group_additions_before_removals() {
        let platform = Recorder::rejecting(&["7"]);
        let mut add9 = GroupMembershipDelta::new("9");
        add9.add_user_ids = vec!["5".into(), "6".into()];
        let mut add7 = GroupMembershipDelta::new("7");
        add7.add_user_ids = vec!["5".into()];
        let mut remove9 = GroupMembershipDelta::new("9");
        remove9.remove_user_ids = vec!["3".into()];

        let group_plan = GroupPlan {
            additions: vec![add9, add7],
            removals: vec![remove9],
        };
        let report = SyncExecutor::new(Hooks::none())
            .apply_groups(&platform, &group_plan)
            .await;

        assert_eq!(
            platform.calls(),
            vec![
                "group 9 +[\"5\", \"6\"] -[]",
                "group 7 +[\"5\"] -[]",
                "group 9 +[] -[\"3\"]",
            ]
        );
        assert_eq!(report.added, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed_calls, 1);
    }
}
