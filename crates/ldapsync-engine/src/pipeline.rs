//! One synchronisation cycle, stage by stage.
//!
//! ```text
//! Idle → FetchSource → MapToCanonical → FetchTargetSnapshot → ReconcileUsers
//!      → ApplyUserOps → ReconcileGroups → ApplyGroupOps → Completed
//! ```
//!
//! The group stages only run when group synchronisation is enabled. A stage
//! failure ends the cycle without undoing what was already applied; the next
//! cycle's diff starts again from fresh snapshots. Nothing computed here
//! outlives the cycle.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use ldapsync_core::{
    reconcile_users, CanonicalUser, DirectoryPlugin, GroupPlatform, GroupReconciler, PlanSummary,
    SyncError, SyncResult, TargetGroup, UserPlatform,
};

use crate::executor::{GroupApplyReport, SyncExecutor, UserApplyReport};
use crate::hooks::Hooks;

/// Where a cycle is, or where it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    #[default]
    Idle,
    FetchSource,
    MapToCanonical,
    FetchTargetSnapshot,
    ReconcileUsers,
    ApplyUserOps,
    ReconcileGroups,
    ApplyGroupOps,
    Completed,
}

impl CycleStage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStage::Idle => "idle",
            CycleStage::FetchSource => "fetch_source",
            CycleStage::MapToCanonical => "map_to_canonical",
            CycleStage::FetchTargetSnapshot => "fetch_target_snapshot",
            CycleStage::ReconcileUsers => "reconcile_users",
            CycleStage::ApplyUserOps => "apply_user_ops",
            CycleStage::ReconcileGroups => "reconcile_groups",
            CycleStage::ApplyGroupOps => "apply_group_ops",
            CycleStage::Completed => "completed",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a cycle did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Last stage entered. `Completed` on success.
    pub stage: CycleStage,
    pub source_users: usize,
    /// User plan counts; `None` when the user stages did not run.
    pub users: Option<PlanSummary>,
    pub user_ops: UserApplyReport,
    pub group_additions_planned: usize,
    pub group_removals_planned: usize,
    pub groups: GroupApplyReport,
    pub elapsed: Duration,
    /// Error that ended the cycle early.
    pub error: Option<String>,
}

impl CycleReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// State owned by a single cycle.
#[derive(Default)]
struct CycleContext {
    source: Vec<CanonicalUser>,
    report: CycleReport,
}

impl CycleContext {
    fn enter(&mut self, stage: CycleStage) {
        debug!(stage = %stage, "Entering stage");
        self.report.stage = stage;
    }
}

struct GroupSync {
    platform: Arc<dyn GroupPlatform>,
    reconciler: GroupReconciler,
}

/// The synchronisation pipeline and its collaborators.
pub struct SyncPipeline {
    directory: Arc<dyn DirectoryPlugin>,
    users: Arc<dyn UserPlatform>,
    groups: Option<GroupSync>,
    executor: SyncExecutor,
    skip_when_source_empty: bool,
}

impl SyncPipeline {
    pub fn new(
        directory: Arc<dyn DirectoryPlugin>,
        users: Arc<dyn UserPlatform>,
        hooks: Hooks,
    ) -> Self {
        Self {
            directory,
            users,
            groups: None,
            executor: SyncExecutor::new(hooks),
            skip_when_source_empty: true,
        }
    }

    /// Enable group membership synchronisation.
    #[must_use]
    pub fn with_groups(mut self, platform: Arc<dyn GroupPlatform>, reconciler: GroupReconciler) -> Self {
        self.groups = Some(GroupSync {
            platform,
            reconciler,
        });
        self
    }

    /// Skip the user stages when the directory returns no users.
    #[must_use]
    pub fn skip_when_source_empty(mut self, skip: bool) -> Self {
        self.skip_when_source_empty = skip;
        self
    }

    #[must_use]
    pub fn groups_enabled(&self) -> bool {
        self.groups.is_some()
    }

    /// Run one full cycle. Failures are reported, never returned.
    #[instrument(skip(self), fields(directory = %self.directory.name(), platform = %self.users.name()))]
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        info!("Sync cycle started");

        let mut ctx = CycleContext::default();
        let result = self.run_stages(&mut ctx).await;

        let mut report = ctx.report;
        report.elapsed = started.elapsed();
        match result {
            Ok(()) => {
                report.stage = CycleStage::Completed;
                info!(
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    applied = report.user_ops.applied,
                    failed = report.user_ops.failed,
                    group_added = report.groups.added,
                    group_removed = report.groups.removed,
                    "Sync cycle completed"
                );
            }
            Err(e) => {
                error!(
                    stage = %report.stage,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    error = %e,
                    "Sync cycle aborted"
                );
                report.error = Some(e.to_string());
            }
        }
        report
    }

    async fn run_stages(&self, ctx: &mut CycleContext) -> SyncResult<()> {
        ctx.enter(CycleStage::FetchSource);
        let records = self.directory.fetch_records().await?;

        ctx.enter(CycleStage::MapToCanonical);
        ctx.source = self.directory.map_to_canonical(&records);
        ctx.report.source_users = ctx.source.len();
        debug!(records = records.len(), users = ctx.source.len(), "Directory records mapped");

        if ctx.source.is_empty() && self.skip_when_source_empty {
            warn!("Directory returned no users, skipping user synchronisation");
        } else {
            self.sync_users(ctx).await?;
        }

        if let Some(groups) = &self.groups {
            self.sync_groups(groups, ctx).await?;
        }

        Ok(())
    }

    async fn sync_users(&self, ctx: &mut CycleContext) -> SyncResult<()> {
        let result = match self.users.open_session().await {
            Ok(()) => self.apply_users(ctx).await,
            Err(e) => Err(e),
        };
        if let Err(e) = self.users.close_session().await {
            warn!(error = %e, "Closing platform session failed");
        }
        result
    }

    async fn apply_users(&self, ctx: &mut CycleContext) -> SyncResult<()> {
        ctx.enter(CycleStage::FetchTargetSnapshot);
        let target = self.users.list_users().await?;

        ctx.enter(CycleStage::ReconcileUsers);
        let plan = reconcile_users(&ctx.source, &target);
        let summary = plan.summary(ctx.source.len(), target.len());
        info!(
            source = summary.source_users,
            target = summary.target_users,
            new = summary.add,
            update = summary.update,
            delete = summary.delete,
            unchanged = summary.unchanged,
            "User plan"
        );
        ctx.report.users = Some(summary);

        ctx.enter(CycleStage::ApplyUserOps);
        let applied = self.executor.apply_users(self.users.as_ref(), &plan).await;
        ctx.report.user_ops = applied;
        if applied.aborted {
            return Err(SyncError::hook(
                "lifecycle",
                format!("user batch aborted with {} operations not sent", applied.skipped),
            ));
        }
        Ok(())
    }

    async fn sync_groups(&self, groups: &GroupSync, ctx: &mut CycleContext) -> SyncResult<()> {
        ctx.enter(CycleStage::ReconcileGroups);
        groups.platform.login().await?;
        let result = self.apply_groups(groups, ctx).await;
        if let Err(e) = groups.platform.logout().await {
            warn!(error = %e, "Platform logout failed");
        }
        result
    }

    async fn apply_groups(&self, groups: &GroupSync, ctx: &mut CycleContext) -> SyncResult<()> {
        let platform = groups.platform.as_ref();

        let user_ids: HashMap<String, String> = platform
            .list_platform_users()
            .await?
            .into_iter()
            .map(|user| (user.key, user.id))
            .collect();

        let refs = platform.list_groups().await?;
        let mut snapshot = Vec::with_capacity(refs.len());
        for group_ref in refs {
            let members = platform.list_group_members(&group_ref.id).await?;
            let mut group = TargetGroup::new(group_ref.id, group_ref.name);
            group.members = members;
            snapshot.push(group);
        }

        let plan = groups.reconciler.reconcile(&ctx.source, &user_ids, &snapshot);
        ctx.report.group_additions_planned = plan.added_count();
        ctx.report.group_removals_planned = plan.removed_count();
        info!(
            groups = snapshot.len(),
            additions = plan.added_count(),
            removals = plan.removed_count(),
            "Group plan"
        );

        ctx.enter(CycleStage::ApplyGroupOps);
        ctx.report.groups = self.executor.apply_groups(platform, &plan).await;
        Ok(())
    }
}

impl fmt::Debug for SyncPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPipeline")
            .field("directory", &self.directory.name())
            .field("users", &self.users.name())
            .field("groups", &self.groups.is_some())
            .field("executor", &self.executor)
            .field("skip_when_source_empty", &self.skip_when_source_empty)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use ldapsync_core::{
        CommonRules, FieldMapper, GroupRef, MappingEntry, MappingTable, RawRecord, SubmitResponse,
        SyncOperation, TargetUser,
    };
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Directory serving fixed records, or failing.
    pub(crate) struct FakeDirectory {
        mapper: FieldMapper,
        records: Option<Vec<RawRecord>>,
        pub(crate) fetches: AtomicUsize,
    }

    impl FakeDirectory {
        pub(crate) fn with_records(records: Vec<RawRecord>) -> Self {
            let mut table = MappingTable::new();
            table.insert("userName".into(), MappingEntry::Text("${uid}".into()));
            table.insert("displayName".into(), MappingEntry::Text("${cn}".into()));
            table.insert("memberOf".into(), MappingEntry::Text("${memberOf}".into()));
            Self {
                mapper: FieldMapper::compile(&table, &CommonRules).unwrap(),
                records: Some(records),
                fetches: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            let mut dir = Self::with_records(Vec::new());
            dir.records = None;
            dir
        }
    }

    #[async_trait]
    impl DirectoryPlugin for FakeDirectory {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch_records(&self) -> SyncResult<Vec<RawRecord>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.records
                .clone()
                .ok_or_else(|| SyncError::directory("bind failed"))
        }

        fn mapper(&self) -> &FieldMapper {
            &self.mapper
        }
    }

    pub(crate) fn person(uid: &str, cn: &str, groups: &[&str]) -> RawRecord {
        RawRecord::new(format!("uid={uid},ou=people"))
            .with_text("uid", &[uid])
            .with_text("cn", &[cn])
            .with_text("memberOf", groups)
    }

    /// Platform recording every call it receives.
    #[derive(Default)]
    pub(crate) struct FakePlatform {
        users: Vec<TargetUser>,
        groups: Vec<TargetGroup>,
        fail_listing: bool,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl FakePlatform {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn mutations(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with("submit") || c.starts_with("update_group"))
                .collect()
        }
    }

    #[async_trait]
    impl UserPlatform for FakePlatform {
        fn name(&self) -> &str {
            "fake"
        }

        async fn list_users(&self) -> SyncResult<Vec<TargetUser>> {
            self.record("list_users".into());
            if self.fail_listing {
                return Err(SyncError::platform(Some(503), "unavailable"));
            }
            Ok(self.users.clone())
        }

        async fn submit_user(&self, op: &SyncOperation) -> SyncResult<SubmitResponse> {
            self.record(format!("submit {} {}", op.kind(), op.key()));
            Ok(SubmitResponse {
                status: 200,
                returned_user: None,
            })
        }

        async fn open_session(&self) -> SyncResult<()> {
            self.record("open_session".into());
            Ok(())
        }

        async fn close_session(&self) -> SyncResult<()> {
            self.record("close_session".into());
            Ok(())
        }
    }

    #[async_trait]
    impl GroupPlatform for FakePlatform {
        async fn login(&self) -> SyncResult<()> {
            self.record("login".into());
            Ok(())
        }

        async fn logout(&self) -> SyncResult<()> {
            self.record("logout".into());
            Ok(())
        }

        async fn list_platform_users(&self) -> SyncResult<Vec<TargetUser>> {
            self.record("list_platform_users".into());
            if self.fail_listing {
                return Err(SyncError::platform(Some(503), "unavailable"));
            }
            Ok(self.users.clone())
        }

        async fn list_groups(&self) -> SyncResult<Vec<GroupRef>> {
            Ok(self
                .groups
                .iter()
                .map(|g| GroupRef {
                    id: g.id.clone(),
                    name: g.name.clone(),
                })
                .collect())
        }

        async fn list_group_members(&self, group_id: &str) -> SyncResult<BTreeMap<String, bool>> {
            Ok(self
                .groups
                .iter()
                .find(|g| g.id == group_id)
                .map(|g| g.members.clone())
                .unwrap_or_default())
        }

        async fn update_group_members(
            &self,
            group_id: &str,
            add_user_ids: &[String],
            remove_user_ids: &[String],
        ) -> SyncResult<()> {
            self.record(format!(
                "update_group {group_id} add={} remove={}",
                add_user_ids.join(","),
                remove_user_ids.join(",")
            ));
            Ok(())
        }
    }

    fn pipeline(directory: FakeDirectory, platform: Arc<FakePlatform>) -> SyncPipeline {
        SyncPipeline::new(Arc::new(directory), platform, Hooks::none())
    }

    #[tokio::test]
    async fn test_cycle_applies_user_plan() {
        let platform = Arc::new(FakePlatform {
            users: vec![
                TargetUser::new("1", "bob"),
                TargetUser::new("2", "alice").with_attribute("displayName", "Alice"),
            ],
            ..Default::default()
        });
        let directory = FakeDirectory::with_records(vec![
            person("alice", "Alice A", &[]),
            person("carol", "Carol", &[]),
        ]);

        let report = pipeline(directory, platform.clone()).run_cycle().await;

        assert!(report.is_success());
        assert_eq!(report.stage, CycleStage::Completed);
        let summary = report.users.unwrap();
        assert_eq!((summary.add, summary.update, summary.delete), (1, 1, 1));
        assert_eq!(report.user_ops.applied, 3);
        assert_eq!(
            platform.calls(),
            vec![
                "open_session",
                "list_users",
                "submit delete bob",
                "submit update alice",
                "submit add carol",
                "close_session",
            ]
        );
    }

    #[tokio::test]
    async fn test_directory_failure_aborts_before_mutation() {
        let platform = Arc::new(FakePlatform::default());
        let report = pipeline(FakeDirectory::failing(), platform.clone())
            .run_cycle()
            .await;

        assert!(!report.is_success());
        assert_eq!(report.stage, CycleStage::FetchSource);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_skips_user_stages() {
        let platform = Arc::new(FakePlatform {
            users: vec![TargetUser::new("1", "bob")],
            ..Default::default()
        });
        let report = pipeline(FakeDirectory::with_records(Vec::new()), platform.clone())
            .run_cycle()
            .await;

        assert!(report.is_success());
        assert!(report.users.is_none());
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_deactivates_when_guard_disabled() {
        let platform = Arc::new(FakePlatform {
            users: vec![TargetUser::new("1", "bob")],
            ..Default::default()
        });
        let report = pipeline(FakeDirectory::with_records(Vec::new()), platform.clone())
            .skip_when_source_empty(false)
            .run_cycle()
            .await;

        assert_eq!(report.users.unwrap().delete, 1);
        assert_eq!(platform.mutations(), vec!["submit delete bob"]);
    }

    #[tokio::test]
    async fn test_session_closed_when_snapshot_fails() {
        let platform = Arc::new(FakePlatform {
            fail_listing: true,
            ..Default::default()
        });
        let directory = FakeDirectory::with_records(vec![person("alice", "Alice", &[])]);
        let report = pipeline(directory, platform.clone()).run_cycle().await;

        assert_eq!(report.stage, CycleStage::FetchTargetSnapshot);
        assert_eq!(platform.calls(), vec!["open_session", "list_users", "close_session"]);
    }

    fn group_pipeline(directory: FakeDirectory, platform: Arc<FakePlatform>, auto_removal: bool) -> SyncPipeline {
        let reconciler = GroupReconciler::new(None, auto_removal).unwrap();
        pipeline(directory, platform.clone()).with_groups(platform, reconciler)
    }

    #[tokio::test]
    async fn test_user_added_to_matching_group() {
        let platform = Arc::new(FakePlatform {
            users: vec![TargetUser::new("5", "alice").with_attribute("displayName", "Alice")],
            groups: vec![TargetGroup::new("9", "DataScience")],
            ..Default::default()
        });
        let directory = FakeDirectory::with_records(vec![person(
            "alice",
            "Alice",
            &["CN=DataScience,OU=Groups,DC=corp"],
        )]);

        let report = group_pipeline(directory, platform.clone(), false)
            .run_cycle()
            .await;

        assert!(report.is_success());
        assert_eq!(report.group_additions_planned, 1);
        assert_eq!(report.groups.added, 1);
        assert_eq!(platform.mutations(), vec!["update_group 9 add=5 remove="]);
    }

    #[tokio::test]
    async fn test_remote_member_removed_only_with_auto_removal() {
        let groups = vec![TargetGroup::new("9", "DataScience")
            .with_member("5", true)
            .with_member("6", false)];
        let users = vec![
            TargetUser::new("5", "alice").with_attribute("displayName", "Alice"),
            TargetUser::new("6", "bob").with_attribute("displayName", "Bob"),
        ];

        for (auto_removal, expected) in [
            (true, vec!["update_group 9 add= remove=5"]),
            (false, Vec::new()),
        ] {
            let platform = Arc::new(FakePlatform {
                users: users.clone(),
                groups: groups.clone(),
                ..Default::default()
            });
            let directory = FakeDirectory::with_records(vec![
                person("alice", "Alice", &[]),
                person("bob", "Bob", &[]),
            ]);
            group_pipeline(directory, platform.clone(), auto_removal)
                .run_cycle()
                .await;
            assert_eq!(platform.mutations(), expected);
        }
    }

    #[tokio::test]
    async fn test_logout_after_group_failure() {
        let platform = Arc::new(FakePlatform {
            fail_listing: true,
            ..Default::default()
        });
        let report = group_pipeline(FakeDirectory::with_records(Vec::new()), platform.clone(), true)
            .run_cycle()
            .await;

        assert_eq!(report.stage, CycleStage::ReconcileGroups);
        assert!(!report.is_success());
        assert_eq!(platform.calls(), vec!["login", "list_platform_users", "logout"]);
    }
}
