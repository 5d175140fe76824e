//! Group membership reconciliation.
//!
//! Directory group references (`CN=DataScience,OU=Groups,DC=example,DC=com`)
//! are reduced to a group name with a configurable pattern, resolved to
//! platform group ids, and compared with the current platform membership.
//!
//! Memberships carry a remote flag. Only remote memberships, the ones this
//! process created, are ever removed; members added by hand on the platform
//! are left alone.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::model::{CanonicalUser, GroupMembershipDelta, TargetGroup};

/// Default extraction pattern: the first `CN=` component up to the first comma.
pub const DEFAULT_GROUP_NAME_PATTERN: &str = r"^CN=(.+?),";

/// Membership changes for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPlan {
    /// Per-group additions, in snapshot group order.
    pub additions: Vec<GroupMembershipDelta>,
    /// Per-group removals, in snapshot group order. Always empty when
    /// auto-removal is disabled.
    pub removals: Vec<GroupMembershipDelta>,
}

impl GroupPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    #[must_use]
    pub fn added_count(&self) -> usize {
        self.additions.iter().map(|d| d.add_user_ids.len()).sum()
    }

    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.removals.iter().map(|d| d.remove_user_ids.len()).sum()
    }
}

/// Computes group membership changes from canonical users.
#[derive(Debug, Clone)]
pub struct GroupReconciler {
    pattern: Regex,
    auto_removal: bool,
}

impl GroupReconciler {
    /// Create a reconciler. `pattern` defaults to [`DEFAULT_GROUP_NAME_PATTERN`].
    pub fn new(pattern: Option<&str>, auto_removal: bool) -> SyncResult<Self> {
        let source = pattern.unwrap_or(DEFAULT_GROUP_NAME_PATTERN);
        let pattern = Regex::new(source).map_err(|e| SyncError::InvalidGroupPattern {
            pattern: source.to_string(),
            source: e,
        })?;
        Ok(Self {
            pattern,
            auto_removal,
        })
    }

    #[must_use]
    pub fn auto_removal(&self) -> bool {
        self.auto_removal
    }

    /// Extract the group name from a raw reference.
    ///
    /// Uses the first capture group, or the whole match when the pattern
    /// has none.
    #[must_use]
    pub fn extract_group_name<'a>(&self, reference: &'a str) -> Option<&'a str> {
        let captures = self.pattern.captures(reference)?;
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Compute the membership changes.
    ///
    /// `user_ids` maps canonical user keys to platform user ids; users
    /// without an entry are skipped. `groups` is the platform snapshot
    /// with current members.
    ///
    /// The desired assignment of every group is collected from all users
    /// before any removal is considered, since whether a remote member stays
    /// depends on the whole directory and not on a single user.
    #[must_use]
    pub fn reconcile(
        &self,
        users: &[CanonicalUser],
        user_ids: &HashMap<String, String>,
        groups: &[TargetGroup],
    ) -> GroupPlan {
        let by_name: HashMap<&str, &TargetGroup> =
            groups.iter().map(|g| (g.name.as_str(), g)).collect();

        let mut desired: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut additions: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for user in users {
            let Some(user_id) = user_ids.get(&user.key) else {
                error!(user = %user.key, "User has no matching platform id, skipping group assignment");
                continue;
            };

            for reference in &user.groups {
                let Some(name) = self.extract_group_name(reference) else {
                    warn!(user = %user.key, reference = %reference, "No group name in reference, skipping");
                    continue;
                };
                let Some(group) = by_name.get(name) else {
                    debug!(user = %user.key, group = %name, "Group not present on platform, skipping");
                    continue;
                };

                let newly_desired = desired
                    .entry(group.id.as_str())
                    .or_default()
                    .insert(user_id.as_str());

                if group.has_member(user_id) {
                    debug!(user_id = %user_id, group_id = %group.id, "User already in group");
                } else if newly_desired {
                    debug!(user_id = %user_id, group_id = %group.id, "User to be added to group");
                    additions
                        .entry(group.id.as_str())
                        .or_default()
                        .push(user_id.clone());
                }
            }
        }

        let mut plan = GroupPlan::default();

        for group in groups {
            if let Some(ids) = additions.remove(group.id.as_str()) {
                plan.additions.push(GroupMembershipDelta {
                    group_id: group.id.clone(),
                    add_user_ids: ids,
                    remove_user_ids: Vec::new(),
                });
            }
        }

        if self.auto_removal {
            let empty = BTreeSet::new();
            for group in groups {
                let wanted = desired.get(group.id.as_str()).unwrap_or(&empty);
                let remove: Vec<String> = group
                    .remote_members()
                    .filter(|id| !wanted.contains(id))
                    .map(str::to_string)
                    .collect();
                for (member, remote) in &group.members {
                    if !*remote {
                        debug!(user_id = %member, group_id = %group.id, "Manual member, keeping");
                    }
                }
                if !remove.is_empty() {
                    debug!(group_id = %group.id, users = ?remove, "Remote members to be removed");
                    plan.removals.push(GroupMembershipDelta {
                        group_id: group.id.clone(),
                        add_user_ids: Vec::new(),
                        remove_user_ids: remove,
                    });
                }
            }
        } else {
            debug!("Automatic group removal disabled");
        }

        info!(
            groups_with_additions = plan.additions.len(),
            users_added = plan.added_count(),
            groups_with_removals = plan.removals.len(),
            users_removed = plan.removed_count(),
            "Group memberships reconciled"
        );

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_default_pattern_extracts_first_cn() {
        let reconciler = GroupReconciler::new(None, false).unwrap();
        assert_eq!(
            reconciler.extract_group_name("CN=DataScience,OU=Groups,DC=example,DC=com"),
            Some("DataScience")
        );
        assert_eq!(reconciler.extract_group_name("OU=Groups,DC=example"), None);
        assert_eq!(reconciler.extract_group_name("CN=NoComma"), None);
    }

    #[test]
    fn test_custom_pattern_without_capture_uses_whole_match() {
        let reconciler = GroupReconciler::new(Some(r"^[a-z]+$"), false).unwrap();
        assert_eq!(reconciler.extract_group_name("ops"), Some("ops"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(matches!(
            GroupReconciler::new(Some("CN=(unclosed"), false),
            Err(SyncError::InvalidGroupPattern { .. })
        ));
    }

    #[test]
    fn test_user_added_to_resolved_group() {
        let reconciler = GroupReconciler::new(None, false).unwrap();
        let users = vec![CanonicalUser::new("alice").with_groups(["CN=DataScience,OU=Groups"])];
        let groups = vec![TargetGroup::new("9", "DataScience")];

        let plan = reconciler.reconcile(&users, &ids(&[("alice", "3")]), &groups);

        assert_eq!(
            plan.additions,
            vec![GroupMembershipDelta {
                group_id: "9".into(),
                add_user_ids: vec!["3".into()],
                remove_user_ids: vec![],
            }]
        );
        assert!(plan.removals.is_empty());
    }

    #[test]
    fn test_existing_member_is_not_re_added() {
        let reconciler = GroupReconciler::new(None, true).unwrap();
        let users = vec![CanonicalUser::new("alice").with_groups(["CN=DataScience,OU=G"])];
        let groups = vec![TargetGroup::new("9", "DataScience").with_member("3", true)];

        let plan = reconciler.reconcile(&users, &ids(&[("alice", "3")]), &groups);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_duplicate_reference_is_added_once() {
        let reconciler = GroupReconciler::new(None, false).unwrap();
        let users = vec![CanonicalUser::new("alice")
            .with_groups(["CN=Ops,OU=A", "CN=Ops,OU=B"])];
        let groups = vec![TargetGroup::new("4", "Ops")];

        let plan = reconciler.reconcile(&users, &ids(&[("alice", "3")]), &groups);
        assert_eq!(plan.additions[0].add_user_ids, vec!["3".to_string()]);
    }

    #[test]
    fn test_unresolvable_references_are_skipped_individually() {
        let reconciler = GroupReconciler::new(None, false).unwrap();
        let users = vec![CanonicalUser::new("alice").with_groups([
            "garbage",
            "CN=Unknown,OU=G",
            "CN=Ops,OU=G",
        ])];
        let groups = vec![TargetGroup::new("4", "Ops")];

        let plan = reconciler.reconcile(&users, &ids(&[("alice", "3")]), &groups);
        assert_eq!(plan.added_count(), 1);
        assert_eq!(plan.additions[0].group_id, "4");
    }

    #[test]
    fn test_user_without_platform_id_is_skipped() {
        let reconciler = GroupReconciler::new(None, false).unwrap();
        let users = vec![
            CanonicalUser::new("ghost").with_groups(["CN=Ops,OU=G"]),
            CanonicalUser::new("alice").with_groups(["CN=Ops,OU=G"]),
        ];
        let groups = vec![TargetGroup::new("4", "Ops")];

        let plan = reconciler.reconcile(&users, &ids(&[("alice", "3")]), &groups);
        assert_eq!(plan.additions[0].add_user_ids, vec!["3".to_string()]);
    }

    #[test]
    fn test_stale_remote_member_is_removed() {
        let reconciler = GroupReconciler::new(None, true).unwrap();
        let groups = vec![TargetGroup::new("9", "DataScience").with_member("5", true)];

        let plan = reconciler.reconcile(&[], &HashMap::new(), &groups);
        assert_eq!(
            plan.removals,
            vec![GroupMembershipDelta {
                group_id: "9".into(),
                add_user_ids: vec![],
                remove_user_ids: vec!["5".into()],
            }]
        );
    }

    #[test]
    fn test_manual_member_is_never_removed() {
        let reconciler = GroupReconciler::new(None, true).unwrap();
        let groups = vec![TargetGroup::new("9", "DataScience").with_member("5", false)];

        let plan = reconciler.reconcile(&[], &HashMap::new(), &groups);
        assert!(plan.removals.is_empty());
    }

    #[test]
    fn test_no_removals_when_auto_removal_disabled() {
        let reconciler = GroupReconciler::new(None, false).unwrap();
        let groups = vec![TargetGroup::new("9", "DataScience").with_member("5", true)];

        let plan = reconciler.reconcile(&[], &HashMap::new(), &groups);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_removal_uses_assignments_from_all_users() {
        let reconciler = GroupReconciler::new(None, true).unwrap();
        // bob is processed after alice; his membership must still protect
        // his existing remote membership.
        let users = vec![
            CanonicalUser::new("alice").with_groups(["CN=Ops,OU=G"]),
            CanonicalUser::new("bob").with_groups(["CN=Ops,OU=G"]),
        ];
        let groups = vec![TargetGroup::new("4", "Ops")
            .with_member("20", true)
            .with_member("99", true)];

        let plan = reconciler.reconcile(&users, &ids(&[("alice", "10"), ("bob", "20")]), &groups);

        assert_eq!(plan.additions[0].add_user_ids, vec!["10".to_string()]);
        assert_eq!(plan.removals[0].remove_user_ids, vec!["99".to_string()]);
    }

    #[test]
    fn test_add_and_remove_sets_are_disjoint() {
        let reconciler = GroupReconciler::new(None, true).unwrap();
        let users = vec![
            CanonicalUser::new("a").with_groups(["CN=G1,OU=x", "CN=G2,OU=x"]),
            CanonicalUser::new("b").with_groups(["CN=G2,OU=x"]),
        ];
        let groups = vec![
            TargetGroup::new("1", "G1").with_member("2", true),
            TargetGroup::new("2", "G2").with_member("1", true).with_member("3", false),
        ];

        let plan = reconciler.reconcile(&users, &ids(&[("a", "1"), ("b", "2")]), &groups);

        for add in &plan.additions {
            for remove in plan.removals.iter().filter(|r| r.group_id == add.group_id) {
                assert!(add
                    .add_user_ids
                    .iter()
                    .all(|id| !remove.remove_user_ids.contains(id)));
            }
        }
        assert_eq!(plan.added_count(), 2);
        assert_eq!(plan.removed_count(), 1);
    }
}
