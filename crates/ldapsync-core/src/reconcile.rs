//! User reconciliation: diff canonical users against the platform snapshot.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::model::{CanonicalUser, SyncOperation, TargetUser};

/// Operations required to make the platform mirror the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPlan {
    /// Source users unknown to the platform, in source order.
    pub add: Vec<SyncOperation>,
    /// Matched users whose attributes differ, in source order.
    pub update: Vec<SyncOperation>,
    /// Active platform users missing from the directory, in target order.
    pub delete: Vec<SyncOperation>,
    /// Matched users with nothing to change.
    pub unchanged: usize,
}

/// Counts reported for one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub source_users: usize,
    pub target_users: usize,
    pub add: usize,
    pub update: usize,
    pub delete: usize,
    pub unchanged: usize,
}

impl UserPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Total number of operations in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }

    #[must_use]
    pub fn summary(&self, source_users: usize, target_users: usize) -> PlanSummary {
        PlanSummary {
            source_users,
            target_users,
            add: self.add.len(),
            update: self.update.len(),
            delete: self.delete.len(),
            unchanged: self.unchanged,
        }
    }

    /// Operations in apply order: delete, then update, then add.
    ///
    /// Deactivating first frees identifiers such as a reusable login name
    /// before anything is created that might claim it.
    pub fn in_apply_order(&self) -> impl Iterator<Item = &SyncOperation> {
        self.delete
            .iter()
            .chain(self.update.iter())
            .chain(self.add.iter())
    }
}

/// Diff the source users against the platform snapshot.
///
/// Users are matched on their exact, case-sensitive key. A matched user is
/// updated when any of its source-side attributes is missing on the target
/// or carries a different value, or when its active flag differs. The
/// comparison is one-directional: attributes only the target knows about
/// never cause an update. Unmatched target users are deactivated, unless
/// they already are.
#[must_use]
pub fn reconcile_users(source: &[CanonicalUser], target: &[TargetUser]) -> UserPlan {
    let mut by_key: HashMap<&str, &TargetUser> = HashMap::with_capacity(target.len());
    for user in target {
        by_key.entry(user.key.as_str()).or_insert(user);
    }

    let mut plan = UserPlan::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(source.len());

    for user in source {
        seen.insert(user.key.as_str());
        match by_key.get(user.key.as_str()) {
            Some(current) => {
                if let Some(reason) = first_difference(user, current) {
                    debug!(key = %user.key, id = %current.id, reason = %reason, "User changed");
                    plan.update.push(SyncOperation::Update {
                        id: current.id.clone(),
                        user: user.clone(),
                    });
                } else {
                    plan.unchanged += 1;
                }
            }
            None => {
                debug!(key = %user.key, "New user");
                plan.add.push(SyncOperation::Add(user.clone()));
            }
        }
    }

    for current in target {
        if seen.contains(current.key.as_str()) {
            continue;
        }
        if current.active {
            debug!(key = %current.key, id = %current.id, "User no longer in directory");
            plan.delete.push(SyncOperation::Delete {
                id: current.id.clone(),
                key: current.key.clone(),
            });
        } else {
            debug!(key = %current.key, id = %current.id, "User already inactive, skipping");
        }
    }

    info!(
        "New users: {} - Users to update: {} - Users to delete: {}",
        plan.add.len(),
        plan.update.len(),
        plan.delete.len()
    );

    plan
}

fn first_difference(source: &CanonicalUser, target: &TargetUser) -> Option<String> {
    if source.active != target.active {
        return Some(format!("active {} -> {}", target.active, source.active));
    }
    for (key, value) in &source.attributes {
        match target.attributes.get(key) {
            None => return Some(format!("{key} missing on platform")),
            Some(current) if !value.loosely_equals(current) => {
                return Some(format!("{key} differs"));
            }
            Some(_) => {}
        }
    }
    None
}
