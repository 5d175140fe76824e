//! Core of the directory synchronisation engine.
//!
//! This crate holds everything that decides *what* has to change on the
//! target platform, with no I/O of its own:
//!
//! - [`mapping`] turns raw directory records into [`CanonicalUser`]s
//! - [`reconcile`] diffs canonical users against the platform snapshot
//! - [`groups`] derives group membership additions and removals
//! - [`plugin`] defines the capability traits implemented by directory
//!   connectors, platform clients and lifecycle plugins
//!
//! Reconciliation is a pure function of the snapshots taken at the start
//! of a cycle. Applying the resulting operations is the engine's job.

pub mod attributes;
pub mod error;
pub mod groups;
pub mod mapping;
pub mod model;
pub mod plugin;
pub mod reconcile;

pub use attributes::{AttributeValue, Attributes};
pub use error::{SyncError, SyncResult};
pub use groups::{GroupPlan, GroupReconciler, DEFAULT_GROUP_NAME_PATTERN};
pub use mapping::{
    CommonRules, FieldMapper, MappingEntry, MappingRule, MappingTable, TransformKind, VendorRules,
    DEFAULT_DISABLED_MASK,
};
pub use model::{
    CanonicalUser, GroupMembershipDelta, GroupRef, OperationKind, RawRecord, SyncOperation,
    TargetGroup, TargetUser,
};
pub use plugin::{DirectoryPlugin, GroupPlatform, LifecyclePlugin, SubmitResponse, UserPlatform};
pub use reconcile::{reconcile_users, PlanSummary, UserPlan};
