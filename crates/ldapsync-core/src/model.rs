//! Data model for one synchronisation cycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::attributes::{AttributeValue, Attributes};

/// Canonical key carrying the user's unique login name.
pub const USER_NAME: &str = "userName";
/// Canonical key carrying the account status.
pub const ACTIVE: &str = "active";
/// Canonical key carrying the raw directory group references.
pub const MEMBER_OF: &str = "memberOf";

/// One entry as returned by a directory search.
///
/// Attribute names are matched case-insensitively, the way directory
/// servers treat them. Values are kept as raw bytes so binary identifiers
/// survive until the mapper decodes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Distinguished name of the entry.
    pub dn: String,
    attributes: BTreeMap<String, Vec<Vec<u8>>>,
}

impl RawRecord {
    /// Create an empty record for the given DN.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Append values to an attribute.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<Vec<u8>>) {
        let name = name.into();
        let existing = self
            .attributes
            .keys()
            .find(|k| k.eq_ignore_ascii_case(&name))
            .cloned();
        self.attributes
            .entry(existing.unwrap_or(name))
            .or_default()
            .extend(values);
    }

    /// Builder-style helper for text attributes.
    #[must_use]
    pub fn with_text(mut self, name: &str, values: &[&str]) -> Self {
        self.insert(
            name,
            values.iter().map(|v| v.as_bytes().to_vec()).collect(),
        );
        self
    }

    /// Builder-style helper for a binary attribute.
    #[must_use]
    pub fn with_binary(mut self, name: &str, value: Vec<u8>) -> Self {
        self.insert(name, vec![value]);
        self
    }

    /// All values of an attribute, if present.
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// First value of an attribute, if present.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&[u8]> {
        self.values(name)
            .and_then(|v| v.first())
            .map(Vec::as_slice)
    }

    /// Iterate attribute names and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Vec<u8>])> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of attributes on the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the record has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// A vendor-independent user built by the field mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUser {
    /// Unique login name.
    pub key: String,
    /// Canonical attributes, excluding the reserved keys.
    pub attributes: Attributes,
    /// Whether the account is enabled in the directory.
    pub active: bool,
    /// Raw directory group references, in directory order.
    pub groups: Vec<String>,
}

impl CanonicalUser {
    /// Create an active user with no attributes.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            attributes: Attributes::new(),
            active: true,
            groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Attributes including the reserved `userName` and `active` keys,
    /// as sent to the platform.
    #[must_use]
    pub fn payload_attributes(&self) -> Attributes {
        let mut attrs = self.attributes.clone();
        attrs.insert(USER_NAME.to_string(), AttributeValue::String(self.key.clone()));
        attrs.insert(ACTIVE.to_string(), AttributeValue::Boolean(self.active));
        attrs
    }
}

/// A user as currently known to the target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUser {
    /// Platform-assigned identifier.
    pub id: String,
    /// Login name, matched against [`CanonicalUser::key`].
    pub key: String,
    /// Flattened platform attributes.
    pub attributes: Attributes,
    /// Whether the account is active on the platform.
    pub active: bool,
}

impl TargetUser {
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            attributes: Attributes::new(),
            active: true,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Group identity as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
}

/// A platform group together with its current members.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetGroup {
    pub id: String,
    pub name: String,
    /// Member user id to remote flag. A remote membership was established
    /// by this sync process; the others were added by hand on the platform.
    pub members: BTreeMap<String, bool>,
}

impl TargetGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            members: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_member(mut self, user_id: impl Into<String>, remote: bool) -> Self {
        self.members.insert(user_id.into(), remote);
        self
    }

    #[must_use]
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.contains_key(user_id)
    }

    /// Ids of members whose membership was established remotely.
    pub fn remote_members(&self) -> impl Iterator<Item = &str> {
        self.members
            .iter()
            .filter(|(_, remote)| **remote)
            .map(|(id, _)| id.as_str())
    }
}

/// Kind of a user-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Update,
    Delete,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-level change to apply on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SyncOperation {
    /// Create a user that the platform does not know yet.
    Add(CanonicalUser),
    /// Replace a known user's attributes.
    Update { id: String, user: CanonicalUser },
    /// Deactivate a user no longer present in the directory.
    Delete { id: String, key: String },
}

impl SyncOperation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            SyncOperation::Add(_) => OperationKind::Add,
            SyncOperation::Update { .. } => OperationKind::Update,
            SyncOperation::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Login name the operation applies to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            SyncOperation::Add(user) | SyncOperation::Update { user, .. } => &user.key,
            SyncOperation::Delete { key, .. } => key,
        }
    }

    /// Platform id, absent for additions.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        match self {
            SyncOperation::Add(_) => None,
            SyncOperation::Update { id, .. } | SyncOperation::Delete { id, .. } => Some(id),
        }
    }

    /// Canonical user carried by the operation, absent for deletions.
    #[must_use]
    pub fn user(&self) -> Option<&CanonicalUser> {
        match self {
            SyncOperation::Add(user) | SyncOperation::Update { user, .. } => Some(user),
            SyncOperation::Delete { .. } => None,
        }
    }
}

/// Membership changes for one group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupMembershipDelta {
    pub group_id: String,
    pub add_user_ids: Vec<String>,
    pub remove_user_ids: Vec<String>,
}

impl GroupMembershipDelta {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add_user_ids.is_empty() && self.remove_user_ids.is_empty()
    }
}
