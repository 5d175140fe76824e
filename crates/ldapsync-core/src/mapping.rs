//! Declarative field mapping from directory records to canonical users.
//!
//! A mapping table associates each canonical key with a literal constant,
//! a `"${field}"` reference, or an explicit transform. Entries are compiled
//! once into [`MappingRule`]s and evaluated by the pure [`resolve`] function
//! for every record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::attributes::AttributeValue;
use crate::error::{SyncError, SyncResult};
use crate::model::{CanonicalUser, RawRecord, ACTIVE, MEMBER_OF, USER_NAME};

/// Mapping table as written in configuration: canonical key to entry.
pub type MappingTable = BTreeMap<String, MappingEntry>;

/// Named transforms that can be requested explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Decode a 16-byte binary identifier into a UUID string.
    IdDecode,
    /// Bit set in the field means the account is disabled.
    BitmaskDisabled,
    /// Presence of the field means the account is disabled.
    AbsentMeansActive,
    /// Keep every value of the field as a list.
    MultiValue,
}

/// One mapping table entry as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingEntry {
    Boolean(bool),
    Integer(i64),
    /// Literal text, or a `"${field}"` reference.
    Text(String),
    Transform {
        field: String,
        transform: TransformKind,
        #[serde(default)]
        mask: Option<u64>,
    },
}

/// A compiled mapping rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingRule {
    /// A constant value.
    Literal(AttributeValue),
    /// First value of a directory attribute, as trimmed text.
    Field(String),
    /// First value decoded as a binary unique identifier.
    IdDecode(String),
    /// Boolean from a bitmask: `true` unless `value & mask` is non-zero.
    Bitmask { field: String, mask: u64 },
    /// Boolean from presence: `true` unless the attribute has a value.
    AbsentMeansActive(String),
    /// All values of the attribute, in order.
    MultiValue(String),
}

impl MappingRule {
    /// Compile a configuration entry.
    pub fn compile(key: &str, entry: &MappingEntry) -> SyncResult<Self> {
        let rule = match entry {
            MappingEntry::Boolean(b) => MappingRule::Literal(AttributeValue::Boolean(*b)),
            MappingEntry::Integer(i) => MappingRule::Literal(AttributeValue::Integer(*i)),
            MappingEntry::Text(text) => match field_reference(text) {
                Some(field) => MappingRule::Field(field.to_string()),
                None => MappingRule::Literal(AttributeValue::String(text.trim().to_string())),
            },
            MappingEntry::Transform {
                field,
                transform,
                mask,
            } => {
                if field.trim().is_empty() {
                    return Err(SyncError::InvalidMapping {
                        key: key.to_string(),
                        message: "transform requires a field name".to_string(),
                    });
                }
                let field = field.trim().to_string();
                match transform {
                    TransformKind::IdDecode => MappingRule::IdDecode(field),
                    TransformKind::BitmaskDisabled => MappingRule::Bitmask {
                        field,
                        mask: mask.unwrap_or(DEFAULT_DISABLED_MASK),
                    },
                    TransformKind::AbsentMeansActive => MappingRule::AbsentMeansActive(field),
                    TransformKind::MultiValue => MappingRule::MultiValue(field),
                }
            }
        };
        Ok(rule)
    }

    /// Directory attribute the rule reads, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            MappingRule::Literal(_) => None,
            MappingRule::Field(f)
            | MappingRule::IdDecode(f)
            | MappingRule::Bitmask { field: f, .. }
            | MappingRule::AbsentMeansActive(f)
            | MappingRule::MultiValue(f) => Some(f),
        }
    }
}

/// Account-disabled bit of the Active Directory `userAccountControl` flags.
pub const DEFAULT_DISABLED_MASK: u64 = 0x0002;

fn field_reference(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix("${")?.strip_suffix('}')?.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

fn is_binary_identifier(field: &str) -> bool {
    field.eq_ignore_ascii_case("objectGUID") || field.eq_ignore_ascii_case("uuid")
}

/// Result of evaluating one rule against one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Value(AttributeValue),
    List(Vec<String>),
}

/// Evaluate a rule against a record.
///
/// Never fails: a missing attribute is logged and resolves to the empty
/// string (or to "active" for the boolean transforms).
#[must_use]
pub fn resolve(rule: &MappingRule, record: &RawRecord) -> Resolved {
    match rule {
        MappingRule::Literal(value) => Resolved::Value(value.clone()),
        MappingRule::Field(field) if is_binary_identifier(field) => {
            Resolved::Value(AttributeValue::String(decode_identifier(record, field)))
        }
        MappingRule::Field(field) => Resolved::Value(AttributeValue::String(
            first_text(record, field).unwrap_or_default(),
        )),
        MappingRule::IdDecode(field) => {
            Resolved::Value(AttributeValue::String(decode_identifier(record, field)))
        }
        MappingRule::Bitmask { field, mask } => {
            let flags = record
                .first(field)
                .and_then(|raw| String::from_utf8_lossy(raw).trim().parse::<u64>().ok());
            Resolved::Value(AttributeValue::Boolean(flags.map_or(true, |v| (v & mask) == 0)))
        }
        MappingRule::AbsentMeansActive(field) => {
            let present = record
                .first(field)
                .is_some_and(|raw| !String::from_utf8_lossy(raw).trim().is_empty());
            Resolved::Value(AttributeValue::Boolean(!present))
        }
        MappingRule::MultiValue(field) => Resolved::List(
            record
                .values(field)
                .unwrap_or_default()
                .iter()
                .map(|raw| String::from_utf8_lossy(raw).trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
        ),
    }
}

fn first_text(record: &RawRecord, field: &str) -> Option<String> {
    match record.first(field) {
        Some(raw) => Some(String::from_utf8_lossy(raw).trim().to_string()),
        None => {
            warn!(dn = %record.dn, field = %field, "Directory attribute missing, using empty value");
            None
        }
    }
}

fn decode_identifier(record: &RawRecord, field: &str) -> String {
    match record.first(field) {
        Some(raw) => match uuid::Uuid::from_slice(raw) {
            Ok(id) => id.hyphenated().to_string(),
            Err(_) => String::from_utf8_lossy(raw).trim().to_string(),
        },
        None => {
            warn!(dn = %record.dn, field = %field, "Directory identifier missing, using empty value");
            String::new()
        }
    }
}

/// Vendor-specific specialisation of compiled rules.
///
/// Implementations rewrite rules whose meaning depends on the directory
/// product, such as which attribute encodes a disabled account.
pub trait VendorRules: Send + Sync {
    /// Short vendor name for logs.
    fn vendor(&self) -> &str;

    /// Rewrite the rule compiled for `key`. The default keeps it unchanged.
    fn specialise(&self, key: &str, rule: MappingRule) -> MappingRule {
        let _ = key;
        rule
    }
}

/// Rules shared by every directory vendor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonRules;

impl VendorRules for CommonRules {
    fn vendor(&self) -> &str {
        "common"
    }

    fn specialise(&self, key: &str, rule: MappingRule) -> MappingRule {
        match rule {
            MappingRule::Field(field) if key == MEMBER_OF => MappingRule::MultiValue(field),
            other => other,
        }
    }
}

/// Compiled mapping table.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    vendor: String,
    rules: Vec<(String, MappingRule)>,
}

impl FieldMapper {
    /// Compile a mapping table, applying the common rules and then the
    /// vendor's own specialisation.
    pub fn compile(table: &MappingTable, vendor: &dyn VendorRules) -> SyncResult<Self> {
        if !table.contains_key(USER_NAME) {
            return Err(SyncError::InvalidMapping {
                key: USER_NAME.to_string(),
                message: "a userName mapping is required".to_string(),
            });
        }

        let mut rules = Vec::with_capacity(table.len());
        for (key, entry) in table {
            let rule = MappingRule::compile(key, entry)?;
            let rule = vendor.specialise(key, CommonRules.specialise(key, rule));
            if matches!(rule, MappingRule::MultiValue(_)) && key != MEMBER_OF {
                return Err(SyncError::InvalidMapping {
                    key: key.clone(),
                    message: format!("multi-valued mapping is only supported for {MEMBER_OF}"),
                });
            }
            debug!(key = %key, rule = ?rule, vendor = vendor.vendor(), "Compiled mapping rule");
            rules.push((key.clone(), rule));
        }

        Ok(Self {
            vendor: vendor.vendor().to_string(),
            rules,
        })
    }

    /// Vendor the mapper was compiled for.
    #[must_use]
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Compiled rules in canonical key order.
    #[must_use]
    pub fn rules(&self) -> &[(String, MappingRule)] {
        &self.rules
    }

    /// Directory attributes referenced by the table, for the search request.
    #[must_use]
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .rules
            .iter()
            .filter_map(|(_, rule)| rule.field().map(str::to_string))
            .collect();
        fields.sort_by_key(|f| f.to_ascii_lowercase());
        fields.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
        fields
    }

    /// Map one raw record to a canonical user.
    #[must_use]
    pub fn map(&self, record: &RawRecord) -> CanonicalUser {
        let mut user = CanonicalUser::new(String::new());

        for (key, rule) in &self.rules {
            let resolved = resolve(rule, record);
            match (key.as_str(), resolved) {
                (USER_NAME, Resolved::Value(v)) => user.key = v.to_string(),
                (ACTIVE, Resolved::Value(v)) => {
                    user.active = match v.as_flag() {
                        Some(flag) => flag,
                        None => {
                            if v.as_str().is_some_and(|s| !s.is_empty()) {
                                warn!(dn = %record.dn, value = %v, "Unrecognised active flag, assuming active");
                            }
                            true
                        }
                    };
                }
                (MEMBER_OF, Resolved::List(groups)) => user.groups = groups,
                (MEMBER_OF, Resolved::Value(v)) => {
                    let text = v.to_string();
                    user.groups = if text.is_empty() { Vec::new() } else { vec![text] };
                }
                (_, Resolved::Value(v)) => {
                    user.attributes.insert(key.clone(), v);
                }
                (_, Resolved::List(_)) => {}
            }
        }

        user
    }
}
