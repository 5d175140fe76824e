//! SCIM resource representations of canonical and platform users.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use ldapsync_core::attributes::{expand_dotted, flatten_resource};
use ldapsync_core::model::{ACTIVE, USER_NAME};
use ldapsync_core::{CanonicalUser, TargetUser};

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// Keys of a SCIM user that are not canonical attributes.
const NON_ATTRIBUTE_KEYS: &[&str] = &["id", "schemas", "meta", USER_NAME, ACTIVE];

/// `ListResponse` envelope (RFC 7644 Section 3.4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub start_index: Option<u64>,
    #[serde(default)]
    pub items_per_page: Option<u64>,
    #[serde(rename = "Resources", default)]
    pub resources: Vec<Value>,
}

/// Build the SCIM user resource for a canonical user.
///
/// `id` is included for replacements and left out for creations, where the
/// platform assigns it.
#[must_use]
pub fn user_resource(user: &CanonicalUser, id: Option<&str>) -> Value {
    let mut body = expand_dotted(&user.payload_attributes());
    body.insert("schemas".to_string(), json!([USER_SCHEMA]));
    if let Some(id) = id {
        body.insert("id".to_string(), Value::String(id.to_string()));
    }
    Value::Object(body)
}

/// `PatchOp` deactivating a user.
#[must_use]
pub fn deactivate_patch() -> Value {
    json!({
        "schemas": [PATCH_OP_SCHEMA],
        "Operations": [
            {"op": "replace", "value": {"active": false}}
        ]
    })
}

/// Read a platform user from a SCIM resource.
///
/// Returns `None` for resources without an `id` or a `userName`.
#[must_use]
pub fn target_user(resource: &Value) -> Option<TargetUser> {
    let object = resource.as_object()?;
    let id = match object.get("id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let key = object.get(USER_NAME)?.as_str()?.to_string();
    let active = object.get(ACTIVE).and_then(Value::as_bool).unwrap_or(true);

    let attributes_only: Map<String, Value> = object
        .iter()
        .filter(|(k, _)| !NON_ATTRIBUTE_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Some(TargetUser {
        id,
        key,
        attributes: flatten_resource(&attributes_only),
        active,
    })
}
