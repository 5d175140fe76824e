//! Wire types of the session API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub is_hashed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// A platform user as returned by `/api/v1/users` and group details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Set for users provisioned from the directory.
    #[serde(default)]
    pub remote: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListResponse {
    #[serde(default)]
    pub users: Vec<ApiUser>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateUserRequest<'a> {
    pub user: &'a ApiUser,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchUserRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<&'a str>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    #[serde(default)]
    pub user: Option<ApiUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGroup {
    pub group_id: i64,
    pub name: String,
    /// Only present in single-group responses.
    #[serde(default)]
    pub users: Vec<ApiUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSearchEntry {
    pub group: ApiGroup,
    #[serde(default)]
    pub num_members: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupSearchResponse {
    #[serde(default)]
    pub groups: Vec<GroupSearchEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupResponse {
    pub group: ApiGroup,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    pub group_id: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add_users: Vec<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remove_users: Vec<i64>,
}
