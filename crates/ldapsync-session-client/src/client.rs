//! Session API HTTP client (reqwest-based).

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionClientError, SessionClientResult};
use crate::models::{
    ApiGroup, ApiUser, CreateUserRequest, GroupResponse, GroupSearchResponse, LoginRequest,
    LoginResponse, PatchUserRequest, UpdateGroupRequest, UserListResponse, UserResponse,
};

const LOGIN: &str = "/api/v1/auth/login";
const LOGOUT: &str = "/api/v1/auth/logout";
const USERS: &str = "/api/v1/users";
const GROUPS_SEARCH: &str = "/api/v1/groups/search";

/// Session-token client for the platform API.
///
/// The token obtained by [`SessionClient::login`] is cached inside the
/// client and attached to every request until [`SessionClient::logout`].
pub struct SessionClient {
    base_url: String,
    config: SessionConfig,
    http_client: Client,
    token: RwLock<Option<String>>,
}

impl SessionClient {
    pub fn new(config: SessionConfig) -> SessionClientResult<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.tls_verify)
            .user_agent(concat!("ldapsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                SessionClientError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            config,
            http_client,
            token: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_logged_in(&self) -> bool {
        self.token.read().await.is_some()
    }

    // ── Session ───────────────────────────────────────────────────────

    /// Log in and cache the session token.
    pub async fn login(&self) -> SessionClientResult<()> {
        let body = LoginRequest {
            username: &self.config.username,
            password: &self.config.password,
            is_hashed: self.config.password_hashed,
        };

        let builder = self.http_client.post(self.url(LOGIN)).json(&body);
        let result = self.send(builder, LOGIN).await;

        let token = match result {
            Ok((_, Some(value))) => serde_json::from_value::<LoginResponse>(value)?.token,
            Ok((_, None)) => None,
            Err(SessionClientError::Api { status, .. }) => {
                error!(username = %self.config.username, status, "Platform login refused");
                *self.token.write().await = None;
                return Err(SessionClientError::LoginFailed {
                    username: self.config.username.clone(),
                    status: Some(status),
                });
            }
            Err(e) => return Err(e),
        };

        match token {
            Some(token) if !token.is_empty() => {
                *self.token.write().await = Some(token);
                debug!(username = %self.config.username, "Platform login executed");
                Ok(())
            }
            _ => {
                *self.token.write().await = None;
                Err(SessionClientError::LoginFailed {
                    username: self.config.username.clone(),
                    status: None,
                })
            }
        }
    }

    /// Log out and drop the cached token. The token is dropped even when
    /// the platform refuses the logout.
    pub async fn logout(&self) -> SessionClientResult<()> {
        let Some(token) = self.token.write().await.take() else {
            debug!("No platform session to close");
            return Ok(());
        };

        let builder = self.http_client.post(self.url(LOGOUT)).bearer_auth(token);
        self.send(builder, LOGOUT).await?;
        debug!("Platform logout executed");
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    /// Every platform user, active first.
    pub async fn get_users(&self) -> SessionClientResult<Vec<ApiUser>> {
        let builder = self
            .authorized(Method::GET, USERS)
            .await?
            .query(&[
                ("sortBy", "SORT_BY_ACTIVE"),
                ("orderBy", "ORDER_BY_DESC"),
                ("offset", "0"),
                ("limit", "0"),
            ]);
        let list: UserListResponse = self.fetch(builder, USERS).await?;
        debug!(users = list.users.len(), "Fetched platform users");
        Ok(list.users)
    }

    pub async fn create_user(&self, user: &ApiUser) -> SessionClientResult<(u16, Option<ApiUser>)> {
        let builder = self
            .authorized(Method::POST, USERS)
            .await?
            .json(&CreateUserRequest { user });
        self.write_user(builder, USERS).await
    }

    pub async fn patch_user(
        &self,
        id: i64,
        patch: &PatchUserRequest<'_>,
    ) -> SessionClientResult<(u16, Option<ApiUser>)> {
        let endpoint = format!("{USERS}/{id}");
        let builder = self
            .authorized(Method::PATCH, &endpoint)
            .await?
            .json(patch);
        self.write_user(builder, &endpoint).await
    }

    // ── Groups ────────────────────────────────────────────────────────

    /// Every group on the platform, without members.
    pub async fn search_groups(&self) -> SessionClientResult<Vec<ApiGroup>> {
        let builder = self
            .authorized(Method::POST, GROUPS_SEARCH)
            .await?
            .json(&serde_json::json!({}));
        let response: GroupSearchResponse = self.fetch(builder, GROUPS_SEARCH).await?;
        Ok(response.groups.into_iter().map(|entry| entry.group).collect())
    }

    /// A group with its members.
    pub async fn get_group(&self, group_id: i64) -> SessionClientResult<ApiGroup> {
        let endpoint = format!("/api/v1/groups/{group_id}");
        let builder = self.authorized(Method::GET, &endpoint).await?;
        match self.send(builder, &endpoint).await? {
            (_, Some(value)) => Ok(serde_json::from_value::<GroupResponse>(value)?.group),
            (_, None) => Err(SessionClientError::Parse(format!(
                "empty response from {endpoint}"
            ))),
        }
    }

    /// Add and remove members in one call.
    pub async fn update_group(
        &self,
        group_id: i64,
        add_users: Vec<i64>,
        remove_users: Vec<i64>,
    ) -> SessionClientResult<()> {
        let endpoint = format!("/api/v1/groups/{group_id}");
        let (added, removed) = (add_users.len(), remove_users.len());
        let body = UpdateGroupRequest {
            group_id,
            add_users,
            remove_users,
        };
        let builder = self.authorized(Method::PUT, &endpoint).await?.json(&body);
        self.send(builder, &endpoint).await?;
        info!(group_id, added, removed, "Group members updated");
        Ok(())
    }

    // ── Internal HTTP Methods ─────────────────────────────────────────

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn authorized(&self, method: Method, endpoint: &str) -> SessionClientResult<RequestBuilder> {
        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or(SessionClientError::NotLoggedIn)?;
        Ok(self
            .http_client
            .request(method, self.url(endpoint))
            .bearer_auth(token))
    }

    async fn fetch<T: DeserializeOwned + Default>(
        &self,
        builder: RequestBuilder,
        endpoint: &str,
    ) -> SessionClientResult<T> {
        match self.send(builder, endpoint).await? {
            (_, Some(value)) => Ok(serde_json::from_value(value)?),
            (_, None) => Ok(T::default()),
        }
    }

    async fn write_user(
        &self,
        builder: RequestBuilder,
        endpoint: &str,
    ) -> SessionClientResult<(u16, Option<ApiUser>)> {
        let (status, body) = self.send(builder, endpoint).await?;
        let user = match body {
            Some(value) => serde_json::from_value::<UserResponse>(value)
                .ok()
                .and_then(|r| r.user),
            None => None,
        };
        Ok((status, user))
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        endpoint: &str,
    ) -> SessionClientResult<(u16, Option<Value>)> {
        debug!("Platform API call {}", endpoint);
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SessionClientError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                e.into()
            }
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED | StatusCode::NO_CONTENT
        ) {
            warn!(endpoint, status = status.as_u16(), "Platform API error");
            return Err(SessionClientError::Api {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
                detail: text,
            });
        }

        if text.trim().is_empty() {
            return Ok((status.as_u16(), None));
        }
        let value = serde_json::from_str(&text)?;
        Ok((status.as_u16(), Some(value)))
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

