//! SCIM 2.0 HTTP client (reqwest-based).
//!
//! Covers the RFC 7644 user operations the synchronisation needs: paginated
//! listing, creation, replacement and deactivation.

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::ScimAuth;
use crate::config::ScimConfig;
use crate::error::{ScimClientError, ScimClientResult};
use crate::resource::{deactivate_patch, ListResponse};
use crate::retry::RetryPolicy;

const SCIM_CONTENT_TYPE: &str = "application/scim+json";

/// Status and optional body of a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct ScimResponse {
    pub status: u16,
    /// `None` for empty bodies (e.g. `204 No Content`).
    pub body: Option<Value>,
}

/// SCIM 2.0 HTTP client for outbound provisioning.
#[derive(Debug, Clone)]
pub struct ScimClient {
    /// Base URL of the SCIM target, without trailing slash.
    base_url: String,
    auth: ScimAuth,
    http_client: Client,
    retry: RetryPolicy,
    page_size: u32,
    timeout_secs: u64,
}

impl ScimClient {
    /// Create a client from validated configuration.
    pub fn new(config: &ScimConfig) -> ScimClientResult<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.tls_verify)
            .user_agent(concat!("ldapsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ScimClientError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;

        if !config.tls_verify {
            warn!(url = %config.url, "TLS certificate verification disabled for SCIM target");
        }

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            auth: ScimAuth::new(config.auth.clone()),
            http_client,
            retry: config.retry.into(),
            page_size: config.page_size,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(base_url: impl Into<String>, auth: ScimAuth, http_client: Client) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http_client,
            retry: RetryPolicy::none(),
            page_size: 100,
            timeout_secs: 30,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── User Operations ───────────────────────────────────────────────

    /// Fetch one page of users (GET /Users). `start_index` is 1-based.
    pub async fn list_users_page(&self, start_index: u64, count: u32) -> ScimClientResult<ListResponse> {
        let url = format!("{}/Users", self.base_url);
        let query = [
            ("startIndex", start_index.to_string()),
            ("count", count.to_string()),
        ];
        let (url, query) = (&url, &query);

        let body = self
            .retry
            .execute("list users", move || async move {
                debug!("SCIM GET {} (startIndex={})", url, start_index);
                let builder = self.auth.apply(self.http_client.get(url)).query(query);
                let response = builder.send().await.map_err(|e| self.transport_error(e))?;
                self.handle_response(response).await
            })
            .await?;

        match body {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                ScimClientError::ParseError(format!("Failed to parse ListResponse: {e}"))
            }),
            None => Ok(ListResponse::default()),
        }
    }

    /// Fetch every user, following pagination until `totalResults` is
    /// reached.
    ///
    /// Targets may return fewer items than requested per page, so a short
    /// page only ends the listing when `totalResults` is missing or zero.
    pub async fn list_all_users(&self) -> ScimClientResult<Vec<Value>> {
        let mut resources = Vec::new();
        let mut start_index: u64 = 1;

        loop {
            let page = self.list_users_page(start_index, self.page_size).await?;
            let received = page.resources.len() as u64;
            resources.extend(page.resources);

            let done = if page.total_results > 0 {
                received == 0 || resources.len() as u64 >= page.total_results
            } else {
                received == 0 || received < u64::from(self.page_size)
            };
            if done {
                break;
            }
            start_index += received;
        }

        debug!(users = resources.len(), "Fetched SCIM users");
        Ok(resources)
    }

    /// Create a user (POST /Users).
    pub async fn create_user(&self, user: &Value) -> ScimClientResult<ScimResponse> {
        let url = format!("{}/Users", self.base_url);
        self.write("create user", Method::POST, &url, user).await
    }

    /// Replace a user (PUT /Users/:id).
    pub async fn replace_user(&self, id: &str, user: &Value) -> ScimClientResult<ScimResponse> {
        let url = format!("{}/Users/{}", self.base_url, id);
        self.write("replace user", Method::PUT, &url, user).await
    }

    /// Deactivate a user by setting active=false (PATCH /Users/:id).
    pub async fn deactivate_user(&self, id: &str) -> ScimClientResult<ScimResponse> {
        let url = format!("{}/Users/{}", self.base_url, id);
        self.write("deactivate user", Method::PATCH, &url, &deactivate_patch())
            .await
    }

    // ── Internal HTTP Methods ─────────────────────────────────────────

    async fn write(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: &Value,
    ) -> ScimClientResult<ScimResponse> {
        let method = &method;
        self.retry
            .execute(operation, move || async move {
                debug!("SCIM {} {}", method, url);
                let builder = self
                    .auth
                    .apply(self.http_client.request(method.clone(), url))
                    .header("Content-Type", SCIM_CONTENT_TYPE)
                    .json(body);
                let response = builder.send().await.map_err(|e| self.transport_error(e))?;
                let status = response.status().as_u16();
                let body = self.handle_response(response).await?;
                Ok(ScimResponse { status, body })
            })
            .await
    }

    fn transport_error(&self, err: reqwest::Error) -> ScimClientError {
        if err.is_timeout() {
            ScimClientError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            err.into()
        }
    }

    // ── Response Handling ─────────────────────────────────────────────

    /// Success is 200, 201, 202 or 204; an empty success body yields `None`.
    async fn handle_response(&self, response: reqwest::Response) -> ScimClientResult<Option<Value>> {
        let status = response.status();

        if matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED | StatusCode::NO_CONTENT
        ) {
            let body = response.text().await.map_err(|e| self.transport_error(e))?;
            if body.trim().is_empty() {
                return Ok(None);
            }
            serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| ScimClientError::ParseError(format!("Failed to parse response: {e}")))
        } else {
            self.handle_error_response(response).await
        }
    }

    async fn handle_error_response<T>(&self, response: reqwest::Response) -> ScimClientResult<T> {
        let status = response.status();

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());

        match status {
            StatusCode::NOT_FOUND => Err(ScimClientError::NotFound(body)),
            StatusCode::CONFLICT => Err(ScimClientError::Conflict(body)),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("SCIM target rate limited, retry after {:?}s", retry_after);
                Err(ScimClientError::RateLimited {
                    retry_after_secs: retry_after,
                })
            }
            StatusCode::UNAUTHORIZED => Err(ScimClientError::AuthError(format!(
                "Authentication failed (401): {body}"
            ))),
            _ => {
                let detail = if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                };
                Err(ScimClientError::ScimError {
                    status: status.as_u16(),
                    detail,
                })
            }
        }
    }
}
