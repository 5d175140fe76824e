//! SCIM 2.0 client for the provisioning-protocol flavour of the target
//! platform.
//!
//! [`ScimProvisioner`] adapts the HTTP client to the
//! [`UserPlatform`](ldapsync_core::UserPlatform) capability: users are
//! listed with paginated `GET /Users`, created with `POST`, replaced with
//! `PUT` and deactivated with a `PATCH` setting `active` to `false`.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod provisioner;
pub mod resource;
pub mod retry;

pub use auth::{ScimAuth, ScimCredentials};
pub use client::{ScimClient, ScimResponse};
pub use config::ScimConfig;
pub use error::{ScimClientError, ScimClientResult};
pub use provisioner::ScimProvisioner;
pub use retry::RetryPolicy;
