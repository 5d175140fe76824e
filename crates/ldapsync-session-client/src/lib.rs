//! Client for the session-token flavour of the platform API.
//!
//! A session starts with `POST /api/v1/auth/login` and ends with
//! `POST /api/v1/auth/logout`; every call in between carries the bearer
//! token obtained at login. [`SessionClient`] implements both
//! [`GroupPlatform`](ldapsync_core::GroupPlatform) and
//! [`UserPlatform`](ldapsync_core::UserPlatform).

pub mod client;
pub mod config;
pub mod error;
pub mod models;
mod platform;

pub use client::SessionClient;
pub use config::SessionConfig;
pub use error::{SessionClientError, SessionClientResult};
