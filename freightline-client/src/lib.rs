//! # freightline-client
//!
//! Authenticated, tenant-aware HTTP client core for the Freightline
//! transportation-management API.
//!
//! Every request goes through one shared [`FreightlineClient`], which
//!
//! - attaches `Authorization: Bearer <token>` and `X-Organization-Slug`
//!   headers ([`RequestDecorator`]),
//! - on a 401, obtains a fresh access token from the
//!   [`RefreshCoordinator`] and replays the request exactly once,
//! - ends the session through the [`SessionTerminator`] when the refresh
//!   fails.
//!
//! ## Core Concepts
//!
//! - **[`CredentialStore`]**: durable access/refresh token storage
//! - **[`TenantResolver`]**: organization slug from subdomain or `/o/{slug}` path
//! - **[`RefreshCoordinator`]**: single-flight refresh with a FIFO waiter queue
//! - **[`ApiError`]**: the five error classifications callers see
//!
//! ## Example
//!
//! ```ignore
//! use freightline_client::{ClientConfig, FreightlineClient, FileCredentialStore};
//! use std::sync::Arc;
//!
//! let client = FreightlineClient::builder()
//!     .config(ClientConfig::from_env()?)
//!     .credential_store(Arc::new(FileCredentialStore::open("session.json")?))
//!     .on_session_expired(Arc::new(|login: &str| println!("please sign in again at {login}")))
//!     .build()?;
//!
//! client.login_with_password("dispatch@acme.test", "hunter2").await?;
//! let me = client.current_user().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod decorator;
pub mod error;
pub mod request;
pub mod tenant;
pub mod terminator;

// Re-exports
pub use auth::{CurrentUser, HttpTokenRefresher, Membership, Organization, User};
pub use client::{FreightlineClient, FreightlineClientBuilder};
pub use config::ClientConfig;
pub use coordinator::{RefreshCoordinator, TokenRefresher};
pub use credentials::{
    CredentialStore, Credentials, FileCredentialStore, InMemoryCredentialStore, TokenPair,
};
pub use decorator::{RequestDecorator, ORGANIZATION_HEADER};
pub use error::{ApiError, ApiResult, ConfigError, CredentialStoreError};
pub use request::{ApiRequest, ApiResponse};
pub use tenant::{Location, LocationSource, StaticLocation, TenantResolver};
pub use terminator::{LogOnlyHook, SessionHook, SessionTerminator};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        ApiError, ApiRequest, ApiResult, ClientConfig, CredentialStore, FreightlineClient,
        Location, StaticLocation, TokenPair,
    };
}
