//! # freightline
//!
//! Client for the Freightline transportation-management API.
//!
//! This crate re-exports [`freightline_client`] and adds logging setup for
//! applications. A single [`FreightlineClient`] attaches bearer and tenant
//! headers to every request and, when the access token expires, refreshes it
//! once on behalf of every request that is in flight.
//!
//! ## Feature Flags
//!
//! - `telemetry` (default): [`telemetry::init`] installs a `tracing`
//!   subscriber with `RUST_LOG` filtering and optional JSON output
//!
//! ## Example
//!
//! ```ignore
//! use freightline::prelude::*;
//!
//! freightline::telemetry::init()?;
//!
//! let client = FreightlineClient::builder()
//!     .config(ClientConfig::from_env()?)
//!     .build()?;
//!
//! client.verify_code("dispatch@acme.test", "482913").await?;
//! let loads: serde_json::Value = client.get_json("/v1/loads").await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "telemetry")]
#[cfg_attr(docsrs, doc(cfg(feature = "telemetry")))]
pub mod telemetry;

pub use freightline_client::*;

/// Prelude for common imports.
pub mod prelude {
    pub use freightline_client::prelude::*;
    pub use freightline_client::{
        CurrentUser, FileCredentialStore, InMemoryCredentialStore, LocationSource, SessionHook,
    };
}
