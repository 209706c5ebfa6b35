//! Credential storage.
//!
//! A store holds the access/refresh token pair and nothing else. Writes only
//! accept a complete [`TokenPair`] and [`CredentialStore::clear`] removes both
//! tokens together, so a store can never hold one token without the other.

use crate::error::CredentialStoreError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Storage key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "freightline.auth.access_token";

/// Storage key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "freightline.auth.refresh_token";

/// A complete access/refresh token pair as issued by the auth endpoints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Long-lived token exchanged for a new pair.
    pub refresh_token: String,
}

impl TokenPair {
    /// Create a new token pair.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Snapshot of what a store currently holds.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Current access token.
    #[serde(rename = "freightline.auth.access_token", default)]
    pub access_token: Option<String>,
    /// Current refresh token.
    #[serde(rename = "freightline.auth.refresh_token", default)]
    pub refresh_token: Option<String>,
}

impl Credentials {
    /// Whether neither token is present.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl From<TokenPair> for Credentials {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: Some(pair.access_token),
            refresh_token: Some(pair.refresh_token),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Durable key/value storage for the token pair.
///
/// Implementations hold no logic beyond get/set/clear. Only the refresh
/// coordinator writes to the store the client is built with.
pub trait CredentialStore: Send + Sync {
    /// Read both tokens.
    fn load(&self) -> Credentials;

    /// Replace both tokens.
    fn store(&self, pair: &TokenPair);

    /// Remove both tokens.
    fn clear(&self);

    /// Current access token.
    fn access_token(&self) -> Option<String> {
        self.load().access_token
    }

    /// Current refresh token.
    fn refresh_token(&self) -> Option<String> {
        self.load().refresh_token
    }
}

impl fmt::Debug for dyn CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load().fmt(f)
    }
}

/// In-memory store.
///
/// Suitable for tests and short-lived processes; nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<Credentials>,
}

impl InMemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding a pair.
    pub fn with_tokens(pair: TokenPair) -> Self {
        Self {
            inner: RwLock::new(pair.into()),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Credentials {
        self.inner.read().clone()
    }

    fn store(&self, pair: &TokenPair) {
        *self.inner.write() = pair.clone().into();
    }

    fn clear(&self) {
        *self.inner.write() = Credentials::default();
    }
}

/// Store persisted as a small JSON document on disk.
///
/// Reads are served from memory; every write replaces the whole document via
/// a temporary file and a rename, so both keys change together.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cache: RwLock<Credentials>,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading existing tokens if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialStoreError> {
        let path = path.into();
        let cached = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Credentials::default(),
            Ok(bytes) => serde_json::from_slice::<Credentials>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Credentials::default(),
            Err(err) => return Err(err.into()),
        };

        // A half-written document is treated as no session at all.
        let cached = if cached.access_token.is_some() != cached.refresh_token.is_some() {
            warn!(path = %path.display(), "Discarding incomplete stored credentials");
            Credentials::default()
        } else {
            cached
        };

        Ok(Self {
            path,
            cache: RwLock::new(cached),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, credentials: &Credentials) -> Result<(), CredentialStoreError> {
        if credentials.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            };
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let body = serde_json::to_vec_pretty(credentials)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Credentials {
        self.cache.read().clone()
    }

    fn store(&self, pair: &TokenPair) {
        let mut cache = self.cache.write();
        *cache = pair.clone().into();
        if let Err(err) = self.persist(&cache) {
            warn!(path = %self.path.display(), error = %err, "Failed to persist credentials");
        }
    }

    fn clear(&self) {
        let mut cache = self.cache.write();
        *cache = Credentials::default();
        if let Err(err) = self.persist(&cache) {
            warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to remove persisted credentials"
            );
        }
    }
}
