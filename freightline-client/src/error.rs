//! Error types surfaced to callers of the client.
//!
//! Token attachment, refresh and the one-shot replay are handled internally;
//! callers only ever see a successful response or one of the five
//! classifications of [`ApiError`].

use std::collections::BTreeMap;
use thiserror::Error;

/// Classified failure of an API call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No session: no credentials were available, or the server rejected
    /// the request as unauthenticated outright.
    #[error("Not authenticated: {message}")]
    Unauthenticated {
        /// Human-readable reason.
        message: String,
    },

    /// A refresh was attempted and failed, or a freshly refreshed token was
    /// rejected again.
    #[error("Session expired: {message}")]
    SessionExpired {
        /// Human-readable reason.
        message: String,
    },

    /// Transport failure; no response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// Any other non-success response.
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Client error carrying structured field errors.
    #[error("Validation failed: {message}")]
    Validation {
        /// HTTP status code.
        status: u16,
        /// Summary message.
        message: String,
        /// Field name to messages.
        fields: BTreeMap<String, Vec<String>>,
    },
}

impl ApiError {
    /// Create an unauthenticated error.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Create a session expired error.
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create a server error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(
        status: u16,
        message: impl Into<String>,
        fields: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self::Validation {
            status,
            message: message.into(),
            fields,
        }
    }

    /// Whether this error means the session is gone and the user has to sign
    /// in again.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated { .. } | Self::SessionExpired { .. }
        )
    }

    /// Get the HTTP status if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } | Self::Validation { status, .. } => Some(*status),
            Self::SessionExpired { .. } | Self::Unauthenticated { .. } | Self::Network(_) => None,
        }
    }

    /// Field errors, if this is a validation error.
    #[must_use]
    pub fn field_errors(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        match self {
            Self::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ApiError::server(status.as_u16(), err.to_string())
        } else if err.is_timeout() {
            ApiError::network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            ApiError::network(format!("connection failed: {err}"))
        } else {
            ApiError::network(err.to_string())
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors opening or persisting a credential store.
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    /// Filesystem error.
    #[error("Credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be (de)serialized.
    #[error("Credential store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invalid client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The API base URL could not be parsed.
    #[error("Invalid API base URL '{url}': {source}")]
    InvalidBaseUrl {
        /// Offending value.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// An environment variable held an unusable value.
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// The underlying HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}
