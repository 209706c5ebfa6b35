//! Outbound request decoration.

use crate::credentials::CredentialStore;
use crate::tenant::{LocationSource, TenantResolver};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use std::sync::Arc;
use tracing::warn;

/// Tenant header name.
pub const ORGANIZATION_HEADER: HeaderName = HeaderName::from_static("x-organization-slug");

/// Per-attempt correlation id header.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Attaches the bearer token and tenant header to outbound requests.
///
/// Decoration never blocks and never fails; a missing token or tenant just
/// omits the header.
#[derive(Clone)]
pub struct RequestDecorator {
    store: Arc<dyn CredentialStore>,
    resolver: TenantResolver,
    location: Arc<dyn LocationSource>,
}

impl std::fmt::Debug for RequestDecorator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDecorator")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl RequestDecorator {
    /// Create a decorator.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        resolver: TenantResolver,
        location: Arc<dyn LocationSource>,
    ) -> Self {
        Self {
            store,
            resolver,
            location,
        }
    }

    /// Active tenant for the current location.
    pub fn tenant(&self) -> Option<String> {
        self.resolver.resolve(&self.location.current())
    }

    /// Decorate with the access token currently in the store.
    ///
    /// Returns the token that was attached.
    pub fn apply(&self, headers: &mut HeaderMap) -> Option<String> {
        let token = self.store.access_token();
        self.apply_with_token(headers, token)
    }

    /// Decorate with an explicit access token.
    ///
    /// Returns the token that was attached.
    pub fn apply_with_token(
        &self,
        headers: &mut HeaderMap,
        token: Option<String>,
    ) -> Option<String> {
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        if let Ok(id) = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()) {
            headers.insert(REQUEST_ID_HEADER, id);
        }

        let attached = match token {
            Some(token) => match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                    Some(token)
                }
                Err(_) => {
                    warn!("Stored access token is not a valid header value; sending without it");
                    headers.remove(AUTHORIZATION);
                    None
                }
            },
            None => {
                headers.remove(AUTHORIZATION);
                None
            }
        };

        match self.tenant() {
            Some(slug) => match HeaderValue::from_str(&slug) {
                Ok(value) => {
                    headers.insert(ORGANIZATION_HEADER, value);
                }
                Err(_) => warn!(slug = %slug, "Tenant slug is not a valid header value"),
            },
            None => {
                headers.remove(ORGANIZATION_HEADER);
            }
        }

        attached
    }
}
