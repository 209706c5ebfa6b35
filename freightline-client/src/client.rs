//! The shared API client.

use crate::auth::HttpTokenRefresher;
use crate::classify::classify_failure;
use crate::config::ClientConfig;
use crate::coordinator::{RefreshCoordinator, TokenRefresher};
use crate::credentials::{CredentialStore, Credentials, InMemoryCredentialStore};
use crate::decorator::RequestDecorator;
use crate::error::{ApiError, ApiResult, ConfigError};
use crate::request::{ApiRequest, ApiResponse};
use crate::tenant::{LocationSource, StaticLocation, TenantResolver};
use crate::terminator::{LogOnlyHook, SessionHook, SessionTerminator};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Authenticated, tenant-aware client for the Freightline API.
///
/// Cheap to clone; clones share credentials and the refresh coordinator, so a
/// single refresh serves every clone.
#[derive(Debug, Clone)]
pub struct FreightlineClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    decorator: RequestDecorator,
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<dyn CredentialStore>,
}

impl FreightlineClient {
    /// Start building a client.
    pub fn builder() -> FreightlineClientBuilder {
        FreightlineClientBuilder::default()
    }

    /// Client with default configuration and in-memory credentials.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Snapshot of the stored credentials.
    pub fn credentials(&self) -> Credentials {
        self.inner.store.load()
    }

    /// Whether an access token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.inner.store.access_token().is_some()
    }

    /// Active tenant slug, if any.
    pub fn tenant(&self) -> Option<String> {
        self.inner.decorator.tenant()
    }

    /// The refresh coordinator.
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.inner.coordinator
    }

    /// Send a request.
    ///
    /// A 401 triggers at most one token refresh and one replay of the same
    /// request. A 401 on the replay is returned as
    /// [`ApiError::SessionExpired`].
    pub async fn send(&self, mut request: ApiRequest) -> ApiResult<ApiResponse> {
        if let Some(err) = request.encode_error() {
            return Err(ApiError::network(format!("failed to encode request body: {err}")));
        }

        let (response, sent_token) = self.attempt(&request, None).await?;
        if response.is_success() {
            return Ok(response);
        }

        if response.status == StatusCode::UNAUTHORIZED
            && !request.retried
            && !request.skip_auth_refresh
        {
            request.retried = true;
            debug!(
                method = %request.method,
                path = %request.path,
                "Authorization failed; refreshing before replay"
            );

            let token = self.inner.coordinator.fresh_token(sent_token.as_deref()).await?;
            let (replay, replay_token) = self.attempt(&request, Some(token)).await?;
            if replay.is_success() {
                return Ok(replay);
            }
            return Err(classify_failure(
                replay.status.as_u16(),
                &replay.body,
                replay_token.is_some(),
                true,
            ));
        }

        // Public auth endpoints answer 401 for bad credentials, not expiry.
        Err(classify_failure(
            response.status.as_u16(),
            &response.body,
            sent_token.is_some() && !request.skip_auth_refresh,
            request.retried,
        ))
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        token: Option<String>,
    ) -> ApiResult<(ApiResponse, Option<String>)> {
        let url = self
            .inner
            .config
            .endpoint(&request.path)
            .map_err(|e| {
                ApiError::network(format!("invalid request path '{}': {e}", request.path))
            })?;

        let mut headers = request.headers.clone();
        let bearer = match token {
            Some(token) => self.inner.decorator.apply_with_token(&mut headers, Some(token)),
            None => self.inner.decorator.apply(&mut headers),
        };

        debug!(
            method = %request.method,
            path = %request.path,
            replay = request.retried,
            authenticated = bearer.is_some(),
            "Sending API request"
        );

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = ApiResponse::read(builder.send().await?).await?;
        debug!(path = %request.path, status = response.status.as_u16(), "API response");

        Ok((response, bearer))
    }

    /// GET `path` and decode the envelope's `data`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send(ApiRequest::get(path)).await?.data()
    }

    /// POST `body` to `path` and decode the envelope's `data`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)).await?.data()
    }

    /// PUT `body` to `path` and decode the envelope's `data`.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path).json(body)).await?.data()
    }

    /// PATCH `body` to `path` and decode the envelope's `data`.
    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::patch(path).json(body)).await?.data()
    }

    /// DELETE `path`, ignoring any body.
    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }
}

/// Builder for [`FreightlineClient`].
#[derive(Default)]
pub struct FreightlineClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn CredentialStore>>,
    location: Option<Arc<dyn LocationSource>>,
    hook: Option<Arc<dyn SessionHook>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    http: Option<reqwest::Client>,
}

impl FreightlineClientBuilder {
    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the credential store.
    #[must_use]
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the navigation location source used for tenant resolution.
    #[must_use]
    pub fn location_source(mut self, location: Arc<dyn LocationSource>) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the hook run when the session expires.
    #[must_use]
    pub fn on_session_expired(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Replace the refresh call implementation.
    #[must_use]
    pub fn token_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Use a preconfigured HTTP client. Timeouts and user agent from the
    /// config are not applied to it.
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<FreightlineClient, ConfigError> {
        let config = self.config;

        let http = match self.http {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
                if let Some(timeout) = config.request_timeout {
                    builder = builder.timeout(timeout);
                }
                builder
                    .build()
                    .map_err(|e| ConfigError::HttpClient(e.to_string()))?
            }
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryCredentialStore::new()));
        let location = self
            .location
            .unwrap_or_else(|| Arc::new(StaticLocation::default()));
        let hook = self.hook.unwrap_or_else(|| Arc::new(LogOnlyHook));
        let refresher = self
            .refresher
            .unwrap_or_else(|| Arc::new(HttpTokenRefresher::new(http.clone(), config.clone())));

        let resolver = TenantResolver::new(config.base_domain.clone())
            .with_reserved(config.reserved_subdomains.iter().cloned());
        let decorator = RequestDecorator::new(store.clone(), resolver, location);
        let terminator = SessionTerminator::new(store.clone(), hook, config.login_path.clone());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            refresher,
            terminator,
            config.refresh_timeout,
        ));

        Ok(FreightlineClient {
            inner: Arc::new(ClientInner {
                http,
                config,
                decorator,
                coordinator,
                store,
            }),
        })
    }
}
