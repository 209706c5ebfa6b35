//! Authentication endpoints.

use crate::classify::{classify_failure, decode_data};
use crate::client::FreightlineClient;
use crate::config::ClientConfig;
use crate::coordinator::TokenRefresher;
use crate::credentials::TokenPair;
use crate::error::{ApiError, ApiResult};
use crate::request::{ApiRequest, ApiResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Endpoint paths.
pub mod paths {
    /// Start a one-time passcode login.
    pub const LOGIN: &str = "/v1/auth/login";
    /// Email and password login.
    pub const LOGIN_PASSWORD: &str = "/v1/auth/login/password";
    /// Verify a one-time passcode.
    pub const VERIFY: &str = "/v1/auth/verify";
    /// Exchange a refresh token.
    pub const REFRESH: &str = "/v1/auth/refresh";
    /// Invalidate a refresh token server-side.
    pub const LOGOUT: &str = "/v1/auth/logout";
    /// Current user and memberships.
    pub const ME: &str = "/v1/auth/me";
}

/// `data` of the token envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenData {
    /// Issued pair.
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
struct EmailBody<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyBody<'a> {
    email: &'a str,
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// Signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User id.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Account creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// An organization (tenant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization id.
    pub id: String,
    /// Tenant slug used in subdomains and `/o/{slug}` paths.
    pub slug: String,
    /// Display name.
    pub name: String,
}

/// A user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// The organization.
    pub organization: Organization,
    /// Role within it (`owner`, `dispatcher`, `driver`, ...).
    pub role: String,
}

/// Response of [`paths::ME`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// The user.
    pub user: User,
    /// Organization memberships.
    #[serde(default)]
    pub memberships: Vec<Membership>,
}

impl CurrentUser {
    /// Membership for the organization with `slug`.
    pub fn membership(&self, slug: &str) -> Option<&Membership> {
        self.memberships
            .iter()
            .find(|m| m.organization.slug == slug)
    }

    /// Whether the user belongs to the organization with `slug`.
    pub fn is_member_of(&self, slug: &str) -> bool {
        self.membership(slug).is_some()
    }
}

/// Refresh calls made directly against [`paths::REFRESH`].
///
/// Bypasses decoration and the retry driver; a refresh never triggers
/// another refresh.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpTokenRefresher {
    /// Create a refresher.
    pub fn new(http: reqwest::Client, config: ClientConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        let url = self
            .config
            .endpoint(paths::REFRESH)
            .map_err(|e| ApiError::network(format!("invalid refresh endpoint: {e}")))?;

        let response = self
            .http
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(&RefreshBody { refresh_token })
            .send()
            .await?;
        let response = ApiResponse::read(response).await?;

        if !response.is_success() {
            return Err(classify_failure(
                response.status.as_u16(),
                &response.body,
                false,
                false,
            ));
        }

        let data: TokenData = decode_data(response.status.as_u16(), &response.body)?;
        Ok(data.tokens)
    }
}

impl FreightlineClient {
    /// Start a one-time passcode login; the code is emailed to the user.
    pub async fn request_login_code(&self, email: &str) -> ApiResult<()> {
        self.send(
            ApiRequest::post(paths::LOGIN)
                .json(&EmailBody { email })
                .without_auth_refresh(),
        )
        .await?;
        debug!("Login code requested");
        Ok(())
    }

    /// Sign in with email and password and store the issued tokens.
    pub async fn login_with_password(&self, email: &str, password: &str) -> ApiResult<()> {
        let response = self
            .send(
                ApiRequest::post(paths::LOGIN_PASSWORD)
                    .json(&PasswordBody { email, password })
                    .without_auth_refresh(),
            )
            .await?;
        self.install_tokens(&response)
    }

    /// Verify a one-time passcode and store the issued tokens.
    pub async fn verify_code(&self, email: &str, code: &str) -> ApiResult<()> {
        let response = self
            .send(
                ApiRequest::post(paths::VERIFY)
                    .json(&VerifyBody { email, code })
                    .without_auth_refresh(),
            )
            .await?;
        self.install_tokens(&response)
    }

    /// Sign out.
    ///
    /// Server-side invalidation is best effort; local credentials are cleared
    /// whatever the outcome.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.credentials().refresh_token {
            let request = ApiRequest::post(paths::LOGOUT)
                .json(&RefreshBody {
                    refresh_token: &refresh_token,
                })
                .without_auth_refresh();
            if let Err(err) = self.send(request).await {
                warn!(error = %err, "Server-side logout failed; clearing local session anyway");
            }
        }
        self.coordinator().sign_out();
    }

    /// Fetch the signed-in user and their memberships.
    pub async fn current_user(&self) -> ApiResult<CurrentUser> {
        self.get_json(paths::ME).await
    }

    /// Re-hydrate session state from stored credentials.
    ///
    /// Returns `Ok(None)` without a network call when nothing is stored.
    pub async fn restore_session(&self) -> ApiResult<Option<CurrentUser>> {
        if self.credentials().is_empty() {
            return Ok(None);
        }
        self.current_user().await.map(Some)
    }

    fn install_tokens(&self, response: &ApiResponse) -> ApiResult<()> {
        let data: TokenData = response.data()?;
        self.coordinator().install(&data.tokens);
        info!("Signed in");
        Ok(())
    }
}
