//! Client configuration.

use crate::error::ConfigError;
use std::time::Duration;
use url::Url;

/// Default API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.freightline.app";

/// Default base domain tenants are hosted under.
pub const DEFAULT_BASE_DOMAIN: &str = "freightline.app";

/// Configuration for a [`FreightlineClient`](crate::FreightlineClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto.
    pub api_base_url: Url,
    /// Domain whose subdomains identify tenants.
    pub base_domain: String,
    /// Subdomains that never name a tenant.
    pub reserved_subdomains: Vec<String>,
    /// Upper bound on a single token refresh call.
    pub refresh_timeout: Duration,
    /// Per-request timeout applied to the HTTP client.
    pub request_timeout: Option<Duration>,
    /// Login entry point the host navigates to when the session ends.
    pub login_path: String,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            base_domain: DEFAULT_BASE_DOMAIN.to_string(),
            reserved_subdomains: vec!["www".into(), "app".into(), "api".into()],
            refresh_timeout: Duration::from_secs(30),
            request_timeout: Some(Duration::from_secs(60)),
            login_path: "/login".to_string(),
            user_agent: concat!("freightline-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `FREIGHTLINE_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("FREIGHTLINE_API_URL") {
            config = config.with_api_url(&url)?;
        }
        if let Ok(domain) = std::env::var("FREIGHTLINE_BASE_DOMAIN") {
            config = config.with_base_domain(domain);
        }
        if let Some(secs) = env_secs("FREIGHTLINE_REFRESH_TIMEOUT_SECS")? {
            config = config.with_refresh_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = env_secs("FREIGHTLINE_REQUEST_TIMEOUT_SECS")? {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Set the API base URL.
    pub fn with_api_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.api_base_url = Url::parse(url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(self)
    }

    /// Set the tenant base domain.
    #[must_use]
    pub fn with_base_domain(mut self, domain: impl Into<String>) -> Self {
        self.base_domain = domain.into().trim_matches('.').to_ascii_lowercase();
        self
    }

    /// Replace the reserved subdomain list.
    #[must_use]
    pub fn with_reserved_subdomains<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_subdomains = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the refresh call timeout.
    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Disable the per-request timeout.
    #[must_use]
    pub fn without_request_timeout(mut self) -> Self {
        self.request_timeout = None;
        self
    }

    /// Set the login entry point.
    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Resolve a request path against the base URL.
    ///
    /// Leading slashes are ignored so that a base URL with a path prefix
    /// (`https://host/api/`) keeps its prefix.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.api_base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
    }
}

fn default_api_url() -> Url {
    Url::parse(DEFAULT_API_URL).expect("DEFAULT_API_URL is a valid URL")
}

fn env_secs(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base_url.as_str(), "https://api.freightline.app/");
        assert_eq!(config.base_domain, "freightline.app");
        assert_eq!(config.refresh_timeout, Duration::from_secs(30));
        assert_eq!(config.login_path, "/login");
        assert!(config.reserved_subdomains.contains(&"www".to_string()));
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new()
            .with_api_url("http://localhost:4000")
            .unwrap()
            .with_base_domain(".Example.COM")
            .with_refresh_timeout(Duration::from_secs(5))
            .without_request_timeout()
            .with_reserved_subdomains(["portal"]);

        assert_eq!(config.base_domain, "example.com");
        assert_eq!(config.refresh_timeout, Duration::from_secs(5));
        assert!(config.request_timeout.is_none());
        assert_eq!(config.reserved_subdomains, vec!["portal".to_string()]);
    }

    #[test]
    fn test_invalid_url() {
        let err = ClientConfig::new().with_api_url("not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_endpoint_keeps_prefix() {
        let config = ClientConfig::new()
            .with_api_url("https://host.test/api")
            .unwrap();
        assert_eq!(
            config.endpoint("/v1/auth/me").unwrap().as_str(),
            "https://host.test/api/v1/auth/me"
        );

        let config = ClientConfig::new().with_api_url("https://host.test").unwrap();
        assert_eq!(
            config.endpoint("v1/drivers").unwrap().as_str(),
            "https://host.test/v1/drivers"
        );
    }
}
