//! Tenant resolution from the current navigation location.

use parking_lot::RwLock;
use regex::Regex;
use std::sync::OnceLock;

/// Where the host application currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// Host, optionally with a port (`acme.freightline.app:8443`).
    pub host: String,
    /// Path component (`/o/acme/loads`).
    pub path: String,
}

impl Location {
    /// Create a new location.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }

    /// Build a location from a full URL.
    pub fn from_url(url: &url::Url) -> Self {
        Self {
            host: url.host_str().unwrap_or_default().to_string(),
            path: url.path().to_string(),
        }
    }
}

/// Supplies the ambient navigation location.
#[cfg_attr(test, mockall::automock)]
pub trait LocationSource: Send + Sync {
    /// Current location.
    fn current(&self) -> Location;
}

/// Location held in memory and updated by the host as it navigates.
#[derive(Debug, Default)]
pub struct StaticLocation {
    inner: RwLock<Location>,
}

impl StaticLocation {
    /// Create a source pinned to `location`.
    pub fn new(location: Location) -> Self {
        Self {
            inner: RwLock::new(location),
        }
    }

    /// Record a navigation.
    pub fn navigate(&self, location: Location) {
        *self.inner.write() = location;
    }
}

impl LocationSource for StaticLocation {
    fn current(&self) -> Location {
        self.inner.read().clone()
    }
}

fn org_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^/o/([^/?#]+)(?:/|$)").expect("valid org path regex"))
}

/// Derives the active organization slug.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    base_domain: String,
    reserved: Vec<String>,
}

impl TenantResolver {
    /// Create a resolver for tenants hosted under `base_domain`.
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into().trim_matches('.').to_ascii_lowercase(),
            reserved: Vec::new(),
        }
    }

    /// Subdomains that never identify a tenant.
    #[must_use]
    pub fn with_reserved<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved = labels
            .into_iter()
            .map(|l| l.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Resolve the tenant slug for `location`.
    ///
    /// A tenant subdomain of the base domain wins over an `/o/{slug}` path
    /// segment. Returns `None` when neither applies.
    pub fn resolve(&self, location: &Location) -> Option<String> {
        self.from_host(&location.host)
            .or_else(|| self.from_path(&location.path))
    }

    fn from_host(&self, host: &str) -> Option<String> {
        if self.base_domain.is_empty() {
            return None;
        }

        let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();
        if host == self.base_domain {
            return None;
        }

        let prefix = host.strip_suffix(&self.base_domain)?.strip_suffix('.')?;
        let label = prefix.rsplit('.').next()?;
        if label.is_empty() || self.reserved.iter().any(|r| r == label) {
            return None;
        }

        Some(label.to_string())
    }

    fn from_path(&self, path: &str) -> Option<String> {
        org_path_pattern()
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn resolver() -> TenantResolver {
        TenantResolver::new("freightline.app").with_reserved(["www", "app", "api"])
    }

    #[rstest]
    #[case("acme.freightline.app", "/", Some("acme"))]
    #[case("ACME.Freightline.app:8443", "/dashboard", Some("acme"))]
    #[case("eu.acme.freightline.app", "/", Some("acme"))]
    #[case("freightline.app", "/o/bigrig/loads", Some("bigrig"))]
    #[case("freightline.app", "/o/bigrig", Some("bigrig"))]
    #[case("app.freightline.app", "/o/bigrig/drivers/12", Some("bigrig"))]
    #[case("acme.freightline.app", "/o/other/loads", Some("acme"))]
    #[case("www.freightline.app", "/dashboard", None)]
    #[case("freightline.app", "/login", None)]
    #[case("freightline.app", "/o/", None)]
    #[case("freightline.app", "/org/acme", None)]
    #[case("notfreightline.app", "/", None)]
    #[case("localhost:3000", "/o/dev-fleet/trucks", Some("dev-fleet"))]
    fn test_resolve(#[case] host: &str, #[case] path: &str, #[case] expected: Option<&str>) {
        let location = Location::new(host, path);
        assert_eq!(resolver().resolve(&location).as_deref(), expected);
    }

    #[test]
    fn test_static_location_navigation() {
        let source = StaticLocation::new(Location::new("freightline.app", "/login"));
        assert_eq!(resolver().resolve(&source.current()), None);

        source.navigate(Location::new("freightline.app", "/o/acme/loads"));
        assert_eq!(resolver().resolve(&source.current()).as_deref(), Some("acme"));
    }

    #[test]
    fn test_location_from_url() {
        let url = url::Url::parse("https://acme.freightline.app:8443/o/x/loads?page=2").unwrap();
        let location = Location::from_url(&url);
        assert_eq!(location.host, "acme.freightline.app");
        assert_eq!(location.path, "/o/x/loads");
    }
}
