//! Configuration for portal API clients

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Base URL every request path is appended to
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,

    #[serde(default)]
    pub endpoints: EndpointSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

/// Paths of the authentication endpoints, relative to the base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub login: String,
    pub register: String,
    pub refresh: String,
    pub logout: String,
}

/// Session storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Prefix of the storage keys holding credentials
    pub namespace: String,
}

/// Response cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,

    /// Prefix of the storage keys holding cached responses
    pub namespace: String,

    /// Lifetime of an entry when the request does not set one
    pub default_ttl_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_secs: 10,
            user_agent: concat!("portal-client/", env!("CARGO_PKG_VERSION")).to_string(),
            endpoints: EndpointSettings::default(),
            session: SessionSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            register: "/auth/register".to_string(),
            refresh: "/auth/refresh".to_string(),
            logout: "/auth/logout".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            namespace: "portal".to_string(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "api_cache".to_string(),
            default_ttl_secs: 300,
        }
    }
}

impl ClientSettings {
    /// Load settings from defaults, an optional file and `PORTAL_*` environment variables.
    ///
    /// Nested fields use a double underscore, e.g. `PORTAL_CACHE__DEFAULT_TTL_SECS`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value has the wrong type
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("base_url", defaults.base_url)?
            .set_default("timeout_secs", defaults.timeout_secs)?
            .set_default("user_agent", defaults.user_agent)?
            .set_default("endpoints.login", defaults.endpoints.login)?
            .set_default("endpoints.register", defaults.endpoints.register)?
            .set_default("endpoints.refresh", defaults.endpoints.refresh)?
            .set_default("endpoints.logout", defaults.endpoints.logout)?
            .set_default("session.namespace", defaults.session.namespace)?
            .set_default("cache.enabled", defaults.cache.enabled)?
            .set_default("cache.namespace", defaults.cache.namespace)?
            .set_default("cache.default_ttl_secs", defaults.cache.default_ttl_secs)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("PORTAL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}
