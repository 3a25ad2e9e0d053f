//! Configuration for tracing output

use serde::{Deserialize, Serialize};

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Main instrumentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// Service name recorded at startup
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Log level filter (e.g., "info", "portal_http=debug")
    pub log_level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            service_name: "portal-client".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl InstrumentationConfig {
    /// Build from `RUST_LOG` and `PORTAL_LOG_FORMAT`
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let format = match std::env::var("PORTAL_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            log_level,
            format,
            ..Self::default()
        }
    }

    /// Verbose configuration for local development
    pub fn dev() -> Self {
        Self {
            log_level: "portal_core=debug,portal_http=debug,portal_sqlx=debug".to_string(),
            ..Self::default()
        }
    }
}
