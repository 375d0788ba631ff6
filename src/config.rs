//! Configuration management for the rate limit client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::Result;

/// Prefix for environment variable overrides, e.g.
/// `RATELIMIT__RATE_LIMIT_SERVICE__TARGET=http://rls:8081`.
const ENV_PREFIX: &str = "RATELIMIT";

/// Main configuration for the rate limit client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Remote rate limit service. When absent, rate limiting is disabled and
    /// every check is allowed.
    #[serde(default)]
    pub rate_limit_service: Option<RateLimitServiceConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for a remote rate limit service.
///
/// Decision clients treat this as opaque; it is handed back unchanged by
/// [`ClientFactory::rate_limit_config`](crate::ratelimit::ClientFactory::rate_limit_config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitServiceConfig {
    /// URI of the service, e.g. `http://127.0.0.1:8081`
    #[serde(default = "default_target")]
    pub target: String,

    /// Default per-call timeout in milliseconds. Unset means calls are not
    /// bounded by the channel.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Timeout for establishing a connection, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for RateLimitServiceConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            timeout_ms: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl RateLimitServiceConfig {
    /// Default per-call timeout, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Connection establishment timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_target() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading client configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from an optional file, then apply environment
    /// overrides prefixed with `RATELIMIT__`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading client configuration");
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}
