//! Configuration management for Linkgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{LinkgateError, Result};

/// Secret used when none is configured. Only suitable for local development.
pub const DEFAULT_SECRET: &str = "linkgate-development-secret-change-me";

/// Main configuration for the Linkgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Credential signing configuration
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Cross-origin configuration
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Per route-class rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Limits applied to every request
    #[serde(default = "RouteLimitConfig::general")]
    pub general: RouteLimitConfig,

    /// Stricter limits for login and registration
    #[serde(default = "RouteLimitConfig::auth")]
    pub auth: RouteLimitConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            general: RouteLimitConfig::general(),
            auth: RouteLimitConfig::auth(),
        }
    }
}

/// Token bucket parameters for one class of routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLimitConfig {
    /// Bucket size, i.e. the largest burst a client can send
    pub capacity: u64,
    /// Tokens added per second
    pub refill_per_second: u64,
    /// Visitors unseen for longer than this are evicted
    pub idle_timeout_secs: u64,
    /// How often the eviction sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

impl RouteLimitConfig {
    /// Defaults for general traffic.
    pub fn general() -> Self {
        Self {
            capacity: 10,
            refill_per_second: 100,
            idle_timeout_secs: 600,
            sweep_interval_secs: default_sweep_interval(),
        }
    }

    /// Defaults for authentication endpoints.
    pub fn auth() -> Self {
        Self {
            capacity: 5,
            refill_per_second: 5,
            idle_timeout_secs: 900,
            sweep_interval_secs: default_sweep_interval(),
        }
    }

    /// Idle time after which a visitor is evicted.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Period of the eviction sweep.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    fn validate(&self, class: &str) -> Result<()> {
        if self.capacity == 0 {
            return Err(LinkgateError::Config(format!(
                "rate_limiting.{class}.capacity must be greater than zero"
            )));
        }
        if self.refill_per_second == 0 {
            return Err(LinkgateError::Config(format!(
                "rate_limiting.{class}.refill_per_second must be greater than zero"
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(LinkgateError::Config(format!(
                "rate_limiting.{class}.sweep_interval_secs must be greater than zero"
            )));
        }
        Ok(())
    }
}

/// Credential signing configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// HMAC signing secret
    #[serde(default = "default_secret")]
    pub secret: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
        }
    }
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn default_secret() -> String {
    DEFAULT_SECRET.to_string()
}

impl CredentialConfig {
    /// Whether the built-in development secret is still in use.
    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_SECRET
    }
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to make credentialed requests
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:8080".to_string(),
        "https://localhost:8080".to_string(),
    ]
}

impl LinkgateConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment variables use the `LINKGATE` prefix and `__` as the
    /// nesting separator, e.g. `LINKGATE_CREDENTIALS__SECRET`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(Self::defaults_source()?);

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path));
        }

        let config: LinkgateConfig = builder
            .add_source(
                config::Environment::with_prefix("LINKGATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins"),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| LinkgateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// Keys absent from the document keep their defaults, field by field.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let overrides: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| LinkgateError::Config(format!("Failed to parse configuration: {}", e)))?;

        let mut builder = config::Config::builder().add_source(Self::defaults_source()?);
        if !overrides.is_null() {
            builder = builder.add_source(
                config::Config::try_from(&overrides)
                    .map_err(|e| LinkgateError::Config(e.to_string()))?,
            );
        }

        let config: LinkgateConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| LinkgateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Every default value as the lowest-priority source, so a partial
    /// section from a file or the environment only replaces the keys it sets.
    fn defaults_source() -> Result<config::Config> {
        config::Config::try_from(&LinkgateConfig::default())
            .map_err(|e| LinkgateError::Config(e.to_string()))
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.general.validate("general")?;
        self.rate_limiting.auth.validate("auth")?;

        if self.credentials.secret.is_empty() {
            return Err(LinkgateError::Config(
                "credentials.secret must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
