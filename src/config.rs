//! Configuration management for Turnstile.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::ratelimit::{KeyPolicy, RateLimiter, DEFAULT_SHARDS};

/// Prefix for environment overrides, e.g. `TURNSTILE__RATE_LIMIT__BURST=50`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

/// Rate limiter parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Sustained rate in requests per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Bucket capacity (maximum burst)
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// What requests are keyed by
    #[serde(default)]
    pub key: KeyPolicy,

    /// Seconds between idle-bucket scans
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Seconds a bucket may stay unused before it is evicted
    #[serde(default = "default_max_idle")]
    pub max_idle_secs: u64,

    /// Number of keyspace shards
    #[serde(default = "default_shards")]
    pub shards: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            key: KeyPolicy::default(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_idle_secs: default_max_idle(),
            shards: default_shards(),
        }
    }
}

fn default_requests_per_second() -> f64 {
    10.0
}

fn default_burst() -> u32 {
    20
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_max_idle() -> u64 {
    300
}

fn default_shards() -> usize {
    DEFAULT_SHARDS
}

impl RateLimitSettings {
    /// Start a limiter with these settings. Requires a Tokio runtime.
    pub fn build_limiter(&self) -> Result<RateLimiter> {
        RateLimiter::builder(self.requests_per_second, self.burst)
            .key_extractor(self.key)
            .cleanup_interval(Duration::from_secs(self.cleanup_interval_secs))
            .max_idle_time(Duration::from_secs(self.max_idle_secs))
            .shards(self.shards)
            .build()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
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

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `TURNSTILE__SECTION__FIELD` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(::config::File::from(path).format(::config::FileFormat::Yaml));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a file path, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))
    }
}
