//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHAFT_*)
//! 2. TOML config file (if SHAFT_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// How a stale record is revalidated when it is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevalidatePolicy {
    /// Return the stale record immediately and refresh in the background.
    /// Bounds latency at the cost of temporary staleness.
    #[default]
    ServeStaleThenRefresh,
    /// Wait for the refresh; on refresh failure the stale record is still
    /// served (fail-open).
    RefreshThenServe,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHAFT_*)
/// 2. TOML config file (if SHAFT_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite resource database.
    ///
    /// Set via SHAFT_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for outbound requests.
    ///
    /// Set via SHAFT_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via SHAFT_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Per-attempt fetch timeout in milliseconds.
    ///
    /// Set via SHAFT_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum redirects to follow per fetch.
    ///
    /// Set via SHAFT_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Fetch attempt ceiling for transient failures.
    ///
    /// Set via SHAFT_MAX_RETRIES environment variable.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential retry backoff, in milliseconds.
    ///
    /// Set via SHAFT_RETRY_BACKOFF_MS environment variable.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Default TTL applied to fetched records, in seconds.
    ///
    /// Absent means records never auto-expire unless the caller overrides
    /// the TTL per resolve. Set via SHAFT_DEFAULT_TTL_SECS.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,

    /// How long a resolve call waits on an in-flight fetch, in milliseconds.
    ///
    /// Set via SHAFT_RESOLVE_TIMEOUT_MS environment variable.
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,

    /// Stale-record revalidation policy.
    ///
    /// Set via SHAFT_REVALIDATE_POLICY environment variable
    /// (`serve_stale_then_refresh` or `refresh_then_serve`).
    #[serde(default)]
    pub revalidate_policy: RevalidatePolicy,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shaft-cache.sqlite")
}

fn default_user_agent() -> String {
    "shaft/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_resolve_timeout_ms() -> u64 {
    30_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            default_ttl_secs: None,
            resolve_timeout_ms: default_resolve_timeout_ms(),
            revalidate_policy: RevalidatePolicy::default(),
        }
    }
}

impl AppConfig {
    /// Per-attempt fetch timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve-call timeout as a Duration.
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// Default record TTL as a Duration, if configured.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHAFT_`
    /// 2. TOML file from `SHAFT_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be read or validation
    /// fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHAFT_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHAFT_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
