//! Environment-driven configuration.
//!
//! Every knob has a sensible default so `Config::default()` is usable in
//! tests without touching the process environment. `Config::from_env()`
//! overlays `UIVAULT_*` variables on top of the defaults.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while resolving configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub registry: RegistryConfig,
}

/// Element repository configuration.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Path of the JSON store.
    pub storage_path: PathBuf,
    pub cache: CacheConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("element_storage.json"),
            cache: CacheConfig::default(),
        }
    }
}

/// Locator cache sizing.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached element records.
    pub max_entries: usize,
    /// Absolute time-to-live measured from insertion (not sliding).
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Tool registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding one JSON schema document per tool.
    pub schemas_dir: PathBuf,
    pub auth: AuthConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            schemas_dir: PathBuf::from("schemas"),
            auth: AuthConfig::default(),
        }
    }
}

/// Static bearer-token authentication for the server facade.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Whether tool calls whose metadata requires auth must carry a token.
    pub required: bool,
    /// The expected token. Ignored when `required` is false.
    pub token: Option<String>,
}

impl Config {
    /// Resolve configuration from `UIVAULT_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = optional_env("UIVAULT_STORAGE_PATH") {
            config.repository.storage_path = PathBuf::from(path);
        }
        if let Some(value) = optional_env("UIVAULT_CACHE_MAX_ENTRIES") {
            config.repository.cache.max_entries =
                parse_env("UIVAULT_CACHE_MAX_ENTRIES", &value)?;
        }
        if let Some(value) = optional_env("UIVAULT_CACHE_TTL_SECS") {
            config.repository.cache.ttl =
                Duration::from_secs(parse_env("UIVAULT_CACHE_TTL_SECS", &value)?);
        }
        if let Some(path) = optional_env("UIVAULT_SCHEMAS_DIR") {
            config.registry.schemas_dir = PathBuf::from(path);
        }
        if let Some(value) = optional_env("UIVAULT_AUTH_REQUIRED") {
            config.registry.auth.required = parse_bool("UIVAULT_AUTH_REQUIRED", &value)?;
        }
        config.registry.auth.token = optional_env("UIVAULT_AUTH_TOKEN");

        Ok(config)
    }
}

/// Read an env var, treating unset and empty as absent.
fn optional_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
