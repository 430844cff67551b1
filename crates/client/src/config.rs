//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CARTWHEEL_API_URL` - Base URL of the shop service (e.g., `https://shop.example.com/api`)
//!
//! ## Optional
//! - `CARTWHEEL_STATE_FILE` - Where the session mirror is persisted
//!   (default: `.cartwheel/session.json`)
//! - `CARTWHEEL_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: none)
//! - `CARTWHEEL_CATALOG_CACHE_TTL_SECS` - Catalog cache TTL (default: 300)
//! - `CARTWHEEL_CATALOG_CACHE_CAPACITY` - Catalog cache entries (default: 1000)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_STATE_FILE: &str = ".cartwheel/session.json";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the shop service. Always ends with `/` so relative
    /// endpoint paths join under it.
    pub api_url: Url,
    /// File holding the persisted session mirror.
    pub state_file: PathBuf,
    /// Per-request timeout. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Catalog response cache settings.
    pub catalog_cache: CatalogCacheConfig,
}

/// In-memory catalog cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogCacheConfig {
    /// How long a cached response stays fresh.
    pub ttl: Duration,
    /// Maximum number of cached responses.
    pub capacity: u64,
}

impl Default for CatalogCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Build a configuration for `api_url` with every optional setting at its
    /// default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL is not http(s).
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            request_timeout: None,
            catalog_cache: CatalogCacheConfig::default(),
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("CARTWHEEL_API_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("CARTWHEEL_API_URL".to_string()))?;

        let state_file = lookup("CARTWHEEL_STATE_FILE")
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_FILE), PathBuf::from);

        let request_timeout = lookup("CARTWHEEL_REQUEST_TIMEOUT_SECS")
            .map(|v| parse_secs("CARTWHEEL_REQUEST_TIMEOUT_SECS", &v))
            .transpose()?;

        let ttl = lookup("CARTWHEEL_CATALOG_CACHE_TTL_SECS")
            .map(|v| parse_secs("CARTWHEEL_CATALOG_CACHE_TTL_SECS", &v))
            .transpose()?
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_CACHE_TTL_SECS));

        let capacity = lookup("CARTWHEEL_CATALOG_CACHE_CAPACITY")
            .map(|v| {
                v.trim().parse::<u64>().map_err(|e| {
                    ConfigError::InvalidEnvVar(
                        "CARTWHEEL_CATALOG_CACHE_CAPACITY".to_string(),
                        e.to_string(),
                    )
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_CACHE_CAPACITY);

        Ok(Self {
            api_url: parse_api_url(&api_url)?,
            state_file,
            request_timeout,
            catalog_cache: CatalogCacheConfig { ttl, capacity },
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and normalize the service base URL.
fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidEnvVar("CARTWHEEL_API_URL".to_string(), msg);

    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("not a base URL".to_string()));
    }
    // Url::join replaces the last path segment unless the path ends with '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Parse a positive number of seconds.
fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}
