//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPFRONT_API_URL` - Base URL of the commerce API (e.g., `https://api.example.com/v1`)
//!
//! ## Optional
//! - `SHOPFRONT_TOKEN_FILE` - Durable token storage file (default: `.shopfront/tokens.json`)
//! - `SHOPFRONT_HTTP_TIMEOUT_SECS` - Request timeout (default: transport default, none)
//! - `SHOPFRONT_MAINTENANCE_PATH` - Maintenance landing route (default: `/coming-soon`)
//! - `SHOPFRONT_ADMIN_PREFIX` - Admin route prefix (default: `/admin`)
//! - `SHOPFRONT_AUTH_PREFIXES` - Comma-separated auth route prefixes (default: `/login,/register`)
//! - `SHOPFRONT_MAINTENANCE_POLL_SECS` - Re-poll maintenance status on this interval
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_TOKEN_FILE: &str = ".shopfront/tokens.json";
const DEFAULT_MAINTENANCE_PATH: &str = "/coming-soon";
const DEFAULT_ADMIN_PREFIX: &str = "/admin";
const DEFAULT_AUTH_PREFIXES: &str = "/login,/register";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Shopfront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Commerce API connection settings
    pub api: ApiConfig,
    /// Durable token storage location
    pub token_file: PathBuf,
    /// Route classification used by the access gate
    pub routes: RouteConfig,
    /// Re-poll maintenance status on this interval (None = fetch once)
    pub maintenance_poll: Option<Duration>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Commerce API connection settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, always ending in `/` so endpoint paths join beneath it
    pub base_url: Url,
    /// Per-request timeout (None = inherit the transport's behavior)
    pub timeout: Option<Duration>,
}

/// Path prefixes that classify routes for the access gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Prefix of admin routes
    pub admin_prefix: String,
    /// Prefixes of login/registration routes
    pub auth_prefixes: Vec<String>,
    /// Maintenance landing page path
    pub maintenance_path: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            auth_prefixes: split_list(DEFAULT_AUTH_PREFIXES),
            maintenance_path: DEFAULT_MAINTENANCE_PATH.to_string(),
        }
    }
}

impl ApiConfig {
    /// Build API settings from a base URL string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL cannot be parsed or
    /// is not an http(s) URL.
    pub fn from_base_url(raw: &str, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(raw)?,
            timeout,
        })
    }
}

impl ClientConfig {
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
        let api_url = lookup("SHOPFRONT_API_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("SHOPFRONT_API_URL".to_string()))?;
        let timeout = parse_secs(&lookup, "SHOPFRONT_HTTP_TIMEOUT_SECS")?;
        let api = ApiConfig::from_base_url(&api_url, timeout)?;

        let token_file = PathBuf::from(
            lookup("SHOPFRONT_TOKEN_FILE").unwrap_or_else(|| DEFAULT_TOKEN_FILE.to_string()),
        );

        let routes = RouteConfig {
            admin_prefix: route_var(&lookup, "SHOPFRONT_ADMIN_PREFIX", DEFAULT_ADMIN_PREFIX)?,
            auth_prefixes: split_list(
                &lookup("SHOPFRONT_AUTH_PREFIXES")
                    .unwrap_or_else(|| DEFAULT_AUTH_PREFIXES.to_string()),
            ),
            maintenance_path: route_var(
                &lookup,
                "SHOPFRONT_MAINTENANCE_PATH",
                DEFAULT_MAINTENANCE_PATH,
            )?,
        };

        let maintenance_poll = parse_secs(&lookup, "SHOPFRONT_MAINTENANCE_POLL_SECS")?;

        Ok(Self {
            api,
            token_file,
            routes,
            maintenance_poll,
            sentry_dsn: lookup("SENTRY_DSN").filter(|v| !v.is_empty()),
            sentry_environment: lookup("SENTRY_ENVIRONMENT").filter(|v| !v.is_empty()),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and normalize the API base URL so relative joins keep its path.
fn normalize_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidEnvVar("SHOPFRONT_API_URL".to_string(), msg);

    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Parse an optional whole-seconds duration. Zero means "unset".
fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

/// Read a route path variable, requiring a leading slash.
fn route_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    if !value.starts_with('/') {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must start with '/'".to_string(),
        ));
    }
    Ok(value)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
