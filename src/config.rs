//! Configuration types for relay-dl

use crate::error::{Error, Result};
use crate::target_policy::TargetPolicy;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Local storage and retention configuration
///
/// Groups settings related to where fetched files live and how long they stay.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageConfig {
    /// Directory served under `/downloads` (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Directory holding partially fetched files (default: "./temp")
    ///
    /// Never served. Files move to `download_dir` once complete.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// How long a finished job (and its file) is kept (default: 10 minutes)
    #[serde(default = "default_retention", with = "duration_secs")]
    #[schema(value_type = u64)]
    pub retention: Duration,

    /// Longest idle wait of the expiry sweep loop (default: 30 seconds)
    #[serde(default = "default_sweep_interval", with = "duration_secs")]
    #[schema(value_type = u64)]
    pub sweep_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            retention: default_retention(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Outbound fetch configuration, shared by the job fetcher and the live proxy
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchConfig {
    /// Which source links may be fetched (default: deny private addresses)
    #[serde(default)]
    pub target_policy: TargetPolicy,

    /// User-Agent sent when the client did not supply one
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// TCP connect timeout; there is no overall request timeout
    #[serde(default, with = "option_duration_secs")]
    #[schema(value_type = Option<u64>)]
    pub connect_timeout: Option<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            target_policy: TargetPolicy::default(),
            user_agent: default_user_agent(),
            connect_timeout: None,
        }
    }
}

/// Wait page behaviour of the redirect resolver
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RedirectConfig {
    /// Seconds between automatic refreshes of the wait page (default: 5)
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u32,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            refresh_seconds: default_refresh_seconds(),
        }
    }
}

/// Main configuration for JobManager
///
/// Fields are organized into logical sub-configs:
/// - [`storage`](StorageConfig) - directories and retention
/// - [`fetch`](FetchConfig) - outbound request policy
/// - [`redirect`](RedirectConfig) - wait page refresh
/// - [`server`](ServerIntegrationConfig) - HTTP API
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Storage and retention settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound fetch settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Redirect resolver settings
    #[serde(default)]
    pub redirect: RedirectConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Check settings that serde defaults cannot guard
    pub fn validate(&self) -> Result<()> {
        if self.storage.retention.is_zero() {
            return Err(config_error(
                "retention must be greater than zero",
                "storage.retention",
            ));
        }
        if self.storage.sweep_interval.is_zero() {
            return Err(config_error(
                "sweep interval must be greater than zero",
                "storage.sweep_interval",
            ));
        }
        if self.storage.download_dir == self.storage.temp_dir {
            return Err(config_error(
                "download_dir and temp_dir must differ so partial files are never served",
                "storage.temp_dir",
            ));
        }
        if self.redirect.refresh_seconds == 0 {
            return Err(config_error(
                "refresh interval must be at least one second",
                "redirect.refresh_seconds",
            ));
        }
        if let Some(base) = &self.server.api.public_base_url {
            let parsed = url::Url::parse(base).map_err(|e| {
                config_error(
                    format!("invalid public_base_url '{}': {}", base, e),
                    "server.api.public_base_url",
                )
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(config_error(
                    "public_base_url must use http or https",
                    "server.api.public_base_url",
                ));
            }
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:4000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Externally reachable base URL used in returned links
    ///
    /// When unset, links are built from the request's `Host` header.
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Optional API key for authentication
    ///
    /// The redirect resolver and file delivery stay public so links work in a browser.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_base_url: None,
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate limiting configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RateLimitConfig {
    /// Enable rate limiting (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Requests per second per IP (default: 5)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Burst size (default: 5)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Path prefixes exempt from rate limiting
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,

    /// IPs exempt from rate limiting
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub exempt_ips: Vec<std::net::IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
            exempt_paths: default_exempt_paths(),
            exempt_ips: Vec::new(),
        }
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_retention() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("relay-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_refresh_seconds() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_burst_size() -> u32 {
    5
}

fn default_exempt_paths() -> Vec<String> {
    vec![
        "/dl/".to_string(),
        "/downloads/".to_string(),
        "/health".to_string(),
    ]
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|o| o.map(Duration::from_secs))
    }
}
