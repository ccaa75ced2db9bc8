//! Configuration and settings management
//!
//! Loads settings from YAML files and environment variables and defines tuning constants.

use config::{Config, ConfigError, Environment, File};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application settings loaded from `configs/*.yml` and the environment
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token (`TELEGRAM_TOKEN`)
    pub telegram_token: String,
    /// Catalog API key (`API_KEY`)
    pub api_key: String,
    /// Catalog client settings
    #[serde(default)]
    pub catalog: CatalogSettings,
    /// Session store settings
    #[serde(default)]
    pub redis: RedisSettings,
    /// Poster cache settings
    #[serde(default)]
    pub image: ImageSettings,
}

/// Catalog REST API settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogSettings {
    /// Base URL of the catalog API
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    /// Total request timeout in seconds
    #[serde(default = "default_catalog_timeout_secs")]
    pub timeout_secs: u64,
}

/// Session store settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisSettings {
    /// `host:port` of the store; empty selects the in-process store
    #[serde(default = "default_redis_address")]
    pub address: String,
    /// Store password, empty for none
    #[serde(default)]
    pub password: String,
    /// Numeric database id
    #[serde(default)]
    pub db: i64,
    /// Absolute TTL of each session write, in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

/// Poster cache settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImageSettings {
    /// Interval between full cache sweeps, in seconds
    #[serde(default = "default_image_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Image uploaded whenever a poster cannot be fetched
    #[serde(default = "default_fallback_path")]
    pub fallback_path: PathBuf,
}

fn default_catalog_base_url() -> String {
    "https://api.kinopoisk.dev".to_string()
}

const fn default_catalog_timeout_secs() -> u64 {
    CATALOG_HTTP_TIMEOUT_SECS
}

fn default_redis_address() -> String {
    "127.0.0.1:6379".to_string()
}

const fn default_session_ttl_secs() -> u64 {
    3600
}

const fn default_image_cache_ttl_secs() -> u64 {
    600
}

fn default_fallback_path() -> PathBuf {
    PathBuf::from(FALLBACK_POSTER_PATH)
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            timeout_secs: default_catalog_timeout_secs(),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            address: default_redis_address(),
            password: String::new(),
            db: 0,
            ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_image_cache_ttl_secs(),
            fallback_path: default_fallback_path(),
        }
    }
}

impl Settings {
    /// Create new settings by loading from files and environment
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("configs/config").required(false))
            .add_source(File::with_name(&format!("configs/{run_mode}")).required(false))
            // Not checked into git
            .add_source(File::with_name("configs/local").required(false))
            // Eg.. `APP_REDIS__ADDRESS=redis:6379` sets `redis.address`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // TELEGRAM_TOKEN -> telegram_token, API_KEY -> api_key
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Session TTL applied to every store write
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.redis.ttl_secs)
    }

    /// Interval between poster cache sweeps
    #[must_use]
    pub const fn image_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.image.cache_ttl_secs)
    }

    /// Redis connection parameters built from address, password and database id
    ///
    /// The password is passed as-is, so it may contain any character.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the address has an invalid port.
    pub fn redis_connection_info(&self) -> Result<ConnectionInfo, ConfigError> {
        let (host, port) = match self.redis.address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|e| {
                    ConfigError::Message(format!("invalid redis.address port {port:?}: {e}"))
                })?;
                (host, port)
            }
            None => (self.redis.address.as_str(), DEFAULT_REDIS_PORT),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');

        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_string(), port),
            redis: RedisConnectionInfo {
                db: self.redis.db,
                password: Some(self.redis.password.clone()).filter(|p| !p.is_empty()),
                ..RedisConnectionInfo::default()
            },
        })
    }
}

/// Port used when `redis.address` has none
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Number of records requested per catalog page
pub const CATALOG_PAGE_SIZE: u32 = 10;
/// Default catalog request timeout
pub const CATALOG_HTTP_TIMEOUT_SECS: u64 = 15;

/// Telegram caption limit in UTF-16 code units
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;
/// Long-poll timeout for `getUpdates`
pub const TELEGRAM_POLL_TIMEOUT_SECS: u64 = 60;

/// Maximum retry attempts for Telegram API calls
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff delay in milliseconds
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff delay in milliseconds
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

/// Total deadline of a single poster download
pub const POSTER_FETCH_TIMEOUT_SECS: u64 = 10;
/// Poster bodies are read up to this many bytes
pub const POSTER_MAX_BYTES: usize = 5 << 20;
/// Posters smaller than this are rejected
pub const POSTER_MIN_BYTES: usize = 512;
/// Default location of the bundled fallback poster
pub const FALLBACK_POSTER_PATH: &str = "./static/not-found.png";

/// Deadline for the session store ping at startup
pub const SESSION_STORE_PING_TIMEOUT_SECS: u64 = 5;
