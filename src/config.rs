//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default store capacity: 100 MiB
pub const DEFAULT_MAX_CAPACITY_BYTES: u64 = 100 * 1024 * 1024;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of payload bytes the disk store can hold
    pub max_capacity_bytes: u64,
    /// Directory holding content files and the index
    pub content_root: PathBuf,
    /// Max entry age in seconds, 0 disables expiry
    pub max_age_secs: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background maintenance interval in seconds
    pub cleanup_interval: u64,
    /// Per-request network timeout in seconds
    pub fetch_timeout_secs: u64,
}

/// Options consumed by the disk store.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub max_capacity_bytes: u64,
    pub content_root: PathBuf,
    pub max_age: Option<Duration>,
}

impl CacheOptions {
    /// Options with no expiry.
    pub fn new(content_root: impl Into<PathBuf>, max_capacity_bytes: u64) -> Self {
        Self {
            max_capacity_bytes,
            content_root: content_root.into(),
            max_age: None,
        }
    }

    /// Sets the max entry age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_CAPACITY_BYTES` - Store capacity in bytes (default: 104857600)
    /// - `CONTENT_ROOT` - Cache directory (default: ./cache-data)
    /// - `MAX_AGE_SECS` - Entry max age, 0 = never expire (default: 0)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Maintenance frequency in seconds (default: 30)
    /// - `FETCH_TIMEOUT_SECS` - Network timeout in seconds (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_capacity_bytes: parse_var("MAX_CAPACITY_BYTES")
                .unwrap_or(defaults.max_capacity_bytes),
            content_root: env::var("CONTENT_ROOT")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.content_root),
            max_age_secs: parse_var("MAX_AGE_SECS").unwrap_or(defaults.max_age_secs),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT_SECS")
                .unwrap_or(defaults.fetch_timeout_secs),
        }
    }

    /// Derives the disk store options.
    pub fn cache_options(&self) -> CacheOptions {
        let options = CacheOptions::new(&self.content_root, self.max_capacity_bytes);
        match self.max_age_secs {
            0 => options,
            secs => options.with_max_age(Duration::from_secs(secs)),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_capacity_bytes: DEFAULT_MAX_CAPACITY_BYTES,
            content_root: PathBuf::from("./cache-data"),
            max_age_secs: 0,
            server_port: 3000,
            cleanup_interval: 30,
            fetch_timeout_secs: 30,
        }
    }
}
