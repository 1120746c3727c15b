//! Client configuration
//!
//! Defaults suit a desktop client; `from_env` lets deployments move the cache
//! root or change the timeout without code changes.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Directory name below the platform cache directory
const CACHE_DIR_NAME: &str = "webdav-client";

/// Default HTTP request timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default memory budget for raw file bytes: 64 MB
const DEFAULT_DATA_CAPACITY_BYTES: u64 = 64 * 1024 * 1024;

/// Default memory budget for decoded images: 128 MB
const DEFAULT_IMAGE_CAPACITY_BYTES: u64 = 128 * 1024 * 1024;

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "WEBDAV_CACHE_DIR";

/// Environment variable overriding the request timeout, in seconds
pub const TIMEOUT_ENV: &str = "WEBDAV_TIMEOUT_SECS";

/// Settings for a [`crate::WebDav`] client
#[derive(Debug, Clone)]
pub struct WebDavConfig {
    /// Root of the disk cache tree
    pub cache_root: PathBuf,
    /// Timeout applied by the default transport
    pub request_timeout: Duration,
    /// Maximum number of cached directory listings in memory
    pub listing_capacity: u64,
    /// Memory budget for raw downloaded bytes
    pub data_capacity_bytes: u64,
    /// Memory budget for decoded images
    pub image_capacity_bytes: u64,
    /// Maximum number of paths with cached thumbnails in memory
    pub thumbnail_capacity: u64,
}

impl Default for WebDavConfig {
    fn default() -> Self {
        let cache_root = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(CACHE_DIR_NAME);

        Self {
            cache_root,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            listing_capacity: 1_000,
            data_capacity_bytes: DEFAULT_DATA_CAPACITY_BYTES,
            image_capacity_bytes: DEFAULT_IMAGE_CAPACITY_BYTES,
            thumbnail_capacity: 500,
        }
    }
}

impl WebDavConfig {
    /// Defaults, overridden by `WEBDAV_CACHE_DIR` and `WEBDAV_TIMEOUT_SECS` when set
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.is_empty() {
                config.cache_root = PathBuf::from(dir);
            }
        }

        if let Ok(secs) = std::env::var(TIMEOUT_ENV) {
            match secs.parse::<u64>() {
                Ok(secs) => config.request_timeout = Duration::from_secs(secs),
                Err(e) => warn!(value = %secs, error = %e, "Ignoring invalid {}", TIMEOUT_ENV),
            }
        }

        config
    }

    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.cache_root = cache_root.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
