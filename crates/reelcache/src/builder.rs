//! # Builder for CacheConfig
//!
//! This module provides a builder pattern implementation for creating and
//! customizing CacheConfig instances with a fluent API.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use reelcache_engine::CacheConfig;
//!
//! // Create a config with the builder
//! let config = CacheConfig::builder()
//!     .with_max_cache_size(200 * 1024 * 1024)
//!     .with_ttl(Duration::from_secs(24 * 60 * 60))
//!     .with_timeout(Duration::from_secs(60))
//!     .with_user_agent("FeedPlayer/1.0")
//!     .build();
//!
//! assert_eq!(config.max_cache_size, 200 * 1024 * 1024);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::CacheConfig;

/// Builder for creating CacheConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    /// Internal config being built
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
        }
    }

    /// Set the directory cached files are written to
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Set the maximum total size of cached files in bytes
    pub fn with_max_cache_size(mut self, bytes: u64) -> Self {
        self.config.max_cache_size = bytes;
        self
    }

    /// Set the age after which a cached entry expires
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Set the overall timeout for a single download
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the final CacheConfig
    pub fn build(self) -> CacheConfig {
        self.config
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_config_defaults() {
        let built = CacheConfigBuilder::new().build();
        let defaults = CacheConfig::default();
        assert_eq!(built.max_cache_size, defaults.max_cache_size);
        assert_eq!(built.ttl, defaults.ttl);
        assert_eq!(built.timeout, defaults.timeout);
        assert_eq!(built.user_agent, defaults.user_agent);
        assert!(built.cache_dir.is_none());
    }

    #[test]
    fn builder_overrides_stick() {
        let config = CacheConfig::builder()
            .with_cache_dir("/tmp/feed-cache")
            .with_max_cache_size(1024)
            .with_ttl(Duration::from_secs(60))
            .with_follow_redirects(false)
            .with_user_agent("test-agent")
            .build();

        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/feed-cache")));
        assert_eq!(config.max_cache_size, 1024);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert!(!config.follow_redirects);
        assert_eq!(config.user_agent, "test-agent");
    }
}
