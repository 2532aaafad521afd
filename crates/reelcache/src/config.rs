use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Configurable options for the cache store
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding cached files. When `None`, a `reelcache` directory
    /// under the system temp dir is used.
    pub cache_dir: Option<PathBuf>,

    /// Maximum total size of cached files in bytes
    pub max_cache_size: u64,

    /// Age after which a cached entry expires
    pub ttl: Duration,

    /// Overall timeout for a single download
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_cache_size: 500 * 1024 * 1024, // 500MiB
            ttl: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl CacheConfig {
    pub fn builder() -> crate::builder::CacheConfigBuilder {
        crate::builder::CacheConfigBuilder::new()
    }
}
