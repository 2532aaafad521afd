use reqwest::StatusCode;

// Custom error type for cache and fetch operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status code {0}")]
    Status(StatusCode),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("empty response body for {0}")]
    EmptyBody(String),

    #[error("entry of {size} bytes exceeds cache budget of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("in-flight download for {0} failed")]
    FetchFailed(String),
}

impl CacheError {
    /// Whether this failure came from the network rather than local storage.
    ///
    /// Network failures are transient from the cache's point of view; a later
    /// prefetch pass naming the same URL simply retries it.
    pub fn is_network(&self) -> bool {
        matches!(self, CacheError::Http(_) | CacheError::Status(_))
    }
}
