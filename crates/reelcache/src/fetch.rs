// Media fetcher: the raw network primitive behind the cache store.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::Client;
use url::Url;

use crate::CacheConfig;
use crate::error::CacheError;

/// A stream of downloaded byte chunks, so large files never have to be held
/// fully in memory before reaching disk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, CacheError>> + Send>>;

/// The network primitive the cache store downloads through.
///
/// Production code uses [`HttpFetcher`]; tests inject stub implementations.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ByteStream, CacheError>;
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &CacheConfig) -> Result<Client, CacheError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5) // Allow multiple connections to same host
        .user_agent(&config.user_agent)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder.build().map_err(CacheError::from)
}

/// Downloads media over HTTP(S) with a shared connection pool.
pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        Ok(Self {
            http_client: create_client(config)?,
        })
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<ByteStream, CacheError> {
        let parsed = Url::parse(url).map_err(|e| CacheError::Url(format!("{url}: {e}")))?;

        let response = self.http_client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Status(status));
        }

        Ok(Box::pin(response.bytes_stream().map_err(CacheError::from)))
    }
}
