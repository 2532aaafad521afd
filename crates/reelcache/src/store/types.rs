//! # Store Types
//!
//! This module defines common types used across the cache store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Content-addressed key for a cached video: the MD5 digest of the source
/// URL, hex-encoded. Used as the on-disk filename stem so a lookup never
/// requires a directory scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a source URL. Same URL, same key, always.
    pub fn from_url(url: &str) -> Self {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        hasher.update(url.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// The hex digest used as the filename stem.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

/// One cached video resident on disk.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Remote URL the bytes were fetched from
    pub source_url: String,
    /// Absolute path of the cached file
    pub file_path: PathBuf,
    /// Insertion time, unix millis; drives TTL expiry
    pub created_at: u64,
    /// Size of the cached file in bytes
    pub size_bytes: u64,
    /// Insertion sequence, drives FIFO eviction order
    pub(crate) seq: u64,
}

/// Sidecar metadata persisted next to each cached file, so the index can be
/// rebuilt after a restart and re-verified against the filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryMeta {
    pub source_url: String,
    pub created_at: u64,
    pub size_bytes: u64,
}

/// Aggregate cache numbers for diagnostics and telemetry surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub file_count: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
