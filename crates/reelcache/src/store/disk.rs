//! # Disk Cache Store
//!
//! Content-addressed, disk-backed storage for fetched video bytes. Callers
//! only ever know source URLs; the store maps them to local files, bounds
//! total size by evicting oldest-inserted entries first, and expires entries
//! past their TTL.
//!
//! Layout under the cache root: `<md5hex>.mp4` data files with `<md5hex>.meta`
//! JSON sidecars. Downloads land in `<md5hex>.mp4.part` first and are renamed
//! into place, so a concurrent reader never observes a partial file. Temp
//! files live inside the cache root; the rename stays on one volume.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::fetch::{HttpFetcher, MediaFetcher};

use super::inflight::{FlightGuard, FlightTicket, InFlightTable};
use super::types::{CacheEntry, CacheKey, CacheStats, EntryMeta, now_millis};

#[derive(Default)]
struct StoreState {
    entries: HashMap<CacheKey, CacheEntry>,
    total_bytes: u64,
    next_seq: u64,
}

/// Disk-backed video cache. Cheap to clone; clones share the same index.
#[derive(Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
    max_cache_size: u64,
    ttl: Duration,
    fetcher: Arc<dyn MediaFetcher>,
    state: Arc<Mutex<StoreState>>,
    in_flight: Arc<InFlightTable>,
}

impl CacheStore {
    /// Create a store downloading over HTTP with the given configuration.
    pub async fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Self::with_fetcher(config, fetcher).await
    }

    /// Create a store with an injected fetcher.
    pub async fn with_fetcher(
        config: CacheConfig,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Result<Self, CacheError> {
        let cache_dir = config
            .cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("reelcache"));
        fs::create_dir_all(&cache_dir).await?;

        let store = Self {
            cache_dir,
            max_cache_size: config.max_cache_size,
            ttl: config.ttl,
            fetcher,
            state: Arc::new(Mutex::new(StoreState::default())),
            in_flight: Arc::new(InFlightTable::default()),
        };

        store.rebuild_index().await?;
        let swept = store.sweep_expired().await;
        let stats = store.stats();
        info!(
            file_count = stats.file_count,
            total_size = stats.total_size_bytes,
            swept,
            dir = ?store.cache_dir,
            "video cache ready"
        );
        Ok(store)
    }

    /// Local path for a cached URL, or `None` on a miss.
    ///
    /// Never touches the network. If the backing file has vanished or changed
    /// size, the stale index entry is dropped and the miss is reported.
    pub async fn lookup(&self, url: &str) -> Option<PathBuf> {
        let key = CacheKey::from_url(url);
        let entry = { self.state.lock().entries.get(&key).cloned() }?;

        match fs::metadata(&entry.file_path).await {
            Ok(meta) if meta.is_file() && meta.len() == entry.size_bytes => Some(entry.file_path),
            _ => {
                warn!(url = %url, path = ?entry.file_path, "cache entry lost its backing file, dropping");
                {
                    let mut state = self.state.lock();
                    if let Some(stale) = state.entries.remove(&key) {
                        state.total_bytes = state.total_bytes.saturating_sub(stale.size_bytes);
                    }
                }
                // Clean up whatever is left of the pair in the background
                let data_path = entry.file_path.clone();
                let meta_path = self.meta_path(&key);
                tokio::spawn(async move {
                    let _ = fs::remove_file(&data_path).await;
                    let _ = fs::remove_file(&meta_path).await;
                });
                None
            }
        }
    }

    /// Best available playback URL: `file://` path on a hit, the source URL
    /// unchanged on a miss. Infallible, so playback is never blocked by the
    /// cache layer.
    pub async fn resolve(&self, url: &str) -> String {
        match self.lookup(url).await {
            Some(path) => format!("file://{}", path.display()),
            None => url.to_owned(),
        }
    }

    /// Download a URL into the cache and return its local path.
    ///
    /// Idempotent: a URL that is already resident returns immediately, and a
    /// URL whose download is already running is joined rather than fetched a
    /// second time. Exactly one network attempt is made per call; retry
    /// policy belongs to callers.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf, CacheError> {
        if let Some(path) = self.lookup(url).await {
            debug!(url = %url, "fetch satisfied by existing cache entry");
            return Ok(path);
        }

        let key = CacheKey::from_url(url);
        match self.in_flight.begin(&key) {
            FlightTicket::Follower(mut rx) => {
                // Resolves once the leading download's guard drops
                let _ = rx.changed().await;
                match self.lookup(url).await {
                    Some(path) => Ok(path),
                    None => Err(CacheError::FetchFailed(url.to_owned())),
                }
            }
            FlightTicket::Leader(guard) => {
                // Re-check under the claim: a previous leader may have landed
                // the entry between our miss and the claim.
                if let Some(path) = self.lookup(url).await {
                    return Ok(path);
                }
                self.download_and_insert(url, &key, guard).await
            }
        }
    }

    /// Whether the URL has an index entry. Index-only probe, no stat.
    pub fn contains(&self, url: &str) -> bool {
        self.state
            .lock()
            .entries
            .contains_key(&CacheKey::from_url(url))
    }

    /// Whether a download for the URL is currently running.
    pub fn is_in_flight(&self, url: &str) -> bool {
        self.in_flight.contains(&CacheKey::from_url(url))
    }

    /// Aggregate cache numbers for diagnostics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            file_count: state.entries.len(),
            total_size_bytes: state.total_bytes,
            max_size_bytes: self.max_cache_size,
        }
    }

    /// Remove every entry older than the TTL. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let ttl_millis = self.ttl.as_millis() as u64;
        let now = now_millis();
        let victims: Vec<CacheEntry> = {
            let mut state = self.state.lock();
            let expired: Vec<CacheKey> = state
                .entries
                .iter()
                .filter(|(_, e)| now.saturating_sub(e.created_at) > ttl_millis)
                .map(|(k, _)| k.clone())
                .collect();
            let mut victims = Vec::with_capacity(expired.len());
            for key in expired {
                if let Some(entry) = state.entries.remove(&key) {
                    state.total_bytes = state.total_bytes.saturating_sub(entry.size_bytes);
                    victims.push(entry);
                }
            }
            victims
        };

        for victim in &victims {
            self.remove_entry_files(victim).await;
        }
        if !victims.is_empty() {
            debug!(count = victims.len(), "swept expired cache entries");
        }
        victims.len()
    }

    /// Remove every entry and its backing file. Manual cache reset.
    pub async fn clear(&self) {
        let victims: Vec<CacheEntry> = {
            let mut state = self.state.lock();
            state.total_bytes = 0;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        for victim in &victims {
            self.remove_entry_files(victim).await;
        }
        debug!(count = victims.len(), "cleared video cache");
    }

    fn data_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.mp4", key.as_hex()))
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.meta", key.as_hex()))
    }

    fn part_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.mp4.part", key.as_hex()))
    }

    fn meta_tmp_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.meta.tmp", key.as_hex()))
    }

    async fn download_and_insert(
        &self,
        url: &str,
        key: &CacheKey,
        _guard: FlightGuard,
    ) -> Result<PathBuf, CacheError> {
        let part_path = self.part_path(key);
        let size = match self.download_to(url, &part_path).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        if size > self.max_cache_size {
            let _ = fs::remove_file(&part_path).await;
            return Err(CacheError::TooLarge {
                size,
                max: self.max_cache_size,
            });
        }

        let created_at = now_millis();
        let meta = EntryMeta {
            source_url: url.to_owned(),
            created_at,
            size_bytes: size,
        };
        let data_path = self.data_path(key);
        let meta_path = self.meta_path(key);
        let meta_tmp = self.meta_tmp_path(key);

        if let Err(e) = publish_files(&part_path, &data_path, &meta_tmp, &meta_path, &meta).await {
            let _ = fs::remove_file(&part_path).await;
            let _ = fs::remove_file(&meta_tmp).await;
            let _ = fs::remove_file(&data_path).await;
            return Err(e);
        }

        // Victim selection and the insert happen under one lock acquisition,
        // so the size budget holds after every insertion even with several
        // downloads landing at once.
        let victims = {
            let mut state = self.state.lock();
            let victims = evict_for_locked(&mut state, size, self.max_cache_size);
            let entry = CacheEntry {
                source_url: url.to_owned(),
                file_path: data_path.clone(),
                created_at,
                size_bytes: size,
                seq: state.next_seq,
            };
            state.next_seq += 1;
            state.total_bytes += size;
            state.entries.insert(key.clone(), entry);
            victims
        };

        for victim in &victims {
            self.remove_entry_files(victim).await;
        }
        if !victims.is_empty() {
            debug!(
                count = victims.len(),
                "evicted oldest entries to fit new download"
            );
        }

        debug!(url = %url, size, path = ?data_path, "cached video");
        Ok(data_path)
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, CacheError> {
        let mut stream = self.fetcher.fetch(url).await?;
        let mut file = fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(CacheError::EmptyBody(url.to_owned()));
        }
        Ok(written)
    }

    /// Delete an evicted/expired entry's files. A failed delete leaks disk
    /// bytes but never resurrects the index entry.
    async fn remove_entry_files(&self, entry: &CacheEntry) {
        let key = CacheKey::from_url(&entry.source_url);
        if let Err(e) = fs::remove_file(&entry.file_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?entry.file_path, error = %e, "failed to delete cache file, leaking bytes");
            }
        }
        let meta_path = self.meta_path(&key);
        if let Err(e) = fs::remove_file(&meta_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?meta_path, error = %e, "failed to delete cache sidecar");
            }
        }
    }

    /// Scan the cache directory and rebuild the index from sidecars, trusting
    /// only entries whose data file still exists with the recorded size.
    /// Everything else (stale temp files, unreadable sidecars, orphaned or
    /// resized data files) is deleted.
    async fn rebuild_index(&self) -> Result<(), CacheError> {
        let mut dir = fs::read_dir(&self.cache_dir).await?;
        let mut sidecars: Vec<(String, PathBuf)> = Vec::new();
        let mut data_sizes: HashMap<String, u64> = HashMap::new();

        while let Some(dirent) = dir.next_entry().await? {
            let path = dirent.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned)
            else {
                continue;
            };
            if name.ends_with(".part") || name.ends_with(".tmp") {
                debug!(path = ?path, "removing temp file left by an interrupted run");
                let _ = fs::remove_file(&path).await;
            } else if let Some(hex) = name.strip_suffix(".meta") {
                sidecars.push((hex.to_owned(), path));
            } else if let Some(hex) = name.strip_suffix(".mp4") {
                let size = dirent.metadata().await.map(|m| m.len()).unwrap_or(0);
                data_sizes.insert(hex.to_owned(), size);
            }
        }

        let mut restored: Vec<(CacheKey, CacheEntry)> = Vec::new();
        for (hex, meta_path) in sidecars {
            let data_path = self.cache_dir.join(format!("{hex}.mp4"));
            let parsed: Option<EntryMeta> = match fs::read(&meta_path).await {
                Ok(bytes) => serde_json::from_slice(&bytes).ok(),
                Err(_) => None,
            };
            let on_disk = data_sizes.remove(&hex);

            let Some(meta) = parsed else {
                warn!(path = ?meta_path, "unreadable cache sidecar, discarding entry");
                let _ = fs::remove_file(&meta_path).await;
                let _ = fs::remove_file(&data_path).await;
                continue;
            };

            let key = CacheKey::from_url(&meta.source_url);
            let consistent =
                key.as_hex() == hex && on_disk == Some(meta.size_bytes) && meta.size_bytes > 0;
            if !consistent {
                warn!(path = ?data_path, "cache entry failed verification, discarding");
                let _ = fs::remove_file(&meta_path).await;
                let _ = fs::remove_file(&data_path).await;
                continue;
            }

            restored.push((
                key,
                CacheEntry {
                    source_url: meta.source_url,
                    file_path: data_path,
                    created_at: meta.created_at,
                    size_bytes: meta.size_bytes,
                    seq: 0,
                },
            ));
        }

        // Data files with no sidecar are orphans from a crash mid-publish
        for hex in data_sizes.into_keys() {
            let orphan = self.cache_dir.join(format!("{hex}.mp4"));
            warn!(path = ?orphan, "removing orphaned cache file");
            let _ = fs::remove_file(&orphan).await;
        }

        restored.sort_by_key(|(_, entry)| entry.created_at);
        let shrink_victims = {
            let mut state = self.state.lock();
            for (key, mut entry) in restored {
                entry.seq = state.next_seq;
                state.next_seq += 1;
                state.total_bytes += entry.size_bytes;
                state.entries.insert(key, entry);
            }
            // The budget may have shrunk since the last run
            evict_for_locked(&mut state, 0, self.max_cache_size)
        };
        for victim in &shrink_victims {
            self.remove_entry_files(victim).await;
        }
        Ok(())
    }
}

async fn publish_files(
    part: &Path,
    data: &Path,
    meta_tmp: &Path,
    meta_path: &Path,
    meta: &EntryMeta,
) -> Result<(), CacheError> {
    let json = serde_json::to_vec(meta).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("failed to serialize sidecar: {e}"),
        )
    })?;
    fs::write(meta_tmp, &json).await?;
    fs::rename(part, data).await?;
    fs::rename(meta_tmp, meta_path).await?;
    Ok(())
}

/// Remove oldest-inserted entries until `required` more bytes fit in the
/// budget. Strict FIFO by insertion order; lookups never refresh an entry.
fn evict_for_locked(state: &mut StoreState, required: u64, max: u64) -> Vec<CacheEntry> {
    let mut victims = Vec::new();
    while state.total_bytes.saturating_add(required) > max && !state.entries.is_empty() {
        let oldest = state
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(key, _)| key.clone());
        let Some(key) = oldest else { break };
        if let Some(entry) = state.entries.remove(&key) {
            state.total_bytes = state.total_bytes.saturating_sub(entry.size_bytes);
            victims.push(entry);
        }
    }
    victims
}
