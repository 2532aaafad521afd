// Prefetch scheduler: keeps a sliding window of feed items warm in the cache
// with bounded download concurrency.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::store::CacheStore;

/// Configurable options for the prefetch scheduler
#[derive(Debug, Clone, Copy)]
pub struct PrefetchConfig {
    /// Items after the current index to keep warm
    pub ahead_count: usize,
    /// Items before the current index to keep warm
    pub behind_count: usize,
    /// Hard cap on simultaneous downloads issued by this scheduler
    pub max_concurrent_fetches: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            ahead_count: 3,
            behind_count: 1,
            max_concurrent_fetches: 2,
        }
    }
}

/// Snapshot of the scheduler for diagnostics and tests.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerStatus {
    pub queue_length: usize,
    pub active_fetches: usize,
    pub config: PrefetchConfig,
}

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<String>,
    active: usize,
}

/// Drives the cache store from scroll position changes.
///
/// On every `prefetch_around` call the pending queue is recomputed from the
/// window around the current index; queued work that fell out of the window
/// is dropped, while downloads already running always finish. Fetch failures
/// are absorbed here, since a prefetch is an optimization rather than a
/// correctness requirement, and show up only in logs and [`SchedulerStatus`].
pub struct PrefetchScheduler {
    store: Arc<CacheStore>,
    config: PrefetchConfig,
    state: Arc<Mutex<SchedulerState>>,
}

impl PrefetchScheduler {
    /// Create a scheduler with default configuration.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self::with_config(store, PrefetchConfig::default())
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(store: Arc<CacheStore>, config: PrefetchConfig) -> Self {
        Self {
            store,
            config,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    /// Recompute the warm window around the current scroll position and
    /// replace the pending queue with it.
    ///
    /// Must be called from within a Tokio runtime; returns immediately after
    /// topping up the worker slots.
    pub fn prefetch_around(&self, urls: &[String], current_index: usize) {
        let window = self.window(urls, current_index);
        let mut wanted: Vec<String> = Vec::new();
        for url in window {
            if self.store.contains(url) || self.store.is_in_flight(url) {
                continue;
            }
            if !wanted.iter().any(|seen| seen == url) {
                wanted.push(url.clone());
            }
        }

        {
            let mut state = self.state.lock();
            state.queue = wanted.into();
            debug!(
                queued = state.queue.len(),
                current_index, "prefetch window replaced"
            );
        }
        self.fill_slots();
    }

    /// Queue an explicit list of URLs regardless of window logic, for
    /// non-scroll-driven warm-up. Same deduplication and concurrency rules.
    pub fn prefetch_specific(&self, urls: &[String]) {
        {
            let mut state = self.state.lock();
            for url in urls {
                if self.store.contains(url) || self.store.is_in_flight(url) {
                    continue;
                }
                if state.queue.iter().any(|queued| queued == url) {
                    continue;
                }
                state.queue.push_back(url.clone());
            }
        }
        self.fill_slots();
    }

    /// Drop all queued work. Downloads already running are never interrupted;
    /// aborting a transfer mid-flight only wastes the bytes fetched so far.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        if dropped > 0 {
            debug!(dropped, "cancelled queued prefetches");
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state.lock();
        SchedulerStatus {
            queue_length: state.queue.len(),
            active_fetches: state.active,
            config: self.config,
        }
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    fn window<'a>(&self, urls: &'a [String], current_index: usize) -> &'a [String] {
        if urls.is_empty() {
            return &[];
        }
        let start = current_index.saturating_sub(self.config.behind_count);
        let end = current_index
            .saturating_add(self.config.ahead_count)
            .min(urls.len() - 1);
        if start > end {
            return &[];
        }
        &urls[start..=end]
    }

    /// Spawn workers until every concurrency slot is taken or the queue is
    /// empty. Workers pick their URL off the queue when they actually run,
    /// so a queue replaced in the meantime is honored.
    fn fill_slots(&self) {
        loop {
            {
                let mut state = self.state.lock();
                if state.active >= self.config.max_concurrent_fetches || state.queue.is_empty() {
                    return;
                }
                state.active += 1;
            }
            let store = Arc::clone(&self.store);
            let state = Arc::clone(&self.state);
            tokio::spawn(run_worker(store, state));
        }
    }
}

/// Ephemeral prefetch worker: holds one concurrency slot, fetches queued URLs
/// until the queue runs dry, then releases the slot.
async fn run_worker(store: Arc<CacheStore>, state: Arc<Mutex<SchedulerState>>) {
    loop {
        let url = {
            let mut locked = state.lock();
            match locked.queue.pop_front() {
                Some(url) => url,
                None => {
                    locked.active -= 1;
                    return;
                }
            }
        };
        match store.fetch(&url).await {
            Ok(path) => debug!(url = %url, path = ?path, "prefetch complete"),
            Err(e) => warn!(url = %url, error = %e, "prefetch failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheConfig;
    use crate::fetch::testing::StubFetcher;
    use std::time::Duration;
    use tempfile::TempDir;

    #[inline]
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn feed(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("https://cdn.example.com/feed/{i}.mp4"))
            .collect()
    }

    async fn store_with(dir: &TempDir, fetcher: Arc<StubFetcher>) -> Arc<CacheStore> {
        let config = CacheConfig::builder().with_cache_dir(dir.path()).build();
        Arc::new(CacheStore::with_fetcher(config, fetcher).await.unwrap())
    }

    async fn drain(scheduler: &PrefetchScheduler) {
        for _ in 0..500 {
            let status = scheduler.status();
            if status.queue_length == 0 && status.active_fetches == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("scheduler did not drain in time");
    }

    #[tokio::test]
    async fn warms_window_around_current_index() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let urls = feed(10);
        let fetcher = StubFetcher::new();
        for url in &urls {
            fetcher.put_body(url, vec![1; 8]);
        }
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        let scheduler = PrefetchScheduler::new(store.clone());

        // behind 1, ahead 3 around index 2 -> indices 1..=5
        scheduler.prefetch_around(&urls, 2);
        drain(&scheduler).await;

        for (i, url) in urls.iter().enumerate() {
            let expected = (1..=5).contains(&i);
            assert_eq!(store.contains(url), expected, "index {i}");
            assert_eq!(fetcher.downloads_for(url), usize::from(expected), "index {i}");
        }
    }

    #[tokio::test]
    async fn window_clamps_at_list_start() {
        let dir = TempDir::new().unwrap();
        let urls = feed(10);
        let fetcher = StubFetcher::new();
        for url in &urls {
            fetcher.put_body(url, vec![1; 8]);
        }
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        let scheduler = PrefetchScheduler::new(store);

        scheduler.prefetch_around(&urls, 0);
        drain(&scheduler).await;

        for (i, url) in urls.iter().enumerate() {
            let expected = i <= 3;
            assert_eq!(fetcher.downloads_for(url), usize::from(expected), "index {i}");
        }
    }

    #[tokio::test]
    async fn window_clamps_at_list_end() {
        let dir = TempDir::new().unwrap();
        let urls = feed(10);
        let fetcher = StubFetcher::new();
        for url in &urls {
            fetcher.put_body(url, vec![1; 8]);
        }
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        let scheduler = PrefetchScheduler::new(store);

        scheduler.prefetch_around(&urls, 9);
        drain(&scheduler).await;

        for (i, url) in urls.iter().enumerate() {
            let expected = i >= 8;
            assert_eq!(fetcher.downloads_for(url), usize::from(expected), "index {i}");
        }
    }

    #[tokio::test]
    async fn replaced_window_cancels_queued_work() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let urls = feed(30);
        let fetcher = StubFetcher::new();
        for url in &urls {
            fetcher.put_body(url, vec![1; 8]);
        }
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        let scheduler = PrefetchScheduler::new(store);

        // Jump from index 5 (window 4..=8) to index 20 (window 19..=23)
        // before any queued fetch has started.
        scheduler.prefetch_around(&urls, 5);
        scheduler.prefetch_around(&urls, 20);
        drain(&scheduler).await;

        for i in 4..=8 {
            assert_eq!(fetcher.downloads_for(&urls[i]), 0, "stale index {i} fetched");
        }
        for i in 19..=23 {
            assert_eq!(fetcher.downloads_for(&urls[i]), 1, "index {i}");
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_cap() {
        let dir = TempDir::new().unwrap();
        let urls = feed(10);
        let fetcher = StubFetcher::new();
        for url in &urls {
            fetcher.put_body(url, vec![1; 8]);
        }
        fetcher.set_delay(Duration::from_millis(20));
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        let scheduler = PrefetchScheduler::new(store);

        scheduler.prefetch_specific(&urls);
        drain(&scheduler).await;

        assert_eq!(fetcher.total_downloads(), 10);
        assert!(
            fetcher.max_concurrent() <= 2,
            "saw {} overlapping fetches",
            fetcher.max_concurrent()
        );
    }

    #[tokio::test]
    async fn repeated_requests_do_not_duplicate_work() {
        let dir = TempDir::new().unwrap();
        let urls = feed(3);
        let fetcher = StubFetcher::new();
        for url in &urls {
            fetcher.put_body(url, vec![1; 8]);
        }
        fetcher.set_delay(Duration::from_millis(30));
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        let scheduler = PrefetchScheduler::new(store);

        scheduler.prefetch_specific(&urls);
        scheduler.prefetch_specific(&urls);
        tokio::time::sleep(Duration::from_millis(10)).await;
        // By now the first URLs are in flight rather than queued
        scheduler.prefetch_specific(&urls);
        drain(&scheduler).await;

        for url in &urls {
            assert_eq!(fetcher.downloads_for(url), 1, "{url}");
        }
    }

    #[tokio::test]
    async fn already_cached_urls_are_not_requeued() {
        let dir = TempDir::new().unwrap();
        let urls = feed(6);
        let fetcher = StubFetcher::new();
        for url in &urls {
            fetcher.put_body(url, vec![1; 8]);
        }
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        store.fetch(&urls[2]).await.unwrap();
        let scheduler = PrefetchScheduler::new(store);

        scheduler.prefetch_around(&urls, 2);
        drain(&scheduler).await;

        assert_eq!(fetcher.downloads_for(&urls[2]), 1, "no re-download");
    }

    #[tokio::test]
    async fn failures_are_absorbed_and_retried_on_next_pass() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let urls = feed(1);
        let fetcher = StubFetcher::new();
        fetcher.fail(&urls[0]);
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        let scheduler = PrefetchScheduler::new(store.clone());

        scheduler.prefetch_specific(&urls);
        drain(&scheduler).await;
        assert!(!store.contains(&urls[0]));
        assert_eq!(fetcher.downloads_for(&urls[0]), 1);

        // A later pass naming the same URL retries it
        scheduler.prefetch_specific(&urls);
        drain(&scheduler).await;
        assert_eq!(fetcher.downloads_for(&urls[0]), 2);
    }

    #[tokio::test]
    async fn cancel_drops_queue_but_not_running_fetches() {
        let dir = TempDir::new().unwrap();
        let urls = feed(6);
        let fetcher = StubFetcher::new();
        for url in &urls {
            fetcher.put_body(url, vec![1; 8]);
        }
        fetcher.set_delay(Duration::from_millis(50));
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        let scheduler = PrefetchScheduler::new(store.clone());

        scheduler.prefetch_specific(&urls);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.status().active_fetches, 2);
        scheduler.cancel();
        assert_eq!(scheduler.status().queue_length, 0);
        drain(&scheduler).await;

        // The two in-flight downloads ran to completion, nothing else started
        assert_eq!(fetcher.total_downloads(), 2);
        assert_eq!(store.stats().file_count, 2);
    }

    #[tokio::test]
    async fn status_reports_config() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, StubFetcher::new()).await;
        let config = PrefetchConfig {
            ahead_count: 5,
            behind_count: 2,
            max_concurrent_fetches: 4,
        };
        let scheduler = PrefetchScheduler::with_config(store, config);

        let status = scheduler.status();
        assert_eq!(status.queue_length, 0);
        assert_eq!(status.active_fetches, 0);
        assert_eq!(status.config.ahead_count, 5);
        assert_eq!(status.config.behind_count, 2);
        assert_eq!(status.config.max_concurrent_fetches, 4);
    }

    #[tokio::test]
    async fn empty_feed_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, StubFetcher::new()).await;
        let scheduler = PrefetchScheduler::new(store);

        scheduler.prefetch_around(&[], 0);
        let status = scheduler.status();
        assert_eq!(status.queue_length, 0);
        assert_eq!(status.active_fetches, 0);
    }

    #[tokio::test]
    async fn out_of_range_index_clears_queue() {
        let dir = TempDir::new().unwrap();
        let urls = feed(4);
        let fetcher = StubFetcher::new();
        let store = store_with(&dir, Arc::clone(&fetcher)).await;
        let scheduler = PrefetchScheduler::new(store);

        scheduler.prefetch_around(&urls, 40);
        drain(&scheduler).await;
        assert_eq!(fetcher.total_downloads(), 0);
    }
}
