//! In-flight download table.
//!
//! Guarantees that at most one download per cache key exists at a time.
//! The first caller for a key becomes the leader and holds a [`FlightGuard`];
//! later callers get a receiver that closes when the leader's guard drops,
//! at which point they re-check the index. Guard removal happens in `Drop`,
//! so the marker cannot leak on any exit path.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::types::CacheKey;

#[derive(Default)]
pub(crate) struct InFlightTable {
    map: Mutex<HashMap<CacheKey, watch::Receiver<()>>>,
}

pub(crate) enum FlightTicket {
    /// This caller owns the download; the guard keeps the key marked.
    Leader(FlightGuard),
    /// Another download for the same key is running; await the receiver
    /// closing, then re-check the index.
    Follower(watch::Receiver<()>),
}

impl InFlightTable {
    /// Claim the key, or join the download already running for it.
    pub(crate) fn begin(self: &Arc<Self>, key: &CacheKey) -> FlightTicket {
        let mut map = self.map.lock();
        if let Some(rx) = map.get(key) {
            return FlightTicket::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(());
        map.insert(key.clone(), rx);
        FlightTicket::Leader(FlightGuard {
            table: Arc::clone(self),
            key: key.clone(),
            _tx: tx,
        })
    }

    pub(crate) fn contains(&self, key: &CacheKey) -> bool {
        self.map.lock().contains_key(key)
    }
}

/// Scoped marker for a running download. Dropping it unmarks the key and
/// closes the watch channel, waking every follower.
pub(crate) struct FlightGuard {
    table: Arc<InFlightTable>,
    key: CacheKey,
    _tx: watch::Sender<()>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.table.map.lock().remove(&self.key);
    }
}
