//! TTL cache for dashboard responses, one entry per canonical filter key.
//!
//! Stores typed `Arc<DashboardResponse>` so a hit hands back the exact payload
//! that was built on the miss. A generation counter is bumped by
//! [`invalidate_all`](DashboardCache::invalidate_all); results computed before
//! an invalidation are dropped instead of being stored.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::data::dashboard::DashboardResponse;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct DashboardCache {
    ttl: Duration,
    /// cache key → (cached_at, value)
    entries: Arc<DashMap<String, (Instant, Arc<DashboardResponse>)>>,
    /// cache key → in-flight flag (singleflight guard)
    inflight: Arc<DashMap<String, Arc<AtomicBool>>>,
    generation: Arc<AtomicU64>,
}

impl Default for DashboardCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl DashboardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::default(),
            inflight: Arc::default(),
            generation: Arc::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a cached entry if it exists and is fresh.
    pub fn get(&self, key: &str) -> Option<Arc<DashboardResponse>> {
        let entry = self.entries.get(key)?;
        let (cached_at, ref value) = *entry;
        (cached_at.elapsed() < self.ttl).then(|| value.clone())
    }

    /// Return a cached entry regardless of age.
    pub fn get_stale(&self, key: &str) -> Option<Arc<DashboardResponse>> {
        self.entries.get(key).map(|entry| entry.1.clone())
    }

    pub fn put(&self, key: String, value: Arc<DashboardResponse>) {
        self.entries.insert(key, (Instant::now(), value));
    }

    /// Store `value` only if no invalidation happened since `generation` was read.
    pub fn put_if_current(
        &self,
        key: String,
        value: Arc<DashboardResponse>,
        generation: u64,
    ) -> bool {
        if self.generation() != generation {
            debug!(key, "discarding dashboard result computed before invalidation");
            return false;
        }
        self.put(key, value);
        true
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(dropped, "dashboard cache invalidated");
    }

    /// Drop entries older than the TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (cached_at, _)| cached_at.elapsed() < self.ttl);
        self.inflight
            .retain(|_, flag| flag.load(Ordering::Acquire));
        before.saturating_sub(self.entries.len())
    }

    /// Try to claim the singleflight slot for a key.
    /// Returns `true` if this caller should build the response; `false` if another is already building it.
    pub fn try_claim(&self, key: &str) -> bool {
        let flag = self
            .inflight
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the singleflight slot for a key (call after put or on error).
    pub fn release(&self, key: &str) {
        if let Some(flag) = self.inflight.get(key) {
            flag.store(false, Ordering::Release);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dashboard::{Aggregates, reshape};
    use crate::data::filter::{FilterParams, PageLimits};
    use chrono::Utc;

    fn response() -> Arc<DashboardResponse> {
        let applied = FilterParams::default()
            .normalize(PageLimits::DASHBOARD)
            .unwrap();
        Arc::new(reshape(Aggregates::default(), &applied, "k".into(), Utc::now()))
    }

    #[test]
    fn fresh_entries_are_served() {
        let cache = DashboardCache::new(Duration::from_secs(60));
        let value = response();
        cache.put("k".into(), value.clone());
        let hit = cache.get("k").unwrap();
        assert!(Arc::ptr_eq(&hit, &value));
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn expired_entries_miss_but_remain_stale() {
        let cache = DashboardCache::new(Duration::ZERO);
        cache.put("k".into(), response());
        assert!(cache.get("k").is_none());
        assert!(cache.get_stale("k").is_some());
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_all_clears_and_blocks_older_results() {
        let cache = DashboardCache::new(Duration::from_secs(60));
        cache.put("a".into(), response());
        cache.put("b".into(), response());
        assert_eq!(cache.len(), 2);

        let generation = cache.generation();
        cache.invalidate_all();
        assert!(cache.is_empty());

        assert!(!cache.put_if_current("a".into(), response(), generation));
        assert!(cache.get("a").is_none());
        assert!(cache.put_if_current("a".into(), response(), cache.generation()));
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn singleflight_slot_is_exclusive_until_released() {
        let cache = DashboardCache::default();
        assert!(cache.try_claim("k"));
        assert!(!cache.try_claim("k"));
        assert!(cache.try_claim("other"));
        cache.release("k");
        assert!(cache.try_claim("k"));
    }

    #[test]
    fn clones_share_entries() {
        let cache = DashboardCache::default();
        let clone = cache.clone();
        cache.put("k".into(), response());
        assert!(clone.get("k").is_some());
        clone.invalidate_all();
        assert!(cache.is_empty());
    }
}
