//! Fixed-size recency dedup set for the ingest pipeline (spec §4.7), the
//! same `LruCache<EventId, ()>` shape `nostr-gossip`'s ingester uses to
//! optimize away hot duplicate deliveries before they reach the store.

use std::num::NonZeroUsize;

use lru::LruCache;

const DEFAULT_CAPACITY: usize = 50_000;

pub struct RecencyDedup {
    seen: LruCache<String, ()>,
}

impl Default for RecencyDedup {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RecencyDedup {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { seen: LruCache::new(capacity) }
    }

    /// Returns `true` the first time `id` is seen, `false` on any repeat
    /// while the id is still resident in the recency window.
    pub fn observe(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            self.seen.promote(id);
            false
        } else {
            self.seen.put(id.to_string(), ());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_new() {
        let mut dedup = RecencyDedup::new(10);
        assert!(dedup.observe("a"));
    }

    #[test]
    fn repeat_within_window_is_not_new() {
        let mut dedup = RecencyDedup::new(10);
        assert!(dedup.observe("a"));
        assert!(!dedup.observe("a"));
    }

    #[test]
    fn eviction_forgets_oldest() {
        let mut dedup = RecencyDedup::new(2);
        dedup.observe("a");
        dedup.observe("b");
        dedup.observe("c");
        // "a" was evicted to make room for "c"; it now reads as new again.
        assert!(dedup.observe("a"));
    }
}
