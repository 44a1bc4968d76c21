//! Deduplicator (C2, spec.md §4.2): a naive bounded list of recently-seen
//! unique event keys. Dropping duplicates is an optimization, not a
//! correctness requirement — every handler in this crate is idempotent at
//! the per-event level, so disabling dedup entirely must not corrupt state.

use std::collections::VecDeque;

/// Tracks recently-seen keys within a bounded window to drop events that a
/// reconnecting push client re-delivers.
#[derive(Debug)]
pub struct Deduplicator {
    capacity: usize,
    seen: VecDeque<String>,
}

impl Deduplicator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns `false` if `key` was already present (a duplicate); `true`
    /// if it was fresh, in which case it is now recorded.
    pub fn insert_fresh(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.seen.contains(&key) {
            return false;
        }
        if self.seen.len() >= self.capacity {
            // Retain the most recent half, discard the rest.
            let keep_from = self.seen.len() / 2;
            self.seen.drain(0..keep_from);
        }
        self.seen.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_identical_key_is_a_duplicate() {
        let mut dedup = Deduplicator::new(16);
        assert!(dedup.insert_fresh("death:1:2:100"));
        assert!(!dedup.insert_fresh("death:1:2:100"));
    }

    #[test]
    fn distinct_keys_are_both_fresh() {
        let mut dedup = Deduplicator::new(16);
        assert!(dedup.insert_fresh("a"));
        assert!(dedup.insert_fresh("b"));
    }

    #[test]
    fn eviction_keeps_the_most_recent_half_when_full() {
        let mut dedup = Deduplicator::new(4);
        for i in 0..4 {
            assert!(dedup.insert_fresh(format!("k{i}")));
        }
        // Full now ([k0,k1,k2,k3]); inserting a fifth evicts the oldest
        // half (k0, k1), leaving [k2,k3,k4].
        assert!(dedup.insert_fresh("k4"));
        assert!(!dedup.insert_fresh("k2"));
        assert!(!dedup.insert_fresh("k3"));
        // Re-adding k0 doesn't evict yet (len 3 < capacity): [k2,k3,k4,k0].
        assert!(dedup.insert_fresh("k0"));
        // Full again; inserting k1 evicts the oldest half (k2, k3),
        // leaving [k4,k0,k1].
        assert!(dedup.insert_fresh("k1"));
        assert!(!dedup.insert_fresh("k4"));
        assert!(!dedup.insert_fresh("k0"));
        assert!(!dedup.insert_fresh("k1"));
        // k2 and k3 were evicted by the second half-eviction, so both are
        // fresh again.
        assert!(dedup.insert_fresh("k2"));
        assert!(dedup.insert_fresh("k3"));
    }
}
