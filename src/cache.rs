//! In-memory slot for the most recent stats snapshot, shared by the render
//! path and the push path so both observe the same values without repeating
//! the fan-out on every read.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::models::Snapshot;

struct Stored {
    ticket: u64,
    snapshot: Snapshot,
}

/// Last-write-wins snapshot cache with sequenced writes.
///
/// Refreshes can overlap: a slow fetch started before a fast one may finish
/// after it. Writers take a ticket *before* fetching and present it on
/// store; a write is discarded if a later-started refresh already landed.
/// The whole value is swapped at once, so a reader never sees a partially
/// assembled snapshot.
pub struct SnapshotCache {
    slot: RwLock<Option<Stored>>,
    tickets: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            tickets: AtomicU64::new(0),
        }
    }

    /// Claims a write ticket. Call before starting the fetch the write will
    /// carry, so ticket order reflects refresh start order.
    pub fn begin(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Stores a snapshot under the given ticket. Returns false (and keeps
    /// the current value) when a later-started refresh has already stored.
    pub fn store(&self, ticket: u64, snapshot: Snapshot) -> bool {
        let mut slot = self.slot.write();
        match slot.as_ref() {
            Some(stored) if stored.ticket >= ticket => false,
            _ => {
                *slot = Some(Stored { ticket, snapshot });
                true
            }
        }
    }

    pub fn get(&self) -> Option<Snapshot> {
        self.slot.read().as_ref().map(|s| s.snapshot)
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(total_nodes: usize) -> Snapshot {
        Snapshot {
            total_nodes,
            ..Snapshot::default()
        }
    }

    #[test]
    fn empty_cache_reads_absent() {
        let cache = SnapshotCache::new();
        assert!(cache.get().is_none());
    }

    #[test]
    fn store_then_get_round_trips() {
        let cache = SnapshotCache::new();
        let t = cache.begin();
        assert!(cache.store(t, snap(4)));
        assert_eq!(cache.get().unwrap().total_nodes, 4);
    }

    #[test]
    fn later_started_refresh_wins_even_when_it_stores_first() {
        let cache = SnapshotCache::new();
        let slow = cache.begin();
        let fast = cache.begin();

        // The later-started refresh completes first...
        assert!(cache.store(fast, snap(9)));
        // ...and the earlier-started straggler must not clobber it.
        assert!(!cache.store(slow, snap(2)));
        assert_eq!(cache.get().unwrap().total_nodes, 9);
    }

    #[test]
    fn sequential_writes_take_the_latest() {
        let cache = SnapshotCache::new();
        let t1 = cache.begin();
        assert!(cache.store(t1, snap(1)));
        let t2 = cache.begin();
        assert!(cache.store(t2, snap(2)));
        assert_eq!(cache.get().unwrap().total_nodes, 2);
    }
}
