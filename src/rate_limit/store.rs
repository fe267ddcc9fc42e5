//! Per-identifier request timestamps with lazy expiry.
//!
//! The store is process-local and best-effort: a restart resets every
//! window, and several gateway instances each enforce only their own view.
//! A shared store (e.g. Redis) would be another `WindowStore` impl.

use dashmap::DashMap;

/// Recent request timestamps for one identifier (unix millis, arrival order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub identifier: String,
    pub timestamps: Vec<u64>,
}

/// What is left of an entry's window after pruning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowView {
    pub count: usize,
    pub oldest: Option<u64>,
}

/// Storage seam for the evaluator.
pub trait WindowStore: Send + Sync {
    /// Snapshot of the entry, if the identifier has one.
    fn get(&self, identifier: &str) -> Option<RateLimitEntry>;

    /// Drops timestamps `<= window_start`. An entry left empty is removed.
    fn prune(&self, identifier: &str, window_start: u64) -> WindowView;

    /// Appends `now`, creating the entry on first use.
    fn record(&self, identifier: &str, now: u64);

    /// Prunes every entry against `window_start`; returns how many were removed.
    fn sweep(&self, window_start: u64) -> usize;

    /// Number of identifiers currently tracked.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// In-memory store - sharded map, no cross-call locking
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    windows: DashMap<String, Vec<u64>>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// Racing writers or a clock step can leave the sequence out of order,
// so filter instead of cutting a sorted prefix.
fn drop_expired(timestamps: &mut Vec<u64>, window_start: u64) {
    timestamps.retain(|&ts| ts > window_start);
}

impl WindowStore for InMemoryWindowStore {
    fn get(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.windows.get(identifier).map(|timestamps| RateLimitEntry {
            identifier: identifier.to_string(),
            timestamps: timestamps.clone(),
        })
    }

    fn prune(&self, identifier: &str, window_start: u64) -> WindowView {
        let view = match self.windows.get_mut(identifier) {
            Some(mut timestamps) => {
                drop_expired(&mut timestamps, window_start);
                WindowView {
                    count: timestamps.len(),
                    oldest: timestamps.iter().min().copied(),
                }
            }
            None => return WindowView::default(),
        };

        if view.count == 0 {
            // re-check under the shard lock, a concurrent record may have landed
            self.windows.remove_if(identifier, |_, ts| ts.is_empty());
        }
        view
    }

    fn record(&self, identifier: &str, now: u64) {
        self.windows
            .entry(identifier.to_string())
            .or_default()
            .push(now);
    }

    fn sweep(&self, window_start: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            drop_expired(timestamps, window_start);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_uses_half_open_window() {
        let store = InMemoryWindowStore::new();
        store.record("ip:1.2.3.4", 1_000);
        store.record("ip:1.2.3.4", 2_000);
        store.record("ip:1.2.3.4", 3_000);

        // timestamp exactly at window_start is expired
        let view = store.prune("ip:1.2.3.4", 2_000);
        assert_eq!(view.count, 1);
        assert_eq!(view.oldest, Some(3_000));
    }

    #[test]
    fn prune_removes_emptied_entry() {
        let store = InMemoryWindowStore::new();
        store.record("user:a", 10);
        assert_eq!(store.len(), 1);

        let view = store.prune("user:a", 10);
        assert_eq!(view, WindowView::default());
        assert!(store.get("user:a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn prune_unknown_identifier_is_empty() {
        let store = InMemoryWindowStore::new();
        assert_eq!(store.prune("nobody", 0), WindowView::default());
        assert!(store.is_empty());
    }

    #[test]
    fn record_keeps_insertion_order() {
        let store = InMemoryWindowStore::new();
        store.record("k", 5);
        store.record("k", 7);
        store.record("k", 9);

        let entry = store.get("k").unwrap();
        assert_eq!(entry.identifier, "k");
        assert_eq!(entry.timestamps, vec![5, 7, 9]);
    }

    #[test]
    fn prune_handles_out_of_order_timestamps() {
        let store = InMemoryWindowStore::new();
        // a later request recorded before an earlier one
        store.record("k", 5_000);
        store.record("k", 1_000);
        store.record("k", 6_000);

        let view = store.prune("k", 2_000);
        assert_eq!(view.count, 2);
        assert_eq!(view.oldest, Some(5_000));
        assert_eq!(store.get("k").unwrap().timestamps, vec![5_000, 6_000]);

        assert_eq!(store.sweep(5_500), 0);
        assert_eq!(store.get("k").unwrap().timestamps, vec![6_000]);
    }

    #[test]
    fn sweep_drops_only_idle_identifiers() {
        let store = InMemoryWindowStore::new();
        store.record("idle", 100);
        store.record("busy", 100);
        store.record("busy", 900);

        let removed = store.sweep(500);
        assert_eq!(removed, 1);
        assert!(store.get("idle").is_none());
        assert_eq!(store.get("busy").unwrap().timestamps, vec![900]);
    }
}
