//! Shared, swappable holder for the active [`PolicyTable`].
//!
//! The store uses `arc-swap` for lock-free reads on the request path.

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::matcher::{FieldPolicy, PolicyTable};

/// Lock-free handle to the current policy table.
///
/// Clones share the same table. The reload task swaps in a complete new table
/// atomically; readers see either the old or the new table, never a mix.
#[derive(Clone, Debug)]
pub struct PolicyStore {
    inner: Arc<ArcSwap<PolicyTable>>,
}

impl PolicyStore {
    /// Create a store holding `table`.
    pub fn new(table: PolicyTable) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    /// Number of patterns in the current table.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// Return `true` if the current table has no patterns.
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Snapshot of the current table.
    pub fn table(&self) -> Arc<PolicyTable> {
        self.inner.load_full()
    }

    /// The policy for `url` in the current table, cloned out of the snapshot.
    pub fn policy_for(&self, url: &str) -> Option<FieldPolicy> {
        self.inner.load().policy_for(url).cloned()
    }

    /// Atomically replace the table.
    pub fn replace(&self, table: PolicyTable) {
        self.inner.store(Arc::new(table));
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(PolicyTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(pattern: &str) -> PolicyTable {
        PolicyTable::from_entries([(pattern, FieldPolicy::new(["phone"], ["phone"]))]).unwrap()
    }

    #[test]
    fn initially_empty() {
        let store = PolicyStore::default();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.policy_for("/api/user/info").is_none());
    }

    #[test]
    fn replace_is_atomic() {
        let store = PolicyStore::new(table_with("/a"));
        let snapshot = store.table();
        store.replace(table_with("/b"));

        assert!(store.policy_for("/a").is_none());
        assert!(store.policy_for("/b").is_some());
        // Old snapshots are unaffected by the swap.
        assert!(snapshot.policy_for("/a").is_some());
    }

    #[test]
    fn clones_share_table() {
        let store = PolicyStore::default();
        let other = store.clone();
        other.replace(table_with("/x/:id"));
        assert_eq!(store.len(), 1);
        assert!(store.policy_for("/x/1").is_some());
    }
}
