//! Sync queue — the replayable record of every mutation the remote API has
//! not yet confirmed.
//!
//! Append-and-flag, never remove-and-reinsert: confirmed entries keep their
//! row with `synced = true`, which preserves an audit trail and sidesteps any
//! race between a sync cycle reading pending work and a new local save
//! appending more.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::model::{EntryKind, SyncQueueEntry};
use crate::store::LocalStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounts {
    pub game_data: usize,
    pub game_event: usize,
    pub achievement: usize,
    pub virtual_currency: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.game_data + self.game_event + self.achievement + self.virtual_currency
    }
}

#[derive(Clone)]
pub struct SyncQueue {
    store: Arc<LocalStore>,
}

impl SyncQueue {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Append a pending entry. Returns its queue key.
    pub fn enqueue(&self, kind: EntryKind, payload: Value) -> Result<u64> {
        self.store.append_queue(&SyncQueueEntry::new(kind, payload))
    }

    /// All entries still awaiting confirmation, in insertion order,
    /// optionally filtered by kind.
    pub fn pending(&self, kind: Option<EntryKind>) -> Result<Vec<(u64, SyncQueueEntry)>> {
        let mut entries = self.store.scan_queue()?;
        entries.retain(|(_, entry)| {
            !entry.synced && kind.map_or(true, |k| entry.kind == k)
        });
        Ok(entries)
    }

    /// Flip an entry to synced. Returns false if the key does not exist.
    pub fn mark_synced(&self, key: u64) -> Result<bool> {
        self.store.mark_queue_synced(key)
    }

    /// Per-kind pending counts, for status display and telemetry.
    pub fn counts(&self) -> Result<QueueCounts> {
        let mut counts = QueueCounts::default();
        for (_, entry) in self.pending(None)? {
            match entry.kind {
                EntryKind::GameData => counts.game_data += 1,
                EntryKind::GameEvent => counts.game_event += 1,
                EntryKind::Achievement => counts.achievement += 1,
                EntryKind::VirtualCurrency => counts.virtual_currency += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue_in(dir: &std::path::Path) -> SyncQueue {
        SyncQueue::new(Arc::new(LocalStore::open(dir).unwrap()))
    }

    #[test]
    fn test_enqueue_and_pending_order() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path());

        queue.enqueue(EntryKind::GameData, json!({"n": 0})).unwrap();
        queue.enqueue(EntryKind::GameEvent, json!({"n": 1})).unwrap();
        queue.enqueue(EntryKind::GameData, json!({"n": 2})).unwrap();

        let all = queue.pending(None).unwrap();
        assert_eq!(all.len(), 3);
        let ns: Vec<i64> = all
            .iter()
            .map(|(_, e)| e.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, vec![0, 1, 2]);

        let game_data_only = queue.pending(Some(EntryKind::GameData)).unwrap();
        assert_eq!(game_data_only.len(), 2);
        assert_eq!(game_data_only[0].1.payload["n"], 0);
        assert_eq!(game_data_only[1].1.payload["n"], 2);
    }

    #[test]
    fn test_marked_entries_leave_pending_but_are_retained() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(dir.path()).unwrap());
        let queue = SyncQueue::new(store.clone());

        let first = queue.enqueue(EntryKind::Achievement, json!({"a": 1})).unwrap();
        queue.enqueue(EntryKind::Achievement, json!({"a": 2})).unwrap();

        assert!(queue.mark_synced(first).unwrap());

        let pending = queue.pending(None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.payload["a"], 2);

        // The confirmed entry stays in the table for audit.
        assert_eq!(store.scan_queue().unwrap().len(), 2);
    }

    #[test]
    fn test_mark_synced_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path());
        assert!(!queue.mark_synced(42).unwrap());
    }

    #[test]
    fn test_counts_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path());

        queue.enqueue(EntryKind::GameData, json!({})).unwrap();
        queue.enqueue(EntryKind::GameData, json!({})).unwrap();
        let evt = queue.enqueue(EntryKind::GameEvent, json!({})).unwrap();
        queue.enqueue(EntryKind::VirtualCurrency, json!({})).unwrap();

        queue.mark_synced(evt).unwrap();

        let counts = queue.counts().unwrap();
        assert_eq!(counts.game_data, 2);
        assert_eq!(counts.game_event, 0);
        assert_eq!(counts.achievement, 0);
        assert_eq!(counts.virtual_currency, 1);
        assert_eq!(counts.total(), 3);
    }
}
