//! Sync bookkeeping for the external mirror.
//!
//! The crate never talks to the mirror itself; it only tracks which memories
//! are due for a push and records the outcomes callers report back. A
//! memory is eligible once its importance reaches the threshold and it has
//! either never been pushed or has changed since its last push.

use serde::Serialize;
use tracing::{info, instrument};

use crate::error::Result;
use crate::memory::{
    Memory, MemoryStore, SyncAction, SyncLogEntry, SyncStatus, SYNC_IMPORTANCE_THRESHOLD,
};

/// A memory due for a push, with why.
#[derive(Debug, Clone, Serialize)]
pub struct PendingSync {
    /// The eligible memory.
    pub memory: Memory,
    /// True when this memory has never been pushed before.
    pub first_push: bool,
}

/// Tracks mirror state without performing transport.
#[derive(Clone)]
pub struct SyncBookkeeper {
    store: MemoryStore,
}

impl SyncBookkeeper {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Importance at or above which memories are mirrored.
    pub fn threshold(&self) -> i64 {
        SYNC_IMPORTANCE_THRESHOLD
    }

    /// Memories currently due for a push, most important first.
    pub fn pending(&self) -> Result<Vec<PendingSync>> {
        Ok(self
            .store
            .pending_sync()?
            .into_iter()
            .map(|memory| PendingSync {
                first_push: memory.remote_ref.is_none(),
                memory,
            })
            .collect())
    }

    /// Record a successful push: stamps the memory with its remote record id
    /// and appends a success entry to the log.
    #[instrument(skip(self))]
    pub fn mark_synced(&self, memory_id: &str, remote_ref: &str) -> Result<()> {
        self.store.set_synced(memory_id, remote_ref)?;
        self.store.record_sync_attempt(
            memory_id,
            SyncAction::Push,
            SyncStatus::Success,
            Some(remote_ref),
            "",
        )?;
        info!(memory_id, remote_ref, "memory synced");
        Ok(())
    }

    /// Record a failed push attempt. The memory row is untouched, so it
    /// stays pending and the next pass retries it.
    #[instrument(skip(self))]
    pub fn mark_sync_failed(&self, memory_id: &str, reason: &str) -> Result<()> {
        self.store.record_sync_attempt(
            memory_id,
            SyncAction::Push,
            SyncStatus::Failed,
            None,
            reason,
        )?;
        info!(memory_id, reason, "sync attempt failed");
        Ok(())
    }

    /// Most recent log entries, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<SyncLogEntry>> {
        self.store.recent_sync_log(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::{MemoryKind, MemoryPatch};

    fn store() -> MemoryStore {
        MemoryStore::in_memory().unwrap()
    }

    #[test]
    fn test_pending_respects_threshold() {
        let store = store();
        store
            .create_memory(MemoryKind::Decision, "important", "c", 70, &[])
            .unwrap();
        store
            .create_memory(MemoryKind::Concept, "minor", "c", 69, &[])
            .unwrap();

        let sync = SyncBookkeeper::new(store);
        let pending = sync.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].memory.title, "important");
        assert!(pending[0].first_push);
    }

    #[test]
    fn test_mark_synced_clears_pending() {
        let store = store();
        let m = store
            .create_memory(MemoryKind::Decision, "important", "c", 80, &[])
            .unwrap();

        let sync = SyncBookkeeper::new(store.clone());
        sync.mark_synced(&m.id, "kb_42").unwrap();

        assert!(sync.pending().unwrap().is_empty());

        let stored = store.get_memory(&m.id).unwrap();
        assert_eq!(stored.remote_ref.as_deref(), Some("kb_42"));
        assert!(stored.synced_at.is_some());

        let history = sync.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, SyncStatus::Success);
    }

    #[test]
    fn test_edit_after_sync_makes_pending_again() {
        let store = store();
        let m = store
            .create_memory(MemoryKind::Decision, "important", "c", 80, &[])
            .unwrap();

        let sync = SyncBookkeeper::new(store.clone());
        sync.mark_synced(&m.id, "kb_42").unwrap();
        assert!(sync.pending().unwrap().is_empty());

        store
            .update_memory(&m.id, &MemoryPatch::new().content("revised"))
            .unwrap();

        let pending = sync.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].first_push);
    }

    #[test]
    fn test_failed_attempt_keeps_pending() {
        let store = store();
        let m = store
            .create_memory(MemoryKind::Decision, "important", "c", 80, &[])
            .unwrap();

        let sync = SyncBookkeeper::new(store);
        sync.mark_sync_failed(&m.id, "mirror unreachable").unwrap();

        assert_eq!(sync.pending().unwrap().len(), 1);
        let history = sync.history(10).unwrap();
        assert_eq!(history[0].status, SyncStatus::Failed);
        assert_eq!(history[0].detail, "mirror unreachable");
    }

    #[test]
    fn test_mark_synced_unknown_memory() {
        let sync = SyncBookkeeper::new(store());
        let err = sync.mark_synced("mem_missing", "kb_1").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
