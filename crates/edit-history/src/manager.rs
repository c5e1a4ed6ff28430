//! Per-content history operations on top of a [`HistoryStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use montage_common::{Clock, HistoryConfig, MontageResult, SystemClock};
use montage_edit_model::EditState;

use crate::history::{EditHistory, HistoryMove, HistoryView};
use crate::store::{HistoryStore, JsonFileHistoryStore};

/// Loads, mutates and stores one history per content id.
///
/// Every read-modify-write for a content id runs under that id's lock;
/// different content ids never contend.
pub struct EditHistoryManager {
    store: Arc<dyn HistoryStore>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EditHistoryManager {
    pub fn new(store: Arc<dyn HistoryStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            clock: Arc::new(SystemClock),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// JSON-file store under the configured directory.
    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(
            Arc::new(JsonFileHistoryStore::new(config.store_dir.clone())),
            config.capacity,
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Capture `state` as the newest snapshot for `content_id`.
    pub fn append(&self, content_id: &str, state: serde_json::Value) -> MontageResult<EditState> {
        let snapshot = EditState::capture(state, self.clock.now());
        let recorded = snapshot.clone();
        self.update(content_id, move |history| {
            history.append(snapshot);
            tracing::debug!(
                len = history.len(),
                current_index = history.current_index(),
                "Snapshot appended"
            );
        })?;
        Ok(recorded)
    }

    pub fn undo(&self, content_id: &str) -> MontageResult<HistoryMove> {
        self.update(content_id, EditHistory::undo)
    }

    pub fn redo(&self, content_id: &str) -> MontageResult<HistoryMove> {
        self.update(content_id, EditHistory::redo)
    }

    /// Current view; an unknown content id yields the empty view.
    pub fn history(&self, content_id: &str) -> MontageResult<HistoryView> {
        self.locked(content_id, || Ok(self.load(content_id)?.view()))
    }

    pub fn clear(&self, content_id: &str) -> MontageResult<()> {
        self.locked(content_id, || {
            self.store.remove(content_id)?;
            tracing::info!(content_id, "History cleared");
            Ok(())
        })
    }

    fn update<T>(
        &self,
        content_id: &str,
        apply: impl FnOnce(&mut EditHistory) -> T,
    ) -> MontageResult<T> {
        self.locked(content_id, || {
            let mut history = self.load(content_id)?;
            let before = history.clone();
            let out = apply(&mut history);
            if history != before {
                self.store.store(content_id, &history)?;
            }
            Ok(out)
        })
    }

    fn load(&self, content_id: &str) -> MontageResult<EditHistory> {
        let mut history = self
            .store
            .load(content_id)?
            .unwrap_or_else(|| EditHistory::new(self.capacity));
        if history.capacity() != self.capacity {
            history.set_capacity(self.capacity);
        }
        Ok(history)
    }

    /// Run `f` under `content_id`'s lock. The lock entry is dropped again
    /// once no other caller holds or waits on it.
    fn locked<T>(
        &self,
        content_id: &str,
        f: impl FnOnce() -> MontageResult<T>,
    ) -> MontageResult<T> {
        let lock = self.lock_for(content_id);
        let out = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        self.release(content_id, lock);
        out
    }

    fn lock_for(&self, content_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(content_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, content_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map plus ours: nobody else can reach it.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(content_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryHistoryStore;
    use serde_json::json;

    fn manager(capacity: usize) -> EditHistoryManager {
        EditHistoryManager::new(Arc::new(MemoryHistoryStore::new()), capacity)
    }

    #[test]
    fn test_contents_are_independent() {
        let manager = manager(10);
        manager.append("a", json!({"v": 1})).unwrap();
        manager.append("a", json!({"v": 2})).unwrap();
        manager.append("b", json!({"v": 10})).unwrap();

        assert!(manager.undo("a").unwrap().snapshot().is_some());
        assert_eq!(manager.history("a").unwrap().current_index, 0);
        assert_eq!(manager.history("b").unwrap().current_index, 0);
        assert_eq!(manager.undo("b").unwrap(), HistoryMove::AtBoundary);
    }

    #[test]
    fn test_unknown_content_is_empty_view() {
        let manager = manager(10);
        let view = manager.history("never-seen").unwrap();
        assert!(view.snapshots.is_empty());
        assert_eq!(view.current_index, -1);
        assert_eq!(manager.undo("never-seen").unwrap(), HistoryMove::AtBoundary);
    }

    #[test]
    fn test_lock_entries_do_not_accumulate() {
        let manager = manager(5);
        for n in 0..50 {
            let id = format!("content-{n}");
            manager.append(&id, json!({ "n": n })).unwrap();
            manager.undo(&id).unwrap();
            manager.history(&id).unwrap();
        }
        manager.clear("content-0").unwrap();
        assert_eq!(manager.tracked_locks(), 0);
    }

    #[test]
    fn test_concurrent_appends_keep_every_snapshot() {
        let manager = Arc::new(manager(200));
        let workers: Vec<_> = (0..8)
            .map(|w| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for n in 0..10 {
                        manager.append("shared", json!({ "w": w, "n": n })).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(manager.history("shared").unwrap().snapshots.len(), 80);
        assert_eq!(manager.tracked_locks(), 0);
    }

    #[test]
    fn test_lower_capacity_applies_to_stored_history() {
        let store = Arc::new(MemoryHistoryStore::new());
        let wide = EditHistoryManager::new(store.clone(), 10);
        for v in 0..6 {
            wide.append("c", json!({ "v": v })).unwrap();
        }
        let narrow = EditHistoryManager::new(store, 3);
        let view = narrow.history("c").unwrap();
        assert_eq!(view.snapshots.len(), 3);
        assert_eq!(view.snapshots[0].state["v"], 3);
        assert_eq!(view.current_index, 2);
    }
}
