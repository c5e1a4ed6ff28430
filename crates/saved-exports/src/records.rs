//! Saved-export record persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use montage_common::{MontageError, MontageResult};

use crate::record::SavedExport;

/// Keyed record storage. Implementations serialize writes per document.
pub trait RecordStore: Send + Sync {
    fn insert(&self, record: &SavedExport) -> MontageResult<()>;

    fn get(&self, id: Uuid) -> MontageResult<Option<SavedExport>>;

    /// Replace an existing record; `NotFound` if it vanished.
    fn update(&self, record: &SavedExport) -> MontageResult<()>;

    fn remove(&self, id: Uuid) -> MontageResult<Option<SavedExport>>;

    fn all(&self) -> MontageResult<Vec<SavedExport>>;
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<Uuid, SavedExport>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert(&self, record: &SavedExport) -> MontageResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(record.id, record.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> MontageResult<Option<SavedExport>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&id).cloned())
    }

    fn update(&self, record: &SavedExport) -> MontageResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        match records.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(MontageError::not_found(format!("saved export {}", record.id))),
        }
    }

    fn remove(&self, id: Uuid) -> MontageResult<Option<SavedExport>> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.remove(&id))
    }

    fn all(&self) -> MontageResult<Vec<SavedExport>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.values().cloned().collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordDocument {
    #[serde(default)]
    exports: Vec<SavedExport>,
}

/// All records in one JSON document, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileRecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> MontageResult<RecordDocument> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RecordDocument::default())
            }
            Err(e) => {
                return Err(MontageError::storage(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_str(&content).map_err(|e| {
            MontageError::storage(format!("Corrupt records at {}: {e}", self.path.display()))
        })
    }

    fn write(&self, doc: &RecordDocument) -> MontageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MontageError::storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                MontageError::storage(format!("Failed to write {}: {e}", self.path.display()))
            })
    }

    fn modify<T>(
        &self,
        apply: impl FnOnce(&mut RecordDocument) -> MontageResult<T>,
    ) -> MontageResult<T> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.read()?;
        let out = apply(&mut doc)?;
        self.write(&doc)?;
        Ok(out)
    }
}

impl RecordStore for JsonFileRecordStore {
    fn insert(&self, record: &SavedExport) -> MontageResult<()> {
        self.modify(|doc| {
            doc.exports.retain(|r| r.id != record.id);
            doc.exports.push(record.clone());
            Ok(())
        })
    }

    fn get(&self, id: Uuid) -> MontageResult<Option<SavedExport>> {
        Ok(self.read()?.exports.into_iter().find(|r| r.id == id))
    }

    fn update(&self, record: &SavedExport) -> MontageResult<()> {
        self.modify(|doc| {
            let slot = doc
                .exports
                .iter_mut()
                .find(|r| r.id == record.id)
                .ok_or_else(|| MontageError::not_found(format!("saved export {}", record.id)))?;
            *slot = record.clone();
            Ok(())
        })
    }

    fn remove(&self, id: Uuid) -> MontageResult<Option<SavedExport>> {
        self.modify(|doc| {
            let index = doc.exports.iter().position(|r| r.id == id);
            Ok(index.map(|i| doc.exports.remove(i)))
        })
    }

    fn all(&self) -> MontageResult<Vec<SavedExport>> {
        Ok(self.read()?.exports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(owner: &str) -> SavedExport {
        let now = Utc::now();
        SavedExport {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            content_id: "c".into(),
            title: Some("Teaser".into()),
            quality: "1080p standard".into(),
            storage_key: format!("{owner}/c/f.mp4"),
            size_bytes: 1,
            created_at: now,
            expires_at: now + Duration::days(10),
            expires_in_days: 10,
        }
    }

    fn exercise(store: &dyn RecordStore) {
        let a = record("u1");
        let mut b = record("u2");
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();
        assert_eq!(store.all().unwrap().len(), 2);

        b.expires_in_days = 17;
        store.update(&b).unwrap();
        assert_eq!(store.get(b.id).unwrap().unwrap().expires_in_days, 17);

        assert_eq!(store.remove(a.id).unwrap(), Some(a.clone()));
        assert_eq!(store.remove(a.id).unwrap(), None);
        assert!(matches!(
            store.update(&a),
            Err(MontageError::NotFound { .. })
        ));
        assert_eq!(store.all().unwrap(), vec![b]);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryRecordStore::new());
    }

    #[test]
    fn test_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("saved-exports.json");
        exercise(&JsonFileRecordStore::new(&path));

        let reopened = JsonFileRecordStore::new(&path);
        assert_eq!(reopened.all().unwrap().len(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
