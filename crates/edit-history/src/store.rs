//! Persistence for edit histories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use montage_common::{MontageError, MontageResult};

use crate::history::EditHistory;

/// Durable home of one history per content item.
pub trait HistoryStore: Send + Sync {
    fn load(&self, content_id: &str) -> MontageResult<Option<EditHistory>>;

    fn store(&self, content_id: &str, history: &EditHistory) -> MontageResult<()>;

    fn remove(&self, content_id: &str) -> MontageResult<()>;
}

/// Process-local store, mostly for tests and one-shot tools.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    histories: Mutex<HashMap<String, EditHistory>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self, content_id: &str) -> MontageResult<Option<EditHistory>> {
        let histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        Ok(histories.get(content_id).cloned())
    }

    fn store(&self, content_id: &str, history: &EditHistory) -> MontageResult<()> {
        let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        histories.insert(content_id.to_string(), history.clone());
        Ok(())
    }

    fn remove(&self, content_id: &str) -> MontageResult<()> {
        let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        histories.remove(content_id);
        Ok(())
    }
}

/// One pretty-printed JSON document per content item under `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileHistoryStore {
    dir: PathBuf,
}

impl JsonFileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, content_id: &str) -> MontageResult<PathBuf> {
        validate_content_id(content_id)?;
        Ok(self.dir.join(format!("{content_id}.json")))
    }
}

/// Content ids become file names, so only a conservative alphabet is allowed.
pub(crate) fn validate_content_id(content_id: &str) -> MontageResult<()> {
    let valid = !content_id.is_empty()
        && content_id.len() <= 128
        && !content_id.starts_with('.')
        && content_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(MontageError::validation(
            "content_id",
            format!("'{content_id}' is not a valid content id"),
        ))
    }
}

impl HistoryStore for JsonFileHistoryStore {
    fn load(&self, content_id: &str) -> MontageResult<Option<EditHistory>> {
        let path = self.path_for(content_id)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MontageError::storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        let mut history: EditHistory = serde_json::from_str(&content).map_err(|e| {
            MontageError::storage(format!("Corrupt history at {}: {e}", path.display()))
        })?;
        history.normalize();
        Ok(Some(history))
    }

    fn store(&self, content_id: &str, history: &EditHistory) -> MontageResult<()> {
        let path = self.path_for(content_id)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            MontageError::storage(format!("Failed to create {}: {e}", self.dir.display()))
        })?;

        let json = serde_json::to_string_pretty(history)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                MontageError::storage(format!("Failed to write {}: {e}", path.display()))
            })
    }

    fn remove(&self, content_id: &str) -> MontageResult<()> {
        let path = self.path_for(content_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MontageError::storage(format!(
                "Failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}
