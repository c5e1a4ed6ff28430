//! Montage Edit History
//!
//! Undo/redo over editor snapshots, one bounded sequence per content item.
//! Undo and redo only move a pointer; nothing is recomputed and no engine
//! runs. Sequences persist through a [`HistoryStore`].

pub mod history;
pub mod manager;
pub mod store;

pub use history::{EditHistory, HistoryMove, HistoryView};
pub use manager::EditHistoryManager;
pub use store::{HistoryStore, JsonFileHistoryStore, MemoryHistoryStore};
