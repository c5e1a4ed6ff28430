//! Montage Saved Exports
//!
//! Keeps rendered artifacts the user chose to save, independent of the
//! render work directory, for a bounded number of days.
//!
//! ```text
//! render output ──copy──▶ ObjectStore {owner}/{content}/{file}
//!                               │
//!                  RecordStore (expires_at, expires_in_days)
//! ```
//!
//! `is_expired` is always derived at read time. Nothing is physically removed
//! until [`SavedExportManager::sweep_expired`] runs.

pub mod manager;
pub mod record;
pub mod records;
pub mod storage;

pub use manager::{SaveRequest, SavedExportManager, SweepReport};
pub use record::{extended_expiry, SavedExport, SavedExportView, MAX_EXPIRY_DAYS, MIN_EXPIRY_DAYS};
pub use records::{JsonFileRecordStore, MemoryRecordStore, RecordStore};
pub use storage::{object_key, LocalObjectStore, ObjectStore};
