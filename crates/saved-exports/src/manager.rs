//! Saved-export lifecycle: save, list, extend, delete and sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use montage_common::{AppConfig, Clock, MontageError, MontageResult, SystemClock};

use crate::record::{
    clamp_days, extended_expiry, SavedExport, SavedExportView, MAX_EXPIRY_DAYS, MIN_EXPIRY_DAYS,
};
use crate::records::{JsonFileRecordStore, RecordStore};
use crate::storage::{object_key, LocalObjectStore, ObjectStore};

/// Arguments of [`SavedExportManager::save`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveRequest {
    pub owner_id: String,
    pub content_id: String,
    /// A render output path, or the public URL it was served under.
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub removed: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

pub struct SavedExportManager {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    default_expires_days: i64,
    render_dir: Option<PathBuf>,
}

impl SavedExportManager {
    pub fn new(objects: Arc<dyn ObjectStore>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            objects,
            records,
            clock: Arc::new(SystemClock),
            default_expires_days: 10,
            render_dir: None,
        }
    }

    /// Local object store and JSON records as configured, resolving render
    /// URLs against the engine work directory.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(LocalObjectStore::from_config(&config.storage)),
            Arc::new(JsonFileRecordStore::new(config.storage.records_path.clone())),
        )
        .with_default_expires_days(config.exports.default_expires_days)
        .with_render_dir(config.engine.work_dir.clone())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_expires_days(mut self, days: i64) -> Self {
        self.default_expires_days = clamp_days(days);
        self
    }

    /// Directory that render outputs live in, for sources given as URLs.
    pub fn with_render_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.render_dir = Some(dir.into());
        self
    }

    /// Copy a rendered artifact into durable storage and start its retention period.
    pub async fn save(&self, request: SaveRequest) -> MontageResult<SavedExportView> {
        let source = self.resolve_source(&request.source)?;
        let source_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| MontageError::validation("source", "source has no file name"))?;

        let now = self.clock.now();
        let days = clamp_days(request.expires_in_days.unwrap_or(self.default_expires_days));
        let id = Uuid::new_v4();
        let file_name = format!("{}-{}-{}", now.timestamp_millis(), id.simple(), source_name);
        let key = object_key(&request.owner_id, &request.content_id, &file_name)?;

        let size_bytes = self.objects.put_copy(&source, &key).await?;
        let record = SavedExport {
            id,
            owner_id: request.owner_id,
            content_id: request.content_id,
            title: request.title.filter(|t| !t.trim().is_empty()),
            quality: request.quality.unwrap_or_else(|| "1080p".to_string()),
            storage_key: key.clone(),
            size_bytes,
            created_at: now,
            expires_at: now + chrono::Duration::days(days),
            expires_in_days: days,
        };

        if let Err(e) = self.records.insert(&record) {
            if let Err(cleanup) = self.objects.delete(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned export copy");
            }
            return Err(e);
        }

        tracing::info!(
            id = %record.id,
            owner_id = %record.owner_id,
            content_id = %record.content_id,
            days,
            bytes = size_bytes,
            "Saved export"
        );
        Ok(self.view(&record))
    }

    /// Push the expiry of an owned export out by `days` (1..=365).
    pub async fn extend(
        &self,
        id: Uuid,
        owner_id: &str,
        days: i64,
    ) -> MontageResult<SavedExportView> {
        if !(MIN_EXPIRY_DAYS..=MAX_EXPIRY_DAYS).contains(&days) {
            return Err(MontageError::validation(
                "extend_by_days",
                format!("must be between {MIN_EXPIRY_DAYS} and {MAX_EXPIRY_DAYS}, got {days}"),
            ));
        }
        let mut record = self
            .records
            .get(id)?
            .ok_or_else(|| MontageError::not_found(format!("saved export {id}")))?;
        if !record.belongs_to(owner_id) {
            return Err(MontageError::ownership(format!(
                "saved export {id} belongs to another user"
            )));
        }

        let previous = record.expires_at;
        record.expires_at = extended_expiry(self.clock.now(), record.expires_at, days);
        record.expires_in_days += days;
        self.records.update(&record)?;

        tracing::info!(
            id = %id,
            from = %previous,
            to = %record.expires_at,
            "Extended saved export"
        );
        Ok(self.view(&record))
    }

    /// Owned exports, newest first, optionally for one content item.
    pub async fn list(
        &self,
        owner_id: &str,
        content_id: Option<&str>,
    ) -> MontageResult<Vec<SavedExportView>> {
        let mut records: Vec<SavedExport> = self
            .records
            .all()?
            .into_iter()
            .filter(|r| r.belongs_to(owner_id))
            .filter(|r| content_id.map_or(true, |c| r.content_id == c))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records.iter().map(|r| self.view(r)).collect())
    }

    /// Remove an owned export's copy and record.
    ///
    /// Missing and foreign records yield `Ok(None)`.
    pub async fn delete(&self, id: Uuid, owner_id: &str) -> MontageResult<Option<SavedExport>> {
        let Some(record) = self.records.get(id)? else {
            return Ok(None);
        };
        if !record.belongs_to(owner_id) {
            tracing::debug!(id = %id, "Ignoring delete of foreign saved export");
            return Ok(None);
        }
        self.objects.delete(&record.storage_key).await?;
        let removed = self.records.remove(id)?;
        tracing::info!(id = %id, "Deleted saved export");
        Ok(removed)
    }

    /// Physically remove every export whose expiry has passed.
    ///
    /// A record is only dropped once its copy is gone, so a failed delete
    /// is retried by the next sweep.
    pub async fn sweep_expired(&self) -> MontageResult<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        for record in self.records.all()? {
            if !record.is_expired_at(now) {
                continue;
            }
            match self.objects.delete(&record.storage_key).await {
                Ok(()) => {
                    self.records.remove(record.id)?;
                    report.removed.push(record.id);
                }
                Err(e) => {
                    tracing::warn!(id = %record.id, error = %e, "Failed to sweep expired export");
                    report.failed.push(record.id);
                }
            }
        }
        tracing::info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Expiry sweep finished"
        );
        Ok(report)
    }

    fn view(&self, record: &SavedExport) -> SavedExportView {
        record.view(self.clock.now(), self.objects.public_url(&record.storage_key))
    }

    /// Accept either a filesystem path or a render URL whose last segment
    /// names a file in the render directory.
    fn resolve_source(&self, source: &str) -> MontageResult<PathBuf> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(MontageError::validation("source", "export path is required"));
        }
        let direct = Path::new(trimmed);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        let name = trimmed
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or(trimmed)
            .rsplit('/')
            .next()
            .unwrap_or_default();
        if let Some(dir) = &self.render_dir {
            if !name.is_empty() && name != "." && name != ".." {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(MontageError::not_found(format!("render output {trimmed}")))
    }
}
