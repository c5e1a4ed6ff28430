//! Saved-export retention scenarios driven by a manual clock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use montage_common::{ManualClock, MontageError, MontageResult};
use montage_saved_exports::{
    JsonFileRecordStore, LocalObjectStore, MemoryRecordStore, ObjectStore, RecordStore,
    SaveRequest, SavedExport, SavedExportManager,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 30, 0).unwrap()
}

struct Fixture {
    dir: tempfile::TempDir,
    clock: ManualClock,
    render: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let renders = dir.path().join("renders");
        std::fs::create_dir_all(&renders).unwrap();
        let render = renders.join("render-c1-0a1b2c3d-1.mp4");
        std::fs::write(&render, b"rendered frames").unwrap();
        Self {
            dir,
            clock: ManualClock::new(t0()),
            render,
        }
    }

    fn store_root(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    fn manager(&self) -> SavedExportManager {
        SavedExportManager::new(
            Arc::new(LocalObjectStore::new(self.store_root(), "/saved-exports")),
            Arc::new(JsonFileRecordStore::new(self.dir.path().join("records.json"))),
        )
        .with_clock(Arc::new(self.clock.clone()))
        .with_render_dir(self.dir.path().join("renders"))
    }

    fn request(&self, owner: &str, days: Option<i64>) -> SaveRequest {
        SaveRequest {
            owner_id: owner.to_string(),
            content_id: "c1".to_string(),
            source: self.render.display().to_string(),
            title: Some("Launch teaser".to_string()),
            quality: Some("1080p standard".to_string()),
            expires_in_days: days,
        }
    }
}

#[tokio::test]
async fn test_save_then_extend_scenario() {
    let fx = Fixture::new();
    let manager = fx.manager();

    let saved = manager.save(fx.request("u1", Some(10))).await.unwrap();
    assert_eq!(saved.record.expires_at, t0() + Duration::days(10));
    assert_eq!(saved.record.expires_in_days, 10);
    assert!(!saved.is_expired);

    fx.clock.advance(Duration::days(3));
    let extended = manager.extend(saved.record.id, "u1", 7).await.unwrap();
    assert_eq!(extended.record.expires_at, t0() + Duration::days(17));
    assert_eq!(extended.record.expires_in_days, 17);
}

#[tokio::test]
async fn test_save_copies_and_never_moves() {
    let fx = Fixture::new();
    let manager = fx.manager();

    let saved = manager.save(fx.request("u1", None)).await.unwrap();
    assert!(fx.render.exists());
    let stored = fx.store_root().join(&saved.record.storage_key);
    assert_eq!(std::fs::read(&stored).unwrap(), b"rendered frames");
    assert!(saved.record.storage_key.starts_with("u1/c1/"));
    assert_eq!(saved.url, format!("/saved-exports/{}", saved.record.storage_key));
    assert_eq!(saved.record.expires_in_days, 10);

    // The durable copy outlives the render work file.
    std::fs::remove_file(&fx.render).unwrap();
    assert!(stored.exists());
}

#[tokio::test]
async fn test_save_clamps_retention() {
    let fx = Fixture::new();
    let manager = fx.manager();

    let short = manager.save(fx.request("u1", Some(0))).await.unwrap();
    assert_eq!(short.record.expires_at, t0() + Duration::days(1));

    fx.clock.advance(Duration::milliseconds(5));
    let long = manager.save(fx.request("u1", Some(9999))).await.unwrap();
    assert_eq!(long.record.expires_in_days, 365);
}

#[tokio::test]
async fn test_save_from_render_url() {
    let fx = Fixture::new();
    let manager = fx.manager();
    let mut request = fx.request("u1", None);
    request.source = "https://app.example.com/exports/render-c1-0a1b2c3d-1.mp4".to_string();

    let saved = manager.save(request).await.unwrap();
    assert!(saved.record.storage_key.ends_with("-render-c1-0a1b2c3d-1.mp4"));
}

#[tokio::test]
async fn test_extending_lapsed_export_counts_from_now() {
    let fx = Fixture::new();
    let manager = fx.manager();
    let saved = manager.save(fx.request("u1", Some(2))).await.unwrap();

    fx.clock.advance(Duration::days(5));
    let listed = manager.list("u1", None).await.unwrap();
    assert!(listed[0].is_expired);

    let extended = manager.extend(saved.record.id, "u1", 3).await.unwrap();
    assert_eq!(extended.record.expires_at, t0() + Duration::days(8));
    assert!(!extended.is_expired);
}

#[tokio::test]
async fn test_extend_errors() {
    let fx = Fixture::new();
    let manager = fx.manager();
    let saved = manager.save(fx.request("u1", None)).await.unwrap();

    let missing = manager.extend(uuid::Uuid::new_v4(), "u1", 5).await.unwrap_err();
    assert!(matches!(missing, MontageError::NotFound { .. }));

    let foreign = manager.extend(saved.record.id, "u2", 5).await.unwrap_err();
    assert!(matches!(foreign, MontageError::Ownership { .. }));
    assert!(foreign.is_client_fault());
}

#[tokio::test]
async fn test_is_expired_is_derived_without_sweep() {
    let fx = Fixture::new();
    let manager = fx.manager();
    let saved = manager.save(fx.request("u1", Some(10))).await.unwrap();

    fx.clock.set(saved.record.expires_at);
    assert!(!manager.list("u1", None).await.unwrap()[0].is_expired);

    fx.clock.advance(Duration::seconds(1));
    let listed = manager.list("u1", Some("c1")).await.unwrap();
    assert!(listed[0].is_expired);
    // Listing never deletes.
    assert!(fx.store_root().join(&saved.record.storage_key).exists());
}

#[tokio::test]
async fn test_list_filters_and_sorts_newest_first() {
    let fx = Fixture::new();
    let manager = fx.manager();
    let first = manager.save(fx.request("u1", None)).await.unwrap();
    fx.clock.advance(Duration::minutes(1));
    let second = manager.save(fx.request("u1", None)).await.unwrap();
    fx.clock.advance(Duration::minutes(1));
    manager.save(fx.request("u2", None)).await.unwrap();

    let listed = manager.list("u1", None).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|v| v.record.id).collect();
    assert_eq!(ids, vec![second.record.id, first.record.id]);
    assert!(manager.list("u1", Some("other")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_is_idempotent_and_owner_checked() {
    let fx = Fixture::new();
    let manager = fx.manager();
    let saved = manager.save(fx.request("u1", None)).await.unwrap();
    let stored = fx.store_root().join(&saved.record.storage_key);

    assert_eq!(manager.delete(saved.record.id, "u2").await.unwrap(), None);
    assert!(stored.exists());

    let removed = manager.delete(saved.record.id, "u1").await.unwrap();
    assert_eq!(removed.map(|r| r.id), Some(saved.record.id));
    assert!(!stored.exists());
    assert_eq!(manager.delete(saved.record.id, "u1").await.unwrap(), None);
}

#[tokio::test]
async fn test_sweep_removes_only_expired() {
    let fx = Fixture::new();
    let manager = fx.manager();
    let short = manager.save(fx.request("u1", Some(1))).await.unwrap();
    fx.clock.advance(Duration::milliseconds(1));
    let long = manager.save(fx.request("u1", Some(30))).await.unwrap();

    fx.clock.advance(Duration::days(2));
    let report = manager.sweep_expired().await.unwrap();
    assert_eq!(report.removed, vec![short.record.id]);
    assert!(report.failed.is_empty());

    let remaining = manager.list("u1", None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].record.id, long.record.id);
    assert!(!fx.store_root().join(&short.record.storage_key).exists());
}

#[tokio::test]
async fn test_same_instant_saves_keep_independent_copies() {
    let fx = Fixture::new();
    let manager = fx.manager();

    let first = manager.save(fx.request("u1", None)).await.unwrap();
    let second = manager.save(fx.request("u1", None)).await.unwrap();
    assert_ne!(first.record.storage_key, second.record.storage_key);

    manager.delete(second.record.id, "u1").await.unwrap();

    let listed = manager.list("u1", None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].record.id, first.record.id);
    let stored = fx.store_root().join(&first.record.storage_key);
    assert_eq!(std::fs::read(stored).unwrap(), b"rendered frames");
}

#[tokio::test]
async fn test_invalid_owner_is_rejected_before_copy() {
    let fx = Fixture::new();
    let manager = fx.manager();
    let err = manager.save(fx.request("../u1", None)).await.unwrap_err();
    assert!(err.is_client_fault());
    assert!(!fx.store_root().exists());
}

/// Records that refuse every insert.
struct RejectingRecords;

impl RecordStore for RejectingRecords {
    fn insert(&self, _record: &SavedExport) -> MontageResult<()> {
        Err(MontageError::storage("records unavailable"))
    }

    fn get(&self, _id: uuid::Uuid) -> MontageResult<Option<SavedExport>> {
        Ok(None)
    }

    fn update(&self, record: &SavedExport) -> MontageResult<()> {
        Err(MontageError::not_found(record.id.to_string()))
    }

    fn remove(&self, _id: uuid::Uuid) -> MontageResult<Option<SavedExport>> {
        Ok(None)
    }

    fn all(&self) -> MontageResult<Vec<SavedExport>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_failed_record_insert_removes_copy() {
    let fx = Fixture::new();
    let objects = Arc::new(LocalObjectStore::new(fx.store_root(), "/saved-exports"));
    let manager = SavedExportManager::new(objects, Arc::new(RejectingRecords))
        .with_clock(Arc::new(fx.clock.clone()));

    let err = manager.save(fx.request("u1", None)).await.unwrap_err();
    assert!(matches!(err, MontageError::Storage { .. }));
    let leftovers = std::fs::read_dir(fx.store_root().join("u1").join("c1"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

/// Object store whose deletes always fail.
struct StickyObjects {
    inner: LocalObjectStore,
}

#[async_trait]
impl ObjectStore for StickyObjects {
    async fn put_copy(&self, source: &Path, key: &str) -> MontageResult<u64> {
        self.inner.put_copy(source, key).await
    }

    async fn delete(&self, _key: &str) -> MontageResult<()> {
        Err(MontageError::storage("bucket is read-only"))
    }

    async fn exists(&self, key: &str) -> bool {
        self.inner.exists(key).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }
}

#[tokio::test]
async fn test_sweep_keeps_record_when_copy_survives() {
    let fx = Fixture::new();
    let records = Arc::new(MemoryRecordStore::new());
    let manager = SavedExportManager::new(
        Arc::new(StickyObjects {
            inner: LocalObjectStore::new(fx.store_root(), "/s"),
        }),
        records.clone(),
    )
    .with_clock(Arc::new(fx.clock.clone()));

    let saved = manager.save(fx.request("u1", Some(1))).await.unwrap();
    fx.clock.advance(Duration::days(3));
    let report = manager.sweep_expired().await.unwrap();

    assert!(report.removed.is_empty());
    assert_eq!(report.failed, vec![saved.record.id]);
    assert!(records.get(saved.record.id).unwrap().is_some());
}
