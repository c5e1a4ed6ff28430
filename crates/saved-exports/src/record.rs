//! Saved-export records and expiry arithmetic.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_EXPIRY_DAYS: i64 = 1;
pub const MAX_EXPIRY_DAYS: i64 = 365;

/// One durable copy of a rendered artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedExport {
    pub id: Uuid,
    pub owner_id: String,
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Display label such as `1080p standard`.
    pub quality: String,
    /// Object-store key, `{owner}/{content}/{file}`.
    pub storage_key: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Total days granted so far, initial period plus every extension.
    pub expires_in_days: i64,
}

impl SavedExport {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn belongs_to(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    pub fn file_name(&self) -> &str {
        self.storage_key
            .rsplit('/')
            .next()
            .unwrap_or(&self.storage_key)
    }

    pub fn view(&self, now: DateTime<Utc>, url: String) -> SavedExportView {
        SavedExportView {
            record: self.clone(),
            url,
            is_expired: self.is_expired_at(now),
        }
    }
}

/// A record as returned to callers, with read-time fields filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedExportView {
    #[serde(flatten)]
    pub record: SavedExport,
    pub url: String,
    pub is_expired: bool,
}

/// Clamp a requested retention period into the allowed range.
pub fn clamp_days(days: i64) -> i64 {
    days.clamp(MIN_EXPIRY_DAYS, MAX_EXPIRY_DAYS)
}

/// New expiry after extending by `days`.
///
/// Counts from `now` when the export has already lapsed, so remaining time
/// never shrinks.
pub fn extended_expiry(
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    days: i64,
) -> DateTime<Utc> {
    now.max(expires_at) + Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 9, 0, 0).unwrap()
    }

    fn record(expires_at: DateTime<Utc>) -> SavedExport {
        SavedExport {
            id: Uuid::new_v4(),
            owner_id: "u1".into(),
            content_id: "c1".into(),
            title: None,
            quality: "1080p standard".into(),
            storage_key: "u1/c1/1700000000000-render.mp4".into(),
            size_bytes: 42,
            created_at: at(1),
            expires_at,
            expires_in_days: 10,
        }
    }

    #[test]
    fn test_clamp_days() {
        assert_eq!(clamp_days(0), 1);
        assert_eq!(clamp_days(-4), 1);
        assert_eq!(clamp_days(10), 10);
        assert_eq!(clamp_days(1000), 365);
    }

    #[test]
    fn test_extension_counts_from_later_of_now_and_expiry() {
        assert_eq!(extended_expiry(at(4), at(11), 7), at(18));
        // Already lapsed: counts from now.
        assert_eq!(extended_expiry(at(20), at(11), 7), at(27));
    }

    #[test]
    fn test_expiry_is_strictly_before_now() {
        let r = record(at(11));
        assert!(!r.is_expired_at(at(11)));
        assert!(r.is_expired_at(at(11) + Duration::seconds(1)));
        assert!(!r.is_expired_at(at(5)));
    }

    #[test]
    fn test_view_flattens_record() {
        let r = record(at(11));
        let json = serde_json::to_value(r.view(at(12), "/saved-exports/x".into())).unwrap();
        assert_eq!(json["owner_id"], "u1");
        assert_eq!(json["is_expired"], true);
        assert_eq!(json["url"], "/saved-exports/x");
        assert_eq!(r.file_name(), "1700000000000-render.mp4");
    }

    proptest! {
        #[test]
        fn prop_extension_never_shortens(
            now_offset in -400i64..400,
            days in MIN_EXPIRY_DAYS..=MAX_EXPIRY_DAYS,
        ) {
            let expires_at = at(15);
            let now = expires_at + Duration::days(now_offset);
            let extended = extended_expiry(now, expires_at, days);
            prop_assert!(extended >= expires_at + Duration::days(days));
            prop_assert!(extended >= now + Duration::days(days));
            prop_assert!(!record(extended).is_expired_at(now));
        }
    }
}
