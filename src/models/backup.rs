use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Dataset, Session, SiteConfig, User, Video};
use crate::constants::{ERR_BUNDLE_MISSING_VIDEOS, METADATA_PREFIX};
use crate::error::{AppError, Result};

/// Point-in-time export of every collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBundle {
    pub videos: Vec<Video>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub site_config: Option<SiteConfig>,
    #[serde(default)]
    pub backup_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<String>,
}

impl BackupBundle {
    /// Validate the shape and decode a bundle
    ///
    /// A bundle without a `videos` array is rejected before anything is
    /// decoded further, so a restore never starts from a malformed payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value.get("videos") {
            Some(videos) if videos.is_array() => {}
            _ => return Err(AppError::InvalidBackup(ERR_BUNDLE_MISSING_VIDEOS.to_string())),
        }

        serde_json::from_value(value).map_err(|e| AppError::InvalidBackup(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| AppError::InvalidBackup(e.to_string()))?;
        Self::from_value(value)
    }

    /// Key the bundle is uploaded under: `metadata/backup-<epochMillis>.json`
    pub fn object_key(taken_at: DateTime<Utc>) -> String {
        format!("{}/backup-{}.json", METADATA_PREFIX, taken_at.timestamp_millis())
    }
}

impl From<BackupBundle> for Dataset {
    fn from(bundle: BackupBundle) -> Self {
        Dataset {
            videos: bundle.videos,
            users: bundle.users,
            sessions: bundle.sessions,
            site_config: bundle.site_config.unwrap_or_default(),
            backup_date: bundle.backup_date,
            version: bundle.version,
        }
    }
}

/// Contents of `metadata/latest-backup.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBackupPointer {
    pub backup_key: String,
    pub backup_date: DateTime<Utc>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_missing_videos() {
        let result = BackupBundle::from_value(json!({ "users": [] }));
        assert!(matches!(result, Err(AppError::InvalidBackup(_))));

        let result = BackupBundle::from_value(json!({ "videos": "nope" }));
        assert!(matches!(result, Err(AppError::InvalidBackup(_))));

        let result = BackupBundle::from_slice(b"not json");
        assert!(matches!(result, Err(AppError::InvalidBackup(_))));
    }

    #[test]
    fn test_minimal_bundle() {
        let bundle = BackupBundle::from_value(json!({ "videos": [] })).unwrap();
        assert!(bundle.users.is_empty());
        assert!(bundle.site_config.is_none());
        assert!(bundle.backup_date.is_none());
    }

    #[test]
    fn test_malformed_entry_is_invalid_backup() {
        let result = BackupBundle::from_value(json!({ "videos": [{ "title": 3 }] }));
        assert!(matches!(result, Err(AppError::InvalidBackup(_))));
    }

    #[test]
    fn test_object_key() {
        let taken_at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(
            BackupBundle::object_key(taken_at),
            "metadata/backup-1700000000123.json"
        );
    }
}
