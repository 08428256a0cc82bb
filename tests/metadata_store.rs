//! End-to-end tests for the metadata service
//!
//! These drive the service facade against an in-memory object store and a
//! SQLite mirror in a temporary directory, for both backend choices.

use bytes::Bytes;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

use catalog_metadata_server::backend::{BackendKind, MetadataBackend};
use catalog_metadata_server::constants::{DEFAULT_DATASET, LATEST_BACKUP_KEY};
use catalog_metadata_server::db::RelationalMirror;
use catalog_metadata_server::document::{DocumentStore, DocumentStoreOptions};
use catalog_metadata_server::models::{
    Dataset, LatestBackupPointer, NewSession, NewUser, NewVideo, SiteConfigPatch, UserPatch,
    VideoDuration, VideoPatch,
};
use catalog_metadata_server::object_store::{MemoryObjectStore, ObjectStore};
use catalog_metadata_server::security::PasswordHasher;
use catalog_metadata_server::service::{
    MetadataService, ServiceOptions, SortOption, VideoQuery,
};
use catalog_metadata_server::AppError;

const BUCKET: &str = "media";

// =============================================================================
// Test Helpers
// =============================================================================

struct Harness {
    service: Arc<MetadataService>,
    objects: Arc<MemoryObjectStore>,
    dir: TempDir,
}

fn document_key() -> String {
    format!("metadata/{}.json", DEFAULT_DATASET)
}

/// Build and initialize a service over fresh storage
async fn harness_with(
    backend: BackendKind,
    configure: impl FnOnce(&mut ServiceOptions),
) -> Harness {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(MemoryObjectStore::new());

    let document = Arc::new(DocumentStore::new(
        objects.clone(),
        DocumentStoreOptions::new(BUCKET),
    ));
    let db_path = dir.path().join("mirror.db");
    let mirror = Arc::new(
        RelationalMirror::connect(db_path.to_str().unwrap())
            .await
            .unwrap(),
    );

    let mut options = ServiceOptions {
        backend,
        backup_path: dir.path().join("data").join("backup.json"),
        ..Default::default()
    };
    configure(&mut options);

    let service = MetadataService::new(objects.clone(), document, mirror, options);
    service.initialize().await.unwrap();

    Harness {
        service: Arc::new(service),
        objects,
        dir,
    }
}

async fn harness(backend: BackendKind) -> Harness {
    harness_with(backend, |_| {}).await
}

fn demo_video() -> NewVideo {
    let mut video = NewVideo::new("Demo", 9.99, VideoDuration::Seconds(125));
    video.description = "A short demo clip".to_string();
    video.video_file_id = "videos/demo.mp4".to_string();
    video.thumbnail_file_id = "thumbnails/demo.jpg".to_string();
    video
}

// =============================================================================
// Video Lifecycle
// =============================================================================

async fn run_video_lifecycle(backend: BackendKind) {
    let h = harness(backend).await;
    let service = &h.service;

    let created = service.create_video(demo_video()).await.unwrap();
    assert!(!created.id.is_empty());
    assert_eq!(created.duration, VideoDuration::Clock("02:05".to_string()));
    assert_eq!(created.views, 0);

    let fetched = service.get_video(&created.id).await.unwrap().unwrap();
    assert_eq!(fetched, created);

    for _ in 0..3 {
        assert!(service.increment_video_views(&created.id).await.unwrap());
    }
    let fetched = service.get_video(&created.id).await.unwrap().unwrap();
    assert_eq!(fetched.views, 3);

    assert!(service.delete_video(&created.id).await.unwrap());
    assert!(service.get_video(&created.id).await.unwrap().is_none());

    let deleted = h.objects.deleted_keys();
    assert_eq!(deleted.len(), 2);
    assert!(deleted.contains(&(BUCKET.to_string(), "videos/demo.mp4".to_string())));
    assert!(deleted.contains(&(BUCKET.to_string(), "thumbnails/demo.jpg".to_string())));

    // Deleting again is a no-op and touches no objects
    assert!(!service.delete_video(&created.id).await.unwrap());
    assert_eq!(h.objects.deleted_keys().len(), 2);
}

#[tokio::test]
async fn test_video_lifecycle_document_backend() {
    run_video_lifecycle(BackendKind::Document).await;
}

#[tokio::test]
async fn test_video_lifecycle_relational_backend() {
    run_video_lifecycle(BackendKind::Relational).await;
}

#[tokio::test]
async fn test_partial_update_merges() {
    let h = harness(BackendKind::Document).await;
    let created = h.service.create_video(demo_video()).await.unwrap();

    let patch = VideoPatch {
        price: Some(14.5),
        duration: Some(VideoDuration::Seconds(3725)),
        ..Default::default()
    };
    let updated = h
        .service
        .update_video(&created.id, patch)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.price, 14.5);
    assert_eq!(updated.title, "Demo");
    assert_eq!(updated.description, "A short demo clip");
    assert_eq!(updated.duration, VideoDuration::Clock("01:02:05".to_string()));
}

#[tokio::test]
async fn test_missing_ids_do_not_write() {
    let h = harness(BackendKind::Document).await;
    let puts = h.objects.put_count();

    let patch = VideoPatch {
        title: Some("Ghost".to_string()),
        ..Default::default()
    };
    assert!(h.service.update_video("missing", patch).await.unwrap().is_none());
    assert!(!h.service.delete_video("missing").await.unwrap());
    assert!(!h.service.increment_video_views("missing").await.unwrap());

    assert_eq!(h.objects.put_count(), puts);
}

#[tokio::test]
async fn test_invalid_video_is_rejected_before_writing() {
    let h = harness(BackendKind::Document).await;
    let puts = h.objects.put_count();

    let err = h
        .service
        .create_video(NewVideo::new("  ", 1.0, VideoDuration::Seconds(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = h
        .service
        .create_video(NewVideo::new("Negative", -1.0, VideoDuration::Seconds(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    assert_eq!(h.objects.put_count(), puts);
}

#[tokio::test]
async fn test_concurrent_increments_leave_parseable_document() {
    const N: u64 = 10;
    let h = harness(BackendKind::Document).await;
    let video = h.service.create_video(demo_video()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..N {
        let service = h.service.clone();
        let id = video.id.clone();
        handles.push(tokio::spawn(async move {
            service.increment_video_views(&id).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    let raw = h.objects.get(BUCKET, &document_key()).await.unwrap().unwrap();
    let dataset: Dataset = serde_json::from_slice(&raw).unwrap();
    let stored = dataset.videos.iter().find(|v| v.id == video.id).unwrap();

    // Last writer wins: some increments may be lost, never invented
    assert!((1..=N).contains(&stored.views), "views = {}", stored.views);
}

// =============================================================================
// Read Path
// =============================================================================

#[tokio::test]
async fn test_reads_inside_window_fetch_once() {
    let h = harness(BackendKind::Document).await;
    h.service.create_video(demo_video()).await.unwrap();
    let gets = h.objects.get_count();

    let first = h.service.get_all_videos().await.unwrap();
    let second = h.service.get_all_videos().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.objects.get_count(), gets);

    h.service.document().invalidate_cache();
    h.service.get_all_videos().await.unwrap();
    assert_eq!(h.objects.get_count(), gets + 1);
}

#[tokio::test]
async fn test_store_outage_surfaces_and_preserves_document() {
    let h = harness(BackendKind::Document).await;
    h.service.create_video(demo_video()).await.unwrap();
    let before = h.objects.get(BUCKET, &document_key()).await.unwrap();
    let puts = h.objects.put_count();

    h.service.document().invalidate_cache();
    h.objects.set_fail_gets(true);

    let err = h.service.get_all_videos().await.unwrap_err();
    assert!(matches!(err, AppError::StoreUnavailable(_)));

    let err = h.service.create_video(demo_video()).await.unwrap_err();
    assert!(matches!(err, AppError::StoreUnavailable(_)));
    assert_eq!(h.objects.put_count(), puts);

    h.objects.set_fail_gets(false);
    let after = h.objects.get(BUCKET, &document_key()).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_list_videos_search_sort_and_pages() {
    let h = harness(BackendKind::Relational).await;

    for (title, price) in [("Beach", 3.0), ("Mountain", 12.0), ("Beach Night", 7.5)] {
        h.service
            .create_video(NewVideo::new(title, price, VideoDuration::Seconds(60)))
            .await
            .unwrap();
    }
    let hidden = h
        .service
        .create_video(NewVideo::new("Beach Hidden", 1.0, VideoDuration::Seconds(60)))
        .await
        .unwrap();
    let patch = VideoPatch {
        is_active: Some(false),
        ..Default::default()
    };
    h.service.update_video(&hidden.id, patch).await.unwrap();

    let query = VideoQuery {
        search: Some("beach".to_string()),
        sort: SortOption::PriceDesc,
        ..Default::default()
    };
    let page = h.service.list_videos(&query).await.unwrap();
    let titles: Vec<&str> = page.videos.iter().map(|v| v.title.as_str()).collect();
    assert_eq!(titles, vec!["Beach Night", "Beach"]);
    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 1);

    let query = VideoQuery {
        sort: SortOption::PriceAsc,
        page: 2,
        page_size: 2,
        ..Default::default()
    };
    let page = h.service.list_videos(&query).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.videos.len(), 1);
    assert_eq!(page.videos[0].title, "Mountain");
}

#[tokio::test]
async fn test_list_videos_page_past_the_end_is_empty() {
    let h = harness(BackendKind::Document).await;
    h.service.create_video(demo_video()).await.unwrap();

    for page in [5, usize::MAX] {
        let query = VideoQuery {
            page,
            page_size: 12,
            ..Default::default()
        };
        let result = h.service.list_videos(&query).await.unwrap();
        assert!(result.videos.is_empty());
        assert_eq!(result.total, 1);
        assert_eq!(result.total_pages, 1);
        assert_eq!(result.page, page);
    }
}

#[tokio::test]
async fn test_list_videos_sorts_oversized_clock_text() {
    let h = harness(BackendKind::Document).await;
    h.service.create_video(demo_video()).await.unwrap();
    let broken = NewVideo::new(
        "Broken Clock",
        1.0,
        VideoDuration::Clock("9999999999999999:00:00".to_string()),
    );
    h.service.create_video(broken).await.unwrap();

    let query = VideoQuery {
        sort: SortOption::DurationDesc,
        ..Default::default()
    };
    let page = h.service.list_videos(&query).await.unwrap();
    let titles: Vec<&str> = page.videos.iter().map(|v| v.title.as_str()).collect();
    assert_eq!(titles, vec!["Demo", "Broken Clock"]);
}

#[tokio::test]
async fn test_video_file_url() {
    let h = harness(BackendKind::Document).await;
    let video = h.service.create_video(demo_video()).await.unwrap();

    let url = h.service.video_file_url(&video.id).await.unwrap().unwrap();
    assert_eq!(url, "memory://media/videos/demo.mp4?ttl=3600");

    assert!(h.service.video_file_url("missing").await.unwrap().is_none());
}

// =============================================================================
// Users and Sessions
// =============================================================================

#[tokio::test]
async fn test_user_passwords_are_hashed() {
    let h = harness(BackendKind::Document).await;

    let user = h
        .service
        .create_user(NewUser::new("admin@example.com", "Admin", "admin123"))
        .await
        .unwrap();
    assert_eq!(
        user.password,
        "240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9"
    );

    let found = h
        .service
        .authenticate("admin@example.com", "admin123")
        .await
        .unwrap();
    assert_eq!(found.map(|u| u.id), Some(user.id.clone()));
    assert!(h
        .service
        .authenticate("admin@example.com", "wrong")
        .await
        .unwrap()
        .is_none());

    let patch = UserPatch {
        password: Some("changed".to_string()),
        ..Default::default()
    };
    h.service.update_user(&user.id, patch).await.unwrap();
    assert!(h
        .service
        .authenticate("admin@example.com", "changed")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_duplicate_email_conflicts_on_both_backends() {
    for backend in [BackendKind::Document, BackendKind::Relational] {
        let h = harness(backend).await;
        h.service
            .create_user(NewUser::new("a@example.com", "A", "pw"))
            .await
            .unwrap();

        let err = h
            .service
            .create_user(NewUser::new("a@example.com", "B", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)), "{:?}", backend);
    }
}

struct ReversingHasher;

impl PasswordHasher for ReversingHasher {
    fn hash(&self, password: &str) -> String {
        password.chars().rev().collect()
    }
}

#[tokio::test]
async fn test_password_hasher_is_pluggable() {
    let h = harness(BackendKind::Relational).await;
    let service = Arc::try_unwrap(h.service)
        .ok()
        .unwrap()
        .with_password_hasher(Arc::new(ReversingHasher));

    let user = service
        .create_user(NewUser::new("r@example.com", "R", "abc"))
        .await
        .unwrap();
    assert_eq!(user.password, "cba");
    assert!(service.authenticate("r@example.com", "abc").await.unwrap().is_some());
}

async fn run_session_rules(backend: BackendKind) {
    let h = harness(backend).await;
    let user = h
        .service
        .create_user(NewUser::new("s@example.com", "S", "pw"))
        .await
        .unwrap();

    let session = h.service.open_session(&user.id).await.unwrap();
    assert_eq!(session.token.len(), 64);
    assert!(session.expires_at > Utc::now() + Duration::hours(23));
    assert!(h.service.validate_session(&session.token).await.unwrap().is_some());

    // Expired but still flagged active: invalid, and deactivated on validation
    let expired = h
        .service
        .create_session(NewSession::new(
            &user.id,
            "expired-token",
            Utc::now() - Duration::hours(1),
        ))
        .await
        .unwrap();
    assert!(h.service.validate_session("expired-token").await.unwrap().is_none());

    let sessions = h.service.get_all_sessions().await.unwrap();
    let stored = sessions.iter().find(|s| s.id == expired.id).unwrap();
    assert!(!stored.is_active);

    // Logout deactivates without deleting
    assert!(h.service.revoke_session(&session.token).await.unwrap());
    assert!(h.service.validate_session(&session.token).await.unwrap().is_none());
    assert!(!h.service.revoke_session(&session.token).await.unwrap());
    assert_eq!(h.service.get_all_sessions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_session_rules_document_backend() {
    run_session_rules(BackendKind::Document).await;
}

#[tokio::test]
async fn test_session_rules_relational_backend() {
    run_session_rules(BackendKind::Relational).await;
}

// =============================================================================
// Site Configuration
// =============================================================================

#[tokio::test]
async fn test_site_config_defaults_and_updates() {
    for backend in [BackendKind::Document, BackendKind::Relational] {
        let h = harness(backend).await;

        let config = h.service.get_site_config().await.unwrap();
        assert_eq!(config.site_name, "VideosPlus");

        let patch = SiteConfigPatch {
            telegram_username: Some("shop_bot".to_string()),
            ..Default::default()
        };
        h.service.update_site_config(patch).await.unwrap();

        let config = h.service.get_site_config().await.unwrap();
        assert_eq!(config.telegram_username, "shop_bot");
        assert_eq!(config.site_name, "VideosPlus");
    }
}

// =============================================================================
// Backup and Restore
// =============================================================================

#[tokio::test]
async fn test_backup_then_restore_into_cleared_mirror() {
    let h = harness(BackendKind::Relational).await;

    let mut ids = HashSet::new();
    for title in ["One", "Two", "Three"] {
        let video = h
            .service
            .create_video(NewVideo::new(title, 2.0, VideoDuration::Seconds(90)))
            .await
            .unwrap();
        ids.insert(video.id);
    }
    let user = h
        .service
        .create_user(NewUser::new("b@example.com", "B", "pw"))
        .await
        .unwrap();
    h.service.open_session(&user.id).await.unwrap();
    let patch = SiteConfigPatch {
        site_name: Some("Restored Shop".to_string()),
        crypto: Some(vec!["btc:xyz".to_string()]),
        ..Default::default()
    };
    let config = h.service.update_site_config(patch).await.unwrap();

    let receipt = h.service.backup().await.unwrap();
    assert!(receipt.backup_key.starts_with("metadata/backup-"));
    assert_eq!(receipt.videos, 3);
    assert!(h.dir.path().join("data").join("backup.json").exists());

    let pointer = h.objects.get(BUCKET, LATEST_BACKUP_KEY).await.unwrap().unwrap();
    let pointer: LatestBackupPointer = serde_json::from_slice(&pointer).unwrap();
    assert_eq!(pointer.backup_key, receipt.backup_key);
    assert_eq!(pointer.version, "1.0");

    h.service.mirror().clear_all().await.unwrap();
    assert!(h.service.get_all_videos().await.unwrap().is_empty());

    let summary = h.service.restore_latest().await.unwrap();
    assert_eq!(summary.videos, 3);

    let restored: HashSet<String> = h
        .service
        .get_all_videos()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(restored, ids);
    assert_eq!(h.service.get_all_users().await.unwrap().len(), 1);
    assert_eq!(h.service.get_all_sessions().await.unwrap().len(), 1);
    assert_eq!(h.service.get_site_config().await.unwrap(), config);

    let counts = h.service.stats().await.unwrap();
    assert_eq!(counts.videos, 3);
    assert_eq!(counts.site_config, 1);
}

#[tokio::test]
async fn test_restore_latest_without_backup() {
    let h = harness(BackendKind::Document).await;
    let err = h.service.restore_latest().await.unwrap_err();
    assert!(matches!(err, AppError::BackupNotFound));
}

#[tokio::test]
async fn test_restore_with_dangling_pointer() {
    let h = harness(BackendKind::Document).await;
    let pointer = serde_json::json!({
        "backupKey": "metadata/backup-1.json",
        "backupDate": "2024-01-01T00:00:00Z",
        "version": "1.0"
    });
    h.objects
        .put(
            BUCKET,
            LATEST_BACKUP_KEY,
            Bytes::from(pointer.to_string()),
            "application/json",
        )
        .await
        .unwrap();

    let err = h.service.restore_latest().await.unwrap_err();
    assert!(matches!(err, AppError::BackupNotFound));
}

#[tokio::test]
async fn test_document_backend_restore_updates_both_stores() {
    let h = harness(BackendKind::Document).await;
    for title in ["Kept", "Also Kept"] {
        h.service
            .create_video(NewVideo::new(title, 1.0, VideoDuration::Seconds(30)))
            .await
            .unwrap();
    }
    h.service.backup().await.unwrap();

    let videos = h.service.get_all_videos().await.unwrap();
    h.service.delete_video(&videos[0].id).await.unwrap();
    assert_eq!(h.service.get_all_videos().await.unwrap().len(), 1);

    h.service.restore_latest().await.unwrap();
    assert_eq!(h.service.get_all_videos().await.unwrap().len(), 2);
    assert_eq!(h.service.mirror().export_videos().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_backup_status_tracks_document() {
    let h = harness(BackendKind::Document).await;

    let status = h.service.backup_status().await.unwrap();
    assert!(!status.has_backup);
    assert_eq!(status.metadata_key, document_key());

    h.service.create_video(demo_video()).await.unwrap();
    assert!(h.service.backup_status().await.unwrap().has_backup);
}

#[tokio::test]
async fn test_auto_backup_writes_local_snapshot() {
    let h = harness_with(BackendKind::Relational, |o| o.auto_backup = true).await;
    let path = h.dir.path().join("data").join("backup.json");
    assert!(!path.exists());

    let video = h.service.create_video(demo_video()).await.unwrap();
    let raw = std::fs::read(&path).unwrap();
    let bundle: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(bundle["videos"][0]["id"], video.id.as_str());
    assert_eq!(bundle["version"], "1.0");
}

#[tokio::test]
async fn test_auto_backup_failure_is_swallowed() {
    // A directory where the backup file should go makes the write fail
    let blocked = TempDir::new().unwrap();
    let path = blocked.path().join("backup.json");
    std::fs::create_dir_all(&path).unwrap();

    let h = harness_with(BackendKind::Relational, |o| {
        o.auto_backup = true;
        o.backup_path = path;
    })
    .await;

    let video = h.service.create_video(demo_video()).await.unwrap();
    assert!(h.service.get_video(&video.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_backends_share_contract() {
    let h = harness(BackendKind::Document).await;
    let backends: [&dyn MetadataBackend; 2] = [h.service.document(), h.service.mirror()];

    for backend in backends {
        let video = backend.create_video(demo_video()).await.unwrap();
        assert_eq!(backend.get_video(&video.id).await.unwrap(), Some(video.clone()));
        assert!(backend.delete_video(&video.id).await.unwrap());
        assert!(!backend.delete_video(&video.id).await.unwrap());
    }
}
