//! # Metadata service
//!
//! Typed entry point used by the HTTP layer and by embedding code. Entity
//! calls go to the authoritative backend picked at construction; backup,
//! restore and object links are coordinated here.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::backend::{BackendKind, MetadataBackend};
use crate::backup::{BackupCoordinator, RestoreSummary, RestoreTarget};
use crate::config::Config;
use crate::constants::{
    BACKUP_FORMAT_VERSION, DEFAULT_PAGE_SIZE, DEFAULT_SESSION_TTL_HOURS,
    DEFAULT_SIGNED_URL_TTL_SECS, JSON_CONTENT_TYPE, LATEST_BACKUP_KEY,
};
use crate::db::{RelationalMirror, TableCounts};
use crate::document::DocumentStore;
use crate::error::{AppError, Result};
use crate::models::{
    BackupBundle, LatestBackupPointer, NewSession, NewUser, NewVideo, Session, SessionPatch,
    SiteConfig, SiteConfigPatch, User, UserPatch, Video, VideoDuration, VideoPatch,
};
use crate::object_store::{bounded, ObjectStore};
use crate::security::{generate_session_token, PasswordHasher, Sha256PasswordHasher};

// =============================================================================
// Options and result types
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub backend: BackendKind,
    pub auto_backup: bool,
    pub backup_path: PathBuf,
    pub session_ttl: chrono::Duration,
    pub signed_url_ttl: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::Document,
            auto_backup: false,
            backup_path: PathBuf::from("./data/backup.json"),
            session_ttl: chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            signed_url_ttl: Duration::from_secs(DEFAULT_SIGNED_URL_TTL_SECS),
        }
    }
}

/// Catalog listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOption {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    ViewsDesc,
    DurationDesc,
}

impl FromStr for SortOption {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "newest" => Ok(SortOption::Newest),
            "price_asc" => Ok(SortOption::PriceAsc),
            "price_desc" => Ok(SortOption::PriceDesc),
            "views_desc" => Ok(SortOption::ViewsDesc),
            "duration_desc" => Ok(SortOption::DurationDesc),
            other => Err(format!("Unknown sort option: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoQuery {
    /// Case-insensitive match on title or description
    pub search: Option<String>,
    pub sort: SortOption,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
}

impl Default for VideoQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort: SortOption::Newest,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPage {
    pub videos: Vec<Video>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

/// Outcome of a remote backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReceipt {
    pub backup_key: String,
    pub backup_date: DateTime<Utc>,
    pub version: String,
    pub videos: usize,
    pub users: usize,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    pub has_backup: bool,
    pub metadata_key: String,
}

// =============================================================================
// Service
// =============================================================================

pub struct MetadataService {
    backend: Arc<dyn MetadataBackend>,
    document: Arc<DocumentStore>,
    mirror: Arc<RelationalMirror>,
    objects: Arc<dyn ObjectStore>,
    coordinator: BackupCoordinator,
    hasher: Arc<dyn PasswordHasher>,
    options: ServiceOptions,
}

impl MetadataService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        document: Arc<DocumentStore>,
        mirror: Arc<RelationalMirror>,
        options: ServiceOptions,
    ) -> Self {
        let backend: Arc<dyn MetadataBackend> = match options.backend {
            BackendKind::Document => document.clone(),
            BackendKind::Relational => mirror.clone(),
        };
        let coordinator =
            BackupCoordinator::new(mirror.clone(), document.clone(), options.backup_path.clone());

        Self {
            backend,
            document,
            mirror,
            objects,
            coordinator,
            hasher: Arc::new(Sha256PasswordHasher),
            options,
        }
    }

    /// Wire every component from configuration. Call `initialize` before use.
    pub async fn from_config(config: &Config, objects: Arc<dyn ObjectStore>) -> Result<Self> {
        let mirror = Arc::new(RelationalMirror::connect(&config.database_path).await?);
        let document = Arc::new(DocumentStore::new(objects.clone(), config.document_options()));

        let options = ServiceOptions {
            backend: config.backend,
            auto_backup: config.auto_backup,
            backup_path: config.backup_path.clone(),
            session_ttl: chrono::Duration::hours(config.session_ttl_hours),
            signed_url_ttl: config.signed_url_ttl(),
        };

        Ok(Self::new(objects, document, mirror, options))
    }

    /// Swap the password hashing strategy
    pub fn with_password_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Apply the mirror schema and check the authoritative backend
    pub async fn initialize(&self) -> Result<()> {
        self.mirror.initialize().await?;
        if self.options.backend == BackendKind::Document {
            self.document.initialize().await?;
        }
        info!("Metadata service ready ({} backend)", self.backend.name());
        Ok(())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn document(&self) -> &DocumentStore {
        &self.document
    }

    pub fn mirror(&self) -> &RelationalMirror {
        &self.mirror
    }

    fn bucket(&self) -> &str {
        self.document.bucket()
    }

    fn io_timeout(&self) -> Duration {
        self.document.options().io_timeout
    }

    // -------------------------------------------------------------------------
    // Videos
    // -------------------------------------------------------------------------

    pub async fn get_all_videos(&self) -> Result<Vec<Video>> {
        self.backend.get_all_videos().await
    }

    /// Active videos filtered, sorted and paginated
    pub async fn list_videos(&self, query: &VideoQuery) -> Result<VideoPage> {
        let mut videos: Vec<Video> = self
            .backend
            .get_all_videos()
            .await?
            .into_iter()
            .filter(|video| video.is_active)
            .collect();

        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            videos.retain(|video| {
                video.title.to_lowercase().contains(&term)
                    || video.description.to_lowercase().contains(&term)
            });
        }

        videos.sort_by(|a, b| compare_videos(query.sort, a, b));

        let page_size = query.page_size.max(1);
        let total = videos.len();
        let total_pages = total.div_ceil(page_size);
        let page = query.page.max(1);
        let offset = (page - 1).saturating_mul(page_size);

        let videos = videos.into_iter().skip(offset).take(page_size).collect();

        Ok(VideoPage {
            videos,
            total,
            page,
            total_pages,
        })
    }

    pub async fn get_video(&self, id: &str) -> Result<Option<Video>> {
        self.backend.get_video(id).await
    }

    /// Create a video; a duration given in seconds is stored as clock text
    pub async fn create_video(&self, mut video: NewVideo) -> Result<Video> {
        video.duration = normalize_duration(video.duration);
        let video = self.backend.create_video(video).await?;
        info!("Created video {} ({})", video.id, video.title);
        self.auto_backup().await;
        Ok(video)
    }

    pub async fn update_video(&self, id: &str, mut patch: VideoPatch) -> Result<Option<Video>> {
        patch.duration = patch.duration.map(normalize_duration);
        let video = self.backend.update_video(id, patch).await?;
        if video.is_some() {
            self.auto_backup().await;
        }
        Ok(video)
    }

    /// Remove the record, then its video and thumbnail objects
    ///
    /// Object deletion failures are logged; the record stays deleted.
    pub async fn delete_video(&self, id: &str) -> Result<bool> {
        let Some(video) = self.backend.get_video(id).await? else {
            return Ok(false);
        };

        if !self.backend.delete_video(id).await? {
            return Ok(false);
        }
        info!("Deleted video {}", id);

        let mut keys = video.file_keys();
        keys.dedup();
        for key in keys {
            let what = || format!("deleting {}/{}", self.bucket(), key);
            let delete = self.objects.delete(self.bucket(), key);
            if let Err(e) = bounded(self.io_timeout(), what, delete).await {
                warn!("Failed to delete object {} of video {}: {}", key, id, e);
            }
        }

        self.auto_backup().await;
        Ok(true)
    }

    pub async fn increment_video_views(&self, id: &str) -> Result<bool> {
        self.backend.increment_video_views(id).await
    }

    /// Time-limited download link for a video's file
    pub async fn video_file_url(&self, id: &str) -> Result<Option<String>> {
        let Some(video) = self.backend.get_video(id).await? else {
            return Ok(None);
        };
        if video.video_file_id.trim().is_empty() {
            return Ok(None);
        }

        let url = self
            .objects
            .signed_url(self.bucket(), &video.video_file_id, self.options.signed_url_ttl)
            .await?;
        Ok(Some(url))
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    pub async fn get_all_users(&self) -> Result<Vec<User>> {
        self.backend.get_all_users().await
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.backend.get_user(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.backend.get_user_by_email(email).await
    }

    /// Create a user from a plaintext password
    pub async fn create_user(&self, mut user: NewUser) -> Result<User> {
        user.password = self.hasher.hash(&user.password);
        self.backend.create_user(user).await
    }

    /// A password in the patch is plaintext and gets hashed
    pub async fn update_user(&self, id: &str, mut patch: UserPatch) -> Result<Option<User>> {
        patch.password = patch.password.map(|password| self.hasher.hash(&password));
        self.backend.update_user(id, patch).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<bool> {
        self.backend.delete_user(id).await
    }

    /// The user owning `email` if `password` matches the stored digest
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let user = self.backend.get_user_by_email(email).await?;
        Ok(user.filter(|user| self.hasher.verify(password, &user.password)))
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    pub async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        self.backend.get_all_sessions().await
    }

    pub async fn create_session(&self, session: NewSession) -> Result<Session> {
        self.backend.create_session(session).await
    }

    /// Start a session with a fresh random token
    pub async fn open_session(&self, user_id: &str) -> Result<Session> {
        let expires_at = Utc::now() + self.options.session_ttl;
        let session = NewSession::new(user_id, generate_session_token(), expires_at);
        self.backend.create_session(session).await
    }

    pub async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        self.backend.get_session_by_token(token).await
    }

    /// The session behind `token` if it is active and unexpired.
    /// An active but expired session is deactivated on the way.
    pub async fn validate_session(&self, token: &str) -> Result<Option<Session>> {
        let Some(session) = self.backend.get_session_by_token(token).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if session.needs_deactivation(now) {
            info!("Session {} expired, deactivating", session.id);
            self.backend
                .update_session(&session.id, SessionPatch::deactivate())
                .await?;
            return Ok(None);
        }

        Ok(Some(session).filter(|session| session.is_valid_at(now)))
    }

    pub async fn update_session(&self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        self.backend.update_session(id, patch).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<bool> {
        self.backend.delete_session(id).await
    }

    /// Logout: deactivate the session, keep the record
    pub async fn revoke_session(&self, token: &str) -> Result<bool> {
        let Some(session) = self.backend.get_session_by_token(token).await? else {
            return Ok(false);
        };
        let updated = self
            .backend
            .update_session(&session.id, SessionPatch::deactivate())
            .await?;
        Ok(updated.is_some())
    }

    // -------------------------------------------------------------------------
    // Site configuration
    // -------------------------------------------------------------------------

    /// Stored configuration, or the defaults when none was saved yet
    pub async fn get_site_config(&self) -> Result<SiteConfig> {
        Ok(self.backend.get_site_config().await?.unwrap_or_default())
    }

    pub async fn update_site_config(&self, patch: SiteConfigPatch) -> Result<SiteConfig> {
        self.backend.update_site_config(patch).await
    }

    // -------------------------------------------------------------------------
    // Backup / restore
    // -------------------------------------------------------------------------

    /// Local snapshot of the authoritative data
    async fn snapshot(&self) -> Result<BackupBundle> {
        match self.options.backend {
            BackendKind::Relational => self.coordinator.backup().await,
            BackendKind::Document => {
                let dataset = self.document.fetch_dataset().await?;
                self.coordinator.backup_dataset(&dataset).await
            }
        }
    }

    async fn auto_backup(&self) {
        if !self.options.auto_backup {
            return;
        }
        if let Err(e) = self.snapshot().await {
            warn!("Automatic backup failed: {}", e);
        }
    }

    async fn put_json(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let what = || format!("uploading {}/{}", self.bucket(), key);
        let put = self
            .objects
            .put(self.bucket(), key, Bytes::from(body), JSON_CONTENT_TYPE);
        bounded(self.io_timeout(), what, put).await
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>> {
        let what = || format!("downloading {}/{}", self.bucket(), key);
        let get = self.objects.get(self.bucket(), key);
        bounded(self.io_timeout(), what, get).await
    }

    /// Snapshot, upload as `metadata/backup-<millis>.json`, then move the
    /// `latest-backup` pointer to it
    pub async fn backup(&self) -> Result<BackupReceipt> {
        let bundle = self.snapshot().await?;
        let backup_date = bundle.backup_date.unwrap_or_else(Utc::now);
        let version = bundle
            .version
            .clone()
            .unwrap_or_else(|| BACKUP_FORMAT_VERSION.to_string());
        let backup_key = BackupBundle::object_key(backup_date);

        self.put_json(&backup_key, serde_json::to_vec_pretty(&bundle)?)
            .await?;

        let pointer = LatestBackupPointer {
            backup_key: backup_key.clone(),
            backup_date,
            version: version.clone(),
        };
        self.put_json(LATEST_BACKUP_KEY, serde_json::to_vec_pretty(&pointer)?)
            .await?;

        info!("Uploaded backup {}", backup_key);
        Ok(BackupReceipt {
            backup_key,
            backup_date,
            version,
            videos: bundle.videos.len(),
            users: bundle.users.len(),
            sessions: bundle.sessions.len(),
        })
    }

    /// Where restores land: the mirror alone when it is authoritative,
    /// otherwise both stores
    pub fn restore_target(&self) -> RestoreTarget {
        match self.options.backend {
            BackendKind::Relational => RestoreTarget::Mirror,
            BackendKind::Document => RestoreTarget::Both,
        }
    }

    pub async fn restore(&self, bundle: &BackupBundle) -> Result<RestoreSummary> {
        self.coordinator.restore(bundle, self.restore_target()).await
    }

    /// Restore the bundle named by `metadata/latest-backup.json`
    pub async fn restore_latest(&self) -> Result<RestoreSummary> {
        let pointer = self
            .get_object(LATEST_BACKUP_KEY)
            .await?
            .ok_or(AppError::BackupNotFound)?;
        let pointer: LatestBackupPointer = serde_json::from_slice(&pointer)
            .map_err(|e| AppError::InvalidBackup(format!("latest backup pointer: {}", e)))?;

        let body = self
            .get_object(&pointer.backup_key)
            .await?
            .ok_or(AppError::BackupNotFound)?;
        let bundle = BackupCoordinator::parse_bundle(&body)?;

        info!("Restoring backup {} from {}", pointer.backup_key, pointer.backup_date);
        self.restore(&bundle).await
    }

    /// Whether the live metadata document exists in the bucket
    pub async fn backup_status(&self) -> Result<BackupStatus> {
        Ok(BackupStatus {
            has_backup: self.document.exists().await?,
            metadata_key: self.document.document_key().to_string(),
        })
    }

    /// Row counts of the relational mirror
    pub async fn stats(&self) -> Result<TableCounts> {
        self.mirror.counts().await
    }
}

fn normalize_duration(duration: VideoDuration) -> VideoDuration {
    match duration {
        VideoDuration::Seconds(_) => duration.normalized(),
        clock => clock,
    }
}

fn compare_videos(sort: SortOption, a: &Video, b: &Video) -> Ordering {
    match sort {
        SortOption::Newest => b.created_at.cmp(&a.created_at),
        SortOption::PriceAsc => a.price.total_cmp(&b.price),
        SortOption::PriceDesc => b.price.total_cmp(&a.price),
        SortOption::ViewsDesc => b.views.cmp(&a.views),
        SortOption::DurationDesc => {
            let seconds = |video: &Video| video.duration.total_seconds().unwrap_or(0);
            seconds(b).cmp(&seconds(a))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(title: &str, price: f64, views: u64, duration: &str, age_hours: i64) -> Video {
        let mut video = Video::from_new(
            title.to_lowercase(),
            Utc::now() - chrono::Duration::hours(age_hours),
            NewVideo::new(title, price, VideoDuration::Clock(duration.to_string())),
        );
        video.views = views;
        video
    }

    fn titles(mut videos: Vec<Video>, sort: SortOption) -> Vec<String> {
        videos.sort_by(|a, b| compare_videos(sort, a, b));
        videos.into_iter().map(|v| v.title).collect()
    }

    #[test]
    fn test_sort_options() {
        let videos = vec![
            video("Short", 5.0, 10, "00:30", 3),
            video("Long", 1.0, 2, "01:00:00", 1),
            video("Mid", 9.0, 50, "10:00", 2),
        ];

        assert_eq!(titles(videos.clone(), SortOption::Newest), ["Long", "Mid", "Short"]);
        assert_eq!(titles(videos.clone(), SortOption::PriceAsc), ["Long", "Short", "Mid"]);
        assert_eq!(titles(videos.clone(), SortOption::PriceDesc), ["Mid", "Short", "Long"]);
        assert_eq!(titles(videos.clone(), SortOption::ViewsDesc), ["Mid", "Short", "Long"]);
        assert_eq!(titles(videos, SortOption::DurationDesc), ["Long", "Mid", "Short"]);
    }

    #[test]
    fn test_unparsable_duration_sorts_last() {
        let videos = vec![
            video("Huge", 1.0, 0, "9999999999999999:00:00", 1),
            video("Short", 1.0, 0, "00:30", 2),
        ];
        assert_eq!(titles(videos, SortOption::DurationDesc), ["Short", "Huge"]);
    }

    #[test]
    fn test_sort_option_parse() {
        assert_eq!("price_desc".parse::<SortOption>(), Ok(SortOption::PriceDesc));
        assert!("cheapest".parse::<SortOption>().is_err());
    }

    #[test]
    fn test_normalize_duration() {
        assert_eq!(
            normalize_duration(VideoDuration::Seconds(125)),
            VideoDuration::Clock("02:05".to_string())
        );
        assert_eq!(
            normalize_duration(VideoDuration::Seconds(3725)),
            VideoDuration::Clock("01:02:05".to_string())
        );
        assert_eq!(
            normalize_duration(VideoDuration::Clock("4:07".to_string())),
            VideoDuration::Clock("4:07".to_string())
        );
    }
}
