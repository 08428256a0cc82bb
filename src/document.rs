//! # Metadata document store
//!
//! The whole catalog lives in one JSON object at `metadata/<dataset>.json`.
//! Reads are served from a short-lived in-process cache; every mutation
//! re-reads the document, applies its change and writes the full document
//! back.
//!
//! Two knobs control failure and concurrency behavior:
//!
//! - [`LoadFailurePolicy`]: whether an unreadable document degrades reads to
//!   the empty dataset or surfaces as [`AppError::StoreUnavailable`].
//!   Mutations never proceed from a failed read, so an outage cannot
//!   overwrite the remote catalog with an empty one.
//! - [`WriteMode`]: last-writer-wins, or an optimistic check that the
//!   document is unchanged since it was read before writing it back.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::MetadataBackend;
use crate::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_DATASET, DEFAULT_IO_TIMEOUT_SECS, JSON_CONTENT_TYPE,
    METADATA_PREFIX,
};
use crate::error::{AppError, Result};
use crate::models::{
    Dataset, NewSession, NewUser, NewVideo, Session, SessionPatch, SiteConfig, SiteConfigPatch,
    User, UserPatch, Video, VideoPatch,
};
use crate::object_store::{bounded, ObjectStore};
use crate::security::{generate_id, sha256_hex};

// =============================================================================
// Options
// =============================================================================

/// What reads do when the remote document cannot be fetched or parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadFailurePolicy {
    /// Serve the empty default dataset and log a warning
    Fallback,
    /// Return `StoreUnavailable` to the caller
    #[default]
    Surface,
}

impl FromStr for LoadFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(LoadFailurePolicy::Fallback),
            "surface" => Ok(LoadFailurePolicy::Surface),
            other => Err(format!("Unknown load failure policy: {}", other)),
        }
    }
}

/// How a mutation writes the document back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Overwrite unconditionally; concurrent mutations may lose updates
    #[default]
    LastWriterWins,
    /// Re-check the document fingerprint before writing and fail with
    /// `Conflict` when another writer got there first
    Optimistic,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-writer-wins" | "lww" => Ok(WriteMode::LastWriterWins),
            "optimistic" => Ok(WriteMode::Optimistic),
            other => Err(format!("Unknown write mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStoreOptions {
    pub bucket: String,
    /// Dataset name; the document key is `metadata/<dataset>.json`
    pub dataset: String,
    pub cache_ttl: Duration,
    /// Upper bound for every object store call
    pub io_timeout: Duration,
    pub load_failure: LoadFailurePolicy,
    pub write_mode: WriteMode,
}

impl DocumentStoreOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            dataset: DEFAULT_DATASET.to_string(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            io_timeout: Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS),
            load_failure: LoadFailurePolicy::default(),
            write_mode: WriteMode::default(),
        }
    }

    pub fn document_key(&self) -> String {
        format!("{}/{}.json", METADATA_PREFIX, self.dataset)
    }
}

// =============================================================================
// Store
// =============================================================================

struct CachedDocument {
    dataset: Arc<Dataset>,
    loaded_at: Instant,
}

/// Dataset as read from the bucket, with the fingerprint of its raw bytes.
/// `fingerprint` is `None` when the object did not exist.
struct Snapshot {
    dataset: Dataset,
    fingerprint: Option<String>,
}

/// Result of a mutation closure: persist the dataset or leave it untouched
enum Change<T> {
    Write(T),
    Skip(T),
}

pub struct DocumentStore {
    objects: Arc<dyn ObjectStore>,
    options: DocumentStoreOptions,
    key: String,
    cache: Mutex<Option<CachedDocument>>,
}

impl DocumentStore {
    pub fn new(objects: Arc<dyn ObjectStore>, options: DocumentStoreOptions) -> Self {
        let key = options.document_key();
        Self {
            objects,
            options,
            key,
            cache: Mutex::new(None),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.options.bucket
    }

    pub fn document_key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &DocumentStoreOptions {
        &self.options
    }

    // -------------------------------------------------------------------------
    // Cache
    // -------------------------------------------------------------------------

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<CachedDocument>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached(&self) -> Option<Arc<Dataset>> {
        let cache = self.cache();
        cache
            .as_ref()
            .filter(|entry| entry.loaded_at.elapsed() < self.options.cache_ttl)
            .map(|entry| entry.dataset.clone())
    }

    fn remember(&self, dataset: Arc<Dataset>) {
        *self.cache() = Some(CachedDocument {
            dataset,
            loaded_at: Instant::now(),
        });
    }

    /// Drop the cached document so the next read goes to the bucket
    pub fn invalidate_cache(&self) {
        *self.cache() = None;
    }

    // -------------------------------------------------------------------------
    // Raw I/O
    // -------------------------------------------------------------------------

    async fn fetch_raw(&self) -> Result<Option<Bytes>> {
        bounded(
            self.options.io_timeout,
            || format!("loading {}/{}", self.options.bucket, self.key),
            self.objects.get(&self.options.bucket, &self.key),
        )
        .await
    }

    /// Fetch and parse the document, bypassing the cache.
    ///
    /// A missing object is the empty dataset. Any other failure, including an
    /// unparseable body, is reported as `StoreUnavailable` or `Timeout`.
    async fn read_snapshot(&self) -> Result<Snapshot> {
        let body = self.fetch_raw().await.map_err(unavailable)?;

        match body {
            None => {
                info!(
                    "No metadata document at {}/{}, starting from an empty dataset",
                    self.options.bucket, self.key
                );
                Ok(Snapshot {
                    dataset: Dataset::default(),
                    fingerprint: None,
                })
            }
            Some(body) => {
                let dataset: Dataset = serde_json::from_slice(&body).map_err(|e| {
                    AppError::StoreUnavailable(format!(
                        "metadata document {} is not valid: {}",
                        self.key, e
                    ))
                })?;
                Ok(Snapshot {
                    dataset,
                    fingerprint: Some(sha256_hex(&body)),
                })
            }
        }
    }

    /// Serialize and upload the dataset.
    ///
    /// `expected` carries the fingerprint observed when the dataset was read;
    /// in optimistic mode the write is refused if the remote has moved on.
    async fn write(
        &self,
        dataset: Dataset,
        expected: Option<&Option<String>>,
    ) -> Result<Arc<Dataset>> {
        let body = serde_json::to_vec_pretty(&dataset)?;

        if let (WriteMode::Optimistic, Some(expected)) = (self.options.write_mode, expected) {
            let current = self
                .fetch_raw()
                .await
                .map_err(unavailable)?
                .map(|raw| sha256_hex(&raw));

            if &current != expected {
                self.invalidate_cache();
                warn!("Metadata document {} changed during a mutation", self.key);
                return Err(AppError::Conflict(format!(
                    "metadata document {} was modified concurrently",
                    self.key
                )));
            }
        }

        let size = body.len();
        let put = self.objects.put(
            &self.options.bucket,
            &self.key,
            Bytes::from(body),
            JSON_CONTENT_TYPE,
        );

        let what = || format!("saving {}/{}", self.options.bucket, self.key);
        if let Err(e) = bounded(self.options.io_timeout, what, put).await {
            self.invalidate_cache();
            warn!("Failed to save metadata document {}: {}", self.key, e);
            return Err(e);
        }

        debug!("Saved metadata document {} ({} bytes)", self.key, size);
        let dataset = Arc::new(dataset);
        self.remember(dataset.clone());
        Ok(dataset)
    }

    // -------------------------------------------------------------------------
    // Read / write core
    // -------------------------------------------------------------------------

    /// Current dataset, served from cache while it is fresh
    pub async fn dataset(&self) -> Result<Arc<Dataset>> {
        if let Some(dataset) = self.cached() {
            debug!("Using cached metadata document");
            return Ok(dataset);
        }
        self.load().await
    }

    /// Fetch the document from the bucket and refresh the cache
    pub async fn load(&self) -> Result<Arc<Dataset>> {
        let dataset = match self.read_snapshot().await {
            Ok(snapshot) => snapshot.dataset,
            Err(e) => match self.options.load_failure {
                LoadFailurePolicy::Fallback => {
                    warn!("Serving empty dataset, metadata load failed: {}", e);
                    Dataset::default()
                }
                LoadFailurePolicy::Surface => {
                    self.invalidate_cache();
                    return Err(e);
                }
            },
        };

        let dataset = Arc::new(dataset);
        self.remember(dataset.clone());
        Ok(dataset)
    }

    /// Fresh copy of the remote document. Failures always surface,
    /// whatever the load policy.
    pub async fn fetch_dataset(&self) -> Result<Dataset> {
        Ok(self.read_snapshot().await?.dataset)
    }

    /// Overwrite the remote document with `dataset`
    pub async fn save(&self, dataset: Dataset) -> Result<Arc<Dataset>> {
        self.write(dataset, None).await
    }

    /// Replace every collection at once (used by restore)
    pub async fn replace_all(&self, dataset: Dataset) -> Result<()> {
        self.save(dataset).await?;
        info!("Replaced metadata document {}", self.key);
        Ok(())
    }

    /// Whether the document object exists in the bucket
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.fetch_raw().await?.is_some())
    }

    /// Fresh read, apply `change`, write back when the closure asks for it.
    ///
    /// A failed read aborts the mutation under either load policy.
    async fn mutate<T>(
        &self,
        operation: &str,
        change: impl FnOnce(&mut Dataset) -> Result<Change<T>>,
    ) -> Result<T> {
        let Snapshot {
            mut dataset,
            fingerprint,
        } = match self.read_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.invalidate_cache();
                warn!("Aborting {}: {}", operation, e);
                return Err(e);
            }
        };

        match change(&mut dataset)? {
            Change::Write(value) => {
                self.write(dataset, Some(&fingerprint)).await?;
                debug!("{} persisted", operation);
                Ok(value)
            }
            Change::Skip(value) => {
                self.remember(Arc::new(dataset));
                Ok(value)
            }
        }
    }
}

fn unavailable(e: AppError) -> AppError {
    match e {
        AppError::Timeout(_) | AppError::StoreUnavailable(_) => e,
        other => AppError::StoreUnavailable(other.to_string()),
    }
}

/// Random id not yet used in a collection
fn fresh_id(taken: impl Fn(&str) -> bool) -> String {
    loop {
        let id = generate_id();
        if !taken(&id) {
            return id;
        }
    }
}

// =============================================================================
// Entity operations
// =============================================================================

#[async_trait]
impl MetadataBackend for DocumentStore {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn initialize(&self) -> Result<()> {
        // Connectivity check; a missing document is fine
        let dataset = self.load().await?;
        info!(
            "Metadata document {}/{} ready ({} videos, {} users)",
            self.options.bucket,
            self.key,
            dataset.videos.len(),
            dataset.users.len()
        );
        Ok(())
    }

    async fn get_all_videos(&self) -> Result<Vec<Video>> {
        Ok(self.dataset().await?.videos.clone())
    }

    async fn get_video(&self, id: &str) -> Result<Option<Video>> {
        let dataset = self.dataset().await?;
        Ok(dataset.videos.iter().find(|video| video.id == id).cloned())
    }

    async fn create_video(&self, video: NewVideo) -> Result<Video> {
        video.validate()?;
        self.mutate("create video", |dataset| {
            let id = fresh_id(|id| dataset.videos.iter().any(|v| v.id == id));
            let video = Video::from_new(id, Utc::now(), video);
            dataset.videos.push(video.clone());
            Ok(Change::Write(video))
        })
        .await
    }

    async fn update_video(&self, id: &str, patch: VideoPatch) -> Result<Option<Video>> {
        patch.validate()?;
        self.mutate("update video", |dataset| {
            Ok(match dataset.video_mut(id) {
                Some(video) => {
                    patch.apply(video);
                    Change::Write(Some(video.clone()))
                }
                None => Change::Skip(None),
            })
        })
        .await
    }

    async fn delete_video(&self, id: &str) -> Result<bool> {
        self.mutate("delete video", |dataset| {
            Ok(if dataset.remove_video(id) {
                Change::Write(true)
            } else {
                Change::Skip(false)
            })
        })
        .await
    }

    async fn increment_video_views(&self, id: &str) -> Result<bool> {
        self.mutate("increment views", |dataset| {
            Ok(match dataset.video_mut(id) {
                Some(video) => {
                    video.views += 1;
                    Change::Write(true)
                }
                None => Change::Skip(false),
            })
        })
        .await
    }

    async fn get_all_users(&self) -> Result<Vec<User>> {
        Ok(self.dataset().await?.users.clone())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let dataset = self.dataset().await?;
        Ok(dataset.users.iter().find(|user| user.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let dataset = self.dataset().await?;
        Ok(dataset
            .users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        user.validate()?;
        self.mutate("create user", |dataset| {
            if dataset.email_taken(&user.email, None) {
                return Err(AppError::Conflict(format!(
                    "A user with email {} already exists",
                    user.email
                )));
            }
            let id = fresh_id(|id| dataset.users.iter().any(|u| u.id == id));
            let user = User::from_new(id, Utc::now(), user);
            dataset.users.push(user.clone());
            Ok(Change::Write(user))
        })
        .await
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>> {
        patch.validate()?;
        self.mutate("update user", |dataset| {
            if let Some(email) = &patch.email {
                if dataset.email_taken(email, Some(id)) {
                    return Err(AppError::Conflict(format!(
                        "A user with email {} already exists",
                        email
                    )));
                }
            }
            Ok(match dataset.user_mut(id) {
                Some(user) => {
                    patch.apply(user);
                    Change::Write(Some(user.clone()))
                }
                None => Change::Skip(None),
            })
        })
        .await
    }

    async fn delete_user(&self, id: &str) -> Result<bool> {
        self.mutate("delete user", |dataset| {
            Ok(if dataset.remove_user(id) {
                Change::Write(true)
            } else {
                Change::Skip(false)
            })
        })
        .await
    }

    async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.dataset().await?.sessions.clone())
    }

    async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let dataset = self.dataset().await?;
        Ok(dataset
            .sessions
            .iter()
            .find(|session| session.token == token && session.is_active)
            .cloned())
    }

    async fn create_session(&self, session: NewSession) -> Result<Session> {
        session.validate()?;
        self.mutate("create session", |dataset| {
            if dataset.token_taken(&session.token) {
                return Err(AppError::Conflict("Session token already in use".to_string()));
            }
            let id = fresh_id(|id| dataset.sessions.iter().any(|s| s.id == id));
            let session = Session::from_new(id, Utc::now(), session);
            dataset.sessions.push(session.clone());
            Ok(Change::Write(session))
        })
        .await
    }

    async fn update_session(&self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        self.mutate("update session", |dataset| {
            Ok(match dataset.session_mut(id) {
                Some(session) => {
                    patch.apply(session);
                    Change::Write(Some(session.clone()))
                }
                None => Change::Skip(None),
            })
        })
        .await
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        self.mutate("delete session", |dataset| {
            Ok(if dataset.remove_session(id) {
                Change::Write(true)
            } else {
                Change::Skip(false)
            })
        })
        .await
    }

    async fn get_site_config(&self) -> Result<Option<SiteConfig>> {
        Ok(Some(self.dataset().await?.site_config.clone()))
    }

    async fn update_site_config(&self, patch: SiteConfigPatch) -> Result<SiteConfig> {
        self.mutate("update site config", |dataset| {
            patch.apply(&mut dataset.site_config);
            Ok(Change::Write(dataset.site_config.clone()))
        })
        .await
    }
}
