//! # Backup / restore coordinator
//!
//! Snapshots the relational mirror into a [`BackupBundle`] written to a local
//! file, and replays bundles into the mirror, the document store, or both.
//!
//! Restores are not atomic. A failure part way through leaves the target
//! partially restored; take a fresh snapshot before restoring.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

use crate::backend::MetadataBackend;
use crate::constants::BACKUP_FORMAT_VERSION;
use crate::db::RelationalMirror;
use crate::document::DocumentStore;
use crate::error::Result;
use crate::models::{BackupBundle, Dataset};

/// Where a restore writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreTarget {
    Mirror,
    Document,
    Both,
}

impl RestoreTarget {
    fn includes_mirror(self) -> bool {
        matches!(self, RestoreTarget::Mirror | RestoreTarget::Both)
    }

    fn includes_document(self) -> bool {
        matches!(self, RestoreTarget::Document | RestoreTarget::Both)
    }
}

/// What a restore replayed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub videos: usize,
    pub users: usize,
    pub sessions: usize,
}

pub struct BackupCoordinator {
    mirror: Arc<RelationalMirror>,
    document: Arc<DocumentStore>,
    local_path: PathBuf,
}

impl BackupCoordinator {
    pub fn new(
        mirror: Arc<RelationalMirror>,
        document: Arc<DocumentStore>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mirror,
            document,
            local_path: local_path.into(),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Decode and validate a bundle from raw JSON
    pub fn parse_bundle(bytes: &[u8]) -> Result<BackupBundle> {
        BackupBundle::from_slice(bytes)
    }

    /// Snapshot the mirror and write it to the local backup file
    pub async fn backup(&self) -> Result<BackupBundle> {
        let bundle = BackupBundle {
            videos: self.mirror.export_videos().await?,
            users: self.mirror.get_all_users().await?,
            sessions: self.mirror.get_all_sessions().await?,
            site_config: self.mirror.get_site_config().await?,
            backup_date: Some(Utc::now()),
            version: Some(BACKUP_FORMAT_VERSION.to_string()),
        };

        self.write_local(&bundle).await?;
        Ok(bundle)
    }

    /// Stamp an in-memory dataset as a bundle and write it to the local file
    pub async fn backup_dataset(&self, dataset: &Dataset) -> Result<BackupBundle> {
        let bundle = BackupBundle {
            videos: dataset.videos.clone(),
            users: dataset.users.clone(),
            sessions: dataset.sessions.clone(),
            site_config: Some(dataset.site_config.clone()),
            backup_date: Some(Utc::now()),
            version: Some(BACKUP_FORMAT_VERSION.to_string()),
        };

        self.write_local(&bundle).await?;
        Ok(bundle)
    }

    async fn write_local(&self, bundle: &BackupBundle) -> Result<()> {
        if let Some(parent) = self.local_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let body = serde_json::to_vec_pretty(bundle)?;
        fs::write(&self.local_path, body).await?;

        info!(
            "Backup written to {:?} ({} videos, {} users, {} sessions)",
            self.local_path,
            bundle.videos.len(),
            bundle.users.len(),
            bundle.sessions.len()
        );
        Ok(())
    }

    /// Replay a bundle into the chosen target(s)
    ///
    /// The mirror is cleared first and every record is inserted with its
    /// original id. The document store gets the whole bundle as its new
    /// document in a single write.
    pub async fn restore(
        &self,
        bundle: &BackupBundle,
        target: RestoreTarget,
    ) -> Result<RestoreSummary> {
        if target.includes_mirror() {
            self.restore_mirror(bundle).await?;
        }

        if target.includes_document() {
            let mut dataset = Dataset::from(bundle.clone());
            dataset.backup_date = None;
            dataset.version = None;
            self.document.replace_all(dataset).await?;
        }

        let summary = RestoreSummary {
            videos: bundle.videos.len(),
            users: bundle.users.len(),
            sessions: bundle.sessions.len(),
        };
        info!("Restore into {:?} complete: {:?}", target, summary);
        Ok(summary)
    }

    async fn restore_mirror(&self, bundle: &BackupBundle) -> Result<()> {
        self.mirror.clear_all().await?;

        for video in &bundle.videos {
            self.mirror.insert_video(video).await?;
        }
        for user in &bundle.users {
            self.mirror.insert_user(user).await?;
        }
        for session in &bundle.sessions {
            self.mirror.insert_session(session).await?;
        }
        if let Some(config) = &bundle.site_config {
            self.mirror.replace_site_config(config).await?;
        }

        Ok(())
    }
}
