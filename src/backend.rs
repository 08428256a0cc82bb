//! # Metadata backend port
//!
//! Both the remote document store and the local relational mirror serve the
//! same entity operations. The service layer holds one of them as the
//! authoritative backend, chosen by configuration.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::error::Result;
use crate::models::{
    NewSession, NewUser, NewVideo, Session, SessionPatch, SiteConfig, SiteConfigPatch, User,
    UserPatch, Video, VideoPatch,
};

/// Entity persistence contract shared by every backend.
///
/// Lookups by id return `Ok(None)` when nothing matches. Updates of unknown
/// ids return `Ok(None)` and write nothing; deletes of unknown ids return
/// `Ok(false)`.
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    /// Short name used in logs and health output
    fn name(&self) -> &'static str;

    /// Prepare the backend (schema, connectivity). Safe to call repeatedly.
    async fn initialize(&self) -> Result<()>;

    // Videos
    async fn get_all_videos(&self) -> Result<Vec<Video>>;
    async fn get_video(&self, id: &str) -> Result<Option<Video>>;
    async fn create_video(&self, video: NewVideo) -> Result<Video>;
    async fn update_video(&self, id: &str, patch: VideoPatch) -> Result<Option<Video>>;
    async fn delete_video(&self, id: &str) -> Result<bool>;
    async fn increment_video_views(&self, id: &str) -> Result<bool>;

    // Users
    async fn get_all_users(&self) -> Result<Vec<User>>;
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>>;
    async fn delete_user(&self, id: &str) -> Result<bool>;

    // Sessions
    async fn get_all_sessions(&self) -> Result<Vec<Session>>;
    /// Active sessions only
    async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>>;
    async fn create_session(&self, session: NewSession) -> Result<Session>;
    async fn update_session(&self, id: &str, patch: SessionPatch) -> Result<Option<Session>>;
    async fn delete_session(&self, id: &str) -> Result<bool>;

    // Site configuration
    async fn get_site_config(&self) -> Result<Option<SiteConfig>>;
    async fn update_site_config(&self, patch: SiteConfigPatch) -> Result<SiteConfig>;
}

/// Which backend a deployment treats as the source of truth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Document,
    Relational,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(BackendKind::Document),
            "relational" | "sqlite" => Ok(BackendKind::Relational),
            other => Err(format!("Unknown backend: {}", other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Document => write!(f, "document"),
            BackendKind::Relational => write!(f, "relational"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("document".parse::<BackendKind>(), Ok(BackendKind::Document));
        assert_eq!(" SQLite ".parse::<BackendKind>(), Ok(BackendKind::Relational));
        assert!("redis".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Relational.to_string(), "relational");
    }
}
