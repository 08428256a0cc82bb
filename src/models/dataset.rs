use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Session, SiteConfig, User, Video};

/// The whole metadata document: every collection plus the site config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub videos: Vec<Video>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub site_config: SiteConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Dataset {
    pub fn video_mut(&mut self, id: &str) -> Option<&mut Video> {
        self.videos.iter_mut().find(|video| video.id == id)
    }

    pub fn user_mut(&mut self, id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|user| user.id == id)
    }

    pub fn session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| session.id == id)
    }

    /// Splice a video out; false when the id is unknown
    pub fn remove_video(&mut self, id: &str) -> bool {
        remove_by(&mut self.videos, |video| video.id == id)
    }

    pub fn remove_user(&mut self, id: &str) -> bool {
        remove_by(&mut self.users, |user| user.id == id)
    }

    pub fn remove_session(&mut self, id: &str) -> bool {
        remove_by(&mut self.sessions, |session| session.id == id)
    }

    pub fn email_taken(&self, email: &str, except_id: Option<&str>) -> bool {
        self.users
            .iter()
            .any(|user| user.email.eq_ignore_ascii_case(email) && Some(user.id.as_str()) != except_id)
    }

    pub fn token_taken(&self, token: &str) -> bool {
        self.sessions.iter().any(|session| session.token == token)
    }
}

fn remove_by<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> bool {
    match items.iter().position(matches) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}
