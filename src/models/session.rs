use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::ERR_INVALID_SESSION;
use crate::error::{AppError, Result};

fn default_true() -> bool {
    true
}

/// Bearer session; revoked by clearing `is_active`, never by deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Session {
    pub fn from_new(id: String, created_at: DateTime<Utc>, new: NewSession) -> Self {
        Self {
            id,
            user_id: new.user_id,
            token: new.token,
            expires_at: new.expires_at,
            created_at,
            is_active: new.is_active,
        }
    }

    /// Active and not yet expired at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    /// Still flagged active although `expires_at` has passed
    pub fn needs_deactivation(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewSession {
    pub fn new(
        user_id: impl Into<String>,
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            expires_at,
            is_active: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() || self.token.trim().is_empty() {
            return Err(AppError::InvalidInput(ERR_INVALID_SESSION.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl SessionPatch {
    pub fn deactivate() -> Self {
        Self {
            is_active: Some(false),
            ..Default::default()
        }
    }

    pub fn apply(self, session: &mut Session) {
        if let Some(expires_at) = self.expires_at {
            session.expires_at = expires_at;
        }
        if let Some(is_active) = self.is_active {
            session.is_active = is_active;
        }
    }
}
