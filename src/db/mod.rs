//! # Relational mirror
//!
//! Local SQLite copy of the catalog entities. Serves reads when it is the
//! authoritative backend and is the source and target of backup/restore.

pub mod pool;

pub use pool::create_pool;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::backend::MetadataBackend;
use crate::constants::SITE_CONFIG_ID;
use crate::error::{AppError, Result};
use crate::models::{
    NewSession, NewUser, NewVideo, Session, SessionPatch, SiteConfig, SiteConfigPatch, User,
    UserPatch, Video, VideoDuration, VideoPatch,
};
use crate::security::generate_id;

const VIDEO_COLUMNS: &str = "id, title, description, price, duration, video_file_id, \
     thumbnail_file_id, thumbnail_url, product_link, views, is_active, is_purchased, created_at";

const USER_COLUMNS: &str = "id, email, name, password, created_at";

const SESSION_COLUMNS: &str = "id, user_id, token, expires_at, created_at, is_active";

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub videos: i64,
    pub users: i64,
    pub sessions: i64,
    pub site_config: i64,
}

pub struct RelationalMirror {
    pool: SqlitePool,
}

impl RelationalMirror {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database file and wrap it
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Restore support
    // -------------------------------------------------------------------------

    /// Insert a video as-is, keeping its id, counters and timestamps
    pub async fn insert_video(&self, video: &Video) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO videos (id, title, description, price, duration, video_file_id, \
             thumbnail_file_id, thumbnail_url, product_link, views, is_active, is_purchased, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&video.id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(video.price)
        .bind(video.duration.to_stored())
        .bind(&video.video_file_id)
        .bind(&video.thumbnail_file_id)
        .bind(&video.thumbnail_url)
        .bind(&video.product_link)
        .bind(counter_to_sql(video.views))
        .bind(video.is_active)
        .bind(video.is_purchased)
        .bind(video.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a user as-is. An id or email (any case) already present is a
    /// `Conflict`, never a silent replacement.
    pub async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, name, password, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password)
        .bind(user.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!("User {} ({}) collides with an existing user", user.id, user.email)
            })
        })?;
        Ok(())
    }

    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token, expires_at, created_at, is_active) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || format!("Session {} collides with an existing session", session.id))
        })?;
        Ok(())
    }

    /// Overwrite the site configuration singleton
    pub async fn replace_site_config(&self, config: &SiteConfig) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO site_config (id, site_name, paypal_client_id, \
             paypal_me_username, stripe_publishable_key, stripe_secret_key, telegram_username, \
             video_list_title, crypto, email_host, email_port, email_secure, email_user, \
             email_pass, email_from, wasabi_config, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(SITE_CONFIG_ID)
        .bind(&config.site_name)
        .bind(&config.paypal_client_id)
        .bind(&config.paypal_me_username)
        .bind(&config.stripe_publishable_key)
        .bind(&config.stripe_secret_key)
        .bind(&config.telegram_username)
        .bind(&config.video_list_title)
        .bind(serde_json::to_string(&config.crypto)?)
        .bind(&config.email_host)
        .bind(&config.email_port)
        .bind(config.email_secure)
        .bind(&config.email_user)
        .bind(&config.email_pass)
        .bind(&config.email_from)
        .bind(serde_json::to_string(&config.wasabi_config)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Empty every table
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for table in ["sessions", "videos", "users", "site_config"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!("Cleared all mirror tables");
        Ok(())
    }

    /// Every video, inactive ones included, newest first
    pub async fn export_videos(&self) -> Result<Vec<Video>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM videos ORDER BY created_at DESC",
            VIDEO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(video_from_row).collect()
    }

    pub async fn counts(&self) -> Result<TableCounts> {
        let row = sqlx::query(
            "SELECT \
             (SELECT COUNT(*) FROM videos) AS videos, \
             (SELECT COUNT(*) FROM users) AS users, \
             (SELECT COUNT(*) FROM sessions) AS sessions, \
             (SELECT COUNT(*) FROM site_config) AS site_config",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TableCounts {
            videos: row.try_get("videos")?,
            users: row.try_get("users")?,
            sessions: row.try_get("sessions")?,
            site_config: row.try_get("site_config")?,
        })
    }

    // -------------------------------------------------------------------------
    // Row writes shared by create and update
    // -------------------------------------------------------------------------

    async fn write_video(&self, video: &Video) -> Result<()> {
        sqlx::query(
            "UPDATE videos SET title = ?, description = ?, price = ?, duration = ?, \
             video_file_id = ?, thumbnail_file_id = ?, thumbnail_url = ?, product_link = ?, \
             views = ?, is_active = ?, is_purchased = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&video.title)
        .bind(&video.description)
        .bind(video.price)
        .bind(video.duration.to_stored())
        .bind(&video.video_file_id)
        .bind(&video.thumbnail_file_id)
        .bind(&video.thumbnail_url)
        .bind(&video.product_link)
        .bind(counter_to_sql(video.views))
        .bind(video.is_active)
        .bind(video.is_purchased)
        .bind(Utc::now())
        .bind(&video.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn email_owner(&self, email: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.try_get("id").map_err(AppError::from))
            .transpose()
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn counter_to_sql(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn video_from_row(row: &SqliteRow) -> Result<Video> {
    let views: i64 = row.try_get("views")?;
    let duration: String = row.try_get("duration")?;

    Ok(Video {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        duration: VideoDuration::from_stored(&duration),
        video_file_id: row.try_get("video_file_id")?,
        thumbnail_file_id: row.try_get("thumbnail_file_id")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        created_at: row.try_get("created_at")?,
        views: views.max(0) as u64,
        product_link: row.try_get("product_link")?,
        is_active: row.try_get("is_active")?,
        is_purchased: row.try_get("is_purchased")?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password: row.try_get("password")?,
        created_at: row.try_get("created_at")?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token: row.try_get("token")?,
        expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        is_active: row.try_get("is_active")?,
    })
}

/// JSON columns fall back to their defaults when absent or malformed
fn site_config_from_row(row: &SqliteRow) -> Result<SiteConfig> {
    let crypto: Option<String> = row.try_get("crypto")?;
    let wasabi_config: Option<String> = row.try_get("wasabi_config")?;

    Ok(SiteConfig {
        site_name: row.try_get("site_name")?,
        paypal_client_id: row.try_get("paypal_client_id")?,
        paypal_me_username: row.try_get("paypal_me_username")?,
        stripe_publishable_key: row.try_get("stripe_publishable_key")?,
        stripe_secret_key: row.try_get("stripe_secret_key")?,
        telegram_username: row.try_get("telegram_username")?,
        video_list_title: row.try_get("video_list_title")?,
        crypto: crypto
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default(),
        email_host: row.try_get("email_host")?,
        email_port: row.try_get("email_port")?,
        email_secure: row.try_get("email_secure")?,
        email_user: row.try_get("email_user")?,
        email_pass: row.try_get("email_pass")?,
        email_from: row.try_get("email_from")?,
        wasabi_config: wasabi_config
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default(),
    })
}

/// Turn unique constraint violations into `Conflict`
fn unique_violation(e: sqlx::Error, message: impl FnOnce() -> String) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message()),
        _ => e.into(),
    }
}

// =============================================================================
// Entity operations
// =============================================================================

#[async_trait]
impl MetadataBackend for RelationalMirror {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Relational mirror schema is up to date");
        Ok(())
    }

    /// Active videos only, newest first
    async fn get_all_videos(&self) -> Result<Vec<Video>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM videos WHERE is_active = 1 ORDER BY created_at DESC",
            VIDEO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(video_from_row).collect()
    }

    async fn get_video(&self, id: &str) -> Result<Option<Video>> {
        let row = sqlx::query(&format!("SELECT {} FROM videos WHERE id = ?", VIDEO_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(video_from_row).transpose()
    }

    async fn create_video(&self, video: NewVideo) -> Result<Video> {
        video.validate()?;
        let video = Video::from_new(generate_id(), Utc::now(), video);
        self.insert_video(&video).await?;
        debug!("Inserted video {}", video.id);
        Ok(video)
    }

    async fn update_video(&self, id: &str, patch: VideoPatch) -> Result<Option<Video>> {
        patch.validate()?;
        let Some(mut video) = self.get_video(id).await? else {
            return Ok(None);
        };

        patch.apply(&mut video);
        self.write_video(&video).await?;
        Ok(Some(video))
    }

    async fn delete_video(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_video_views(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE videos SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_all_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        user.validate()?;
        let user = User::from_new(generate_id(), Utc::now(), user);

        sqlx::query(
            "INSERT INTO users (id, email, name, password, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password)
        .bind(user.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || format!("A user with email {} already exists", user.email))
        })?;

        Ok(user)
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>> {
        patch.validate()?;
        let Some(mut user) = self.get_user(id).await? else {
            return Ok(None);
        };

        if let Some(email) = &patch.email {
            if matches!(self.email_owner(email).await?, Some(owner) if owner != id) {
                return Err(AppError::Conflict(format!(
                    "A user with email {} already exists",
                    email
                )));
            }
        }

        patch.apply(&mut user);
        sqlx::query("UPDATE users SET email = ?, name = ?, password = ?, updated_at = ? WHERE id = ?")
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password)
            .bind(Utc::now())
            .bind(&user.id)
            .execute(&self.pool)
            .await?;

        Ok(Some(user))
    }

    async fn delete_user(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sessions ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }

    async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sessions WHERE token = ? AND is_active = 1",
            SESSION_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn create_session(&self, session: NewSession) -> Result<Session> {
        session.validate()?;
        let session = Session::from_new(generate_id(), Utc::now(), session);

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token, expires_at, created_at, is_active) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || "Session token already in use".to_string()))?;

        Ok(session)
    }

    async fn update_session(&self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        let Some(mut session) = self.get_session(id).await? else {
            return Ok(None);
        };

        patch.apply(&mut session);
        sqlx::query("UPDATE sessions SET expires_at = ?, is_active = ? WHERE id = ?")
            .bind(session.expires_at)
            .bind(session.is_active)
            .bind(&session.id)
            .execute(&self.pool)
            .await?;

        Ok(Some(session))
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_site_config(&self) -> Result<Option<SiteConfig>> {
        let row = sqlx::query("SELECT * FROM site_config WHERE id = ?")
            .bind(SITE_CONFIG_ID)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(site_config_from_row).transpose()
    }

    async fn update_site_config(&self, patch: SiteConfigPatch) -> Result<SiteConfig> {
        let mut config = self.get_site_config().await?.unwrap_or_default();
        patch.apply(&mut config);
        self.replace_site_config(&config).await?;
        Ok(config)
    }
}
