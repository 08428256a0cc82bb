use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_DATASET, DEFAULT_IO_TIMEOUT_SECS,
    DEFAULT_SESSION_TTL_HOURS, DEFAULT_SIGNED_URL_TTL_SECS,
};
use crate::document::{DocumentStoreOptions, LoadFailurePolicy, WriteMode};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub allowed_origins: Vec<String>,
    /// SQLite file backing the relational mirror
    pub database_path: String,
    /// Filesystem root of the object store
    pub object_store_root: PathBuf,
    /// Public base URL used in signed object links
    pub object_store_url: String,
    pub bucket: String,
    pub dataset: String,
    pub backend: BackendKind,
    pub cache_ttl_secs: u64,
    pub io_timeout_secs: u64,
    pub load_failure_policy: LoadFailurePolicy,
    pub write_mode: WriteMode,
    pub backup_path: PathBuf,
    pub auto_backup: bool,
    pub url_signing_secret: String,
    pub admin_secret_key: Option<String>,
    pub signed_url_ttl_secs: u64,
    pub session_ttl_hours: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/catalog.db".to_string());

        let object_store_root = env::var("OBJECT_STORE_ROOT")
            .unwrap_or_else(|_| "./data/objects".to_string())
            .into();

        let object_store_url = env::var("OBJECT_STORE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", server_port));

        let bucket = env::var("BUCKET").unwrap_or_else(|_| "videosplus".to_string());
        let dataset = env::var("DATASET").unwrap_or_else(|_| DEFAULT_DATASET.to_string());

        let backend = env::var("BACKEND")
            .unwrap_or_else(|_| "document".to_string())
            .parse()
            .map_err(|_| "Invalid BACKEND (expected document or relational)")?;

        let cache_ttl_secs = env::var("CACHE_TTL_SECS")
            .unwrap_or_else(|_| DEFAULT_CACHE_TTL_SECS.to_string())
            .parse()
            .map_err(|_| "Invalid CACHE_TTL_SECS")?;

        let io_timeout_secs = env::var("IO_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_IO_TIMEOUT_SECS.to_string())
            .parse()
            .map_err(|_| "Invalid IO_TIMEOUT_SECS")?;

        let load_failure_policy = env::var("LOAD_FAILURE_POLICY")
            .unwrap_or_else(|_| "surface".to_string())
            .parse()
            .map_err(|_| "Invalid LOAD_FAILURE_POLICY (expected fallback or surface)")?;

        let write_mode = env::var("WRITE_MODE")
            .unwrap_or_else(|_| "last-writer-wins".to_string())
            .parse()
            .map_err(|_| "Invalid WRITE_MODE (expected last-writer-wins or optimistic)")?;

        let backup_path = env::var("BACKUP_PATH")
            .unwrap_or_else(|_| "./data/backup.json".to_string())
            .into();

        let auto_backup = env::var("AUTO_BACKUP")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .map_err(|_| "Invalid AUTO_BACKUP (expected true or false)")?;

        let url_signing_secret = env::var("URL_SIGNING_SECRET")
            .map_err(|_| "URL_SIGNING_SECRET must be set for signed object URLs")?;

        let admin_secret_key = env::var("ADMIN_SECRET_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        let signed_url_ttl_secs = env::var("SIGNED_URL_TTL_SECS")
            .unwrap_or_else(|_| DEFAULT_SIGNED_URL_TTL_SECS.to_string())
            .parse()
            .map_err(|_| "Invalid SIGNED_URL_TTL_SECS")?;

        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .unwrap_or_else(|_| DEFAULT_SESSION_TTL_HOURS.to_string())
            .parse()
            .map_err(|_| "Invalid SESSION_TTL_HOURS")?;

        Ok(Config {
            server_host,
            server_port,
            environment,
            allowed_origins,
            database_path,
            object_store_root,
            object_store_url,
            bucket,
            dataset,
            backend,
            cache_ttl_secs,
            io_timeout_secs,
            load_failure_policy,
            write_mode,
            backup_path,
            auto_backup,
            url_signing_secret,
            admin_secret_key,
            signed_url_ttl_secs,
            session_ttl_hours,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Document store settings derived from this configuration
    pub fn document_options(&self) -> DocumentStoreOptions {
        DocumentStoreOptions {
            bucket: self.bucket.clone(),
            dataset: self.dataset.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            io_timeout: Duration::from_secs(self.io_timeout_secs),
            load_failure: self.load_failure_policy,
            write_mode: self.write_mode,
        }
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }
}
