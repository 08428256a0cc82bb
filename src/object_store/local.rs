//! Filesystem-backed object store
//!
//! Objects live at `<root>/<bucket>/<key>`. Download links point at the
//! server's `/api/objects` route and carry an HMAC signature with an expiry.

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

use super::{validate_key, ObjectStore};
use crate::error::{AppError, Result};
use crate::security::sign_object;

/// Everything but RFC 3986 unreserved characters is escaped in a path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub struct LocalObjectStore {
    /// Root directory holding one sub-directory per bucket
    root_path: PathBuf,
    /// Public URL prefix of the server (e.g. "http://localhost:8080")
    base_url: String,
    signing_secret: String,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, base_url: String, signing_secret: String) -> Self {
        Self {
            root_path: root,
            base_url: base_url.trim_end_matches('/').to_string(),
            signing_secret,
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_key(bucket)?;
        validate_key(key)?;

        let mut path = self.root_path.clone();
        path.push(bucket);
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>> {
        let path = self.object_path(bucket, key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes go to a sibling temp file first so readers never see a torn object.
    async fn put(&self, bucket: &str, key: &str, body: Bytes, _content_type: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_path = path.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        fs::write(&temp_path, &body).await?;
        fs::rename(&temp_path, &path).await?;

        tracing::debug!("Stored object {}/{} ({} bytes)", bucket, key, body.len());
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn signed_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        validate_key(bucket)?;
        validate_key(key)?;

        let expires = link_expiry(chrono::Utc::now().timestamp(), ttl)?;
        let signature = sign_object(bucket, key, expires, &self.signing_secret);

        Ok(format!(
            "{}/api/objects/{}/{}?expires={}&signature={}",
            self.base_url,
            encode_path(bucket),
            encode_path(key),
            expires,
            signature
        ))
    }
}

/// Unix time at which a link issued at `now` stops working
fn link_expiry(now: i64, ttl: Duration) -> Result<i64> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or_else(|| AppError::InvalidInput(format!("Signed URL TTL too large: {:?}", ttl)))
}

/// Percent-encode each `/`-separated segment, keeping the separators
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}
