//! Object storage port
//!
//! The metadata layer only needs four opaque operations against a
//! bucket + key address space. Provider request signing and the wire
//! protocol live behind implementations of [`ObjectStore`].

pub mod local;
pub mod memory;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Bucket + key storage contract
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when the key does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>>;

    /// Create or overwrite an object.
    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Remove an object. Deleting a missing key is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Time-limited download URL for an object.
    async fn signed_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String>;
}

/// Run an object store call under a deadline
///
/// `what` describes the call for the `Timeout` error, e.g. "loading media/a.json".
pub async fn bounded<T>(
    limit: Duration,
    what: impl FnOnce() -> String,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(format!("{} (limit {:?})", what(), limit))),
    }
}

/// Reject keys that could escape the bucket namespace
pub fn validate_key(key: &str) -> Result<()> {
    let escapes = key
        .split('/')
        .any(|segment| segment == ".." || segment == ".");

    if key.is_empty() || key.starts_with('/') || key.contains('\\') || escapes {
        return Err(AppError::InvalidInput(format!("Invalid object key: {}", key)));
    }
    Ok(())
}
