//! In-process object store
//!
//! Useful for ephemeral deployments and for exercising the metadata layer:
//! it counts calls, records deletions, and can be told to fail or stall.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{validate_key, ObjectStore};
use crate::error::{AppError, Result};

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    deleted: Mutex<Vec<(String, String)>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
    fail_gets: AtomicBool,
    fail_puts: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls served so far
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `put` calls served so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Every `(bucket, key)` passed to `delete`, in call order
    pub fn deleted_keys(&self) -> Vec<(String, String)> {
        lock(&self.deleted).clone()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        lock(&self.objects).contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Make every following `get` fail until reset
    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Make every following `put` fail until reset
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Delay applied to every call
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    async fn simulate_io(&self) {
        let latency = *lock(&self.latency);
        match latency {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.simulate_io().await;

        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(AppError::ObjectStore(format!("get {}/{} refused", bucket, key)));
        }

        Ok(lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes, _content_type: &str) -> Result<()> {
        validate_key(key)?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.simulate_io().await;

        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::ObjectStore(format!("put {}/{} refused", bucket, key)));
        }

        lock(&self.objects).insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.simulate_io().await;

        lock(&self.deleted).push((bucket.to_string(), key.to_string()));
        lock(&self.objects).remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn signed_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        validate_key(key)?;
        Ok(format!("memory://{}/{}?ttl={}", bucket, key, ttl.as_secs()))
    }
}
