//! Catalog Metadata Server Library
//!
//! Persistence and synchronization for a video storefront's catalog
//! metadata: a remote JSON document store, a local SQLite mirror, and the
//! backup/restore path between them.

pub mod backend;
pub mod backup;
pub mod config;
pub mod constants;
pub mod db;
pub mod document;
pub mod error;
pub mod models;
pub mod object_store;
pub mod routes;
pub mod security;
pub mod service;

pub use backend::{BackendKind, MetadataBackend};
pub use config::Config;
pub use error::{AppError, Result};
pub use service::MetadataService;

use std::sync::Arc;

use object_store::ObjectStore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MetadataService>,
    pub objects: Arc<dyn ObjectStore>,
    pub config: Config,
}

impl AppState {
    /// Create a new AppState with the given service, object store and configuration
    pub fn new(
        service: Arc<MetadataService>,
        objects: Arc<dyn ObjectStore>,
        config: Config,
    ) -> Self {
        Self {
            service,
            objects,
            config,
        }
    }
}
