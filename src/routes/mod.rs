pub mod admin;
pub mod backup;
pub mod health;
pub mod objects;
pub mod validation;

pub use admin::admin_stats;
pub use backup::{backup_status, create_backup, restore_backup};
pub use health::health_check;
pub use objects::get_object;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// Every route of the service, without transport layers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/backup", post(create_backup))
        .route("/api/restore", post(restore_backup))
        .route("/api/backup/status", get(backup_status))
        .route("/api/objects/:bucket/*key", get(get_object))
        .route("/admin/stats", get(admin_stats))
        .with_state(state)
}
