use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::{error::Result, AppState};

use super::validation::check_admin_key;

/// Query parameters for admin stats endpoint
#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    /// Admin secret key for authentication
    pub key: String,
}

/// Mirror statistics response
#[derive(Debug, Serialize)]
pub struct AdminStatsResponse {
    pub backend: &'static str,
    pub video_count: i64,
    pub user_count: i64,
    pub session_count: i64,
    pub has_site_config: bool,
    pub database_size_bytes: u64,
    pub database_size_human: String,
}

/// Format bytes into human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Admin stats endpoint
///
/// Row counts of the relational mirror plus its file size. Disabled unless
/// an admin secret key is configured.
///
/// GET /admin/stats?key=<admin_secret_key>
pub async fn admin_stats(
    State(state): State<AppState>,
    Query(params): Query<AdminQuery>,
) -> Result<Json<AdminStatsResponse>> {
    check_admin_key(&state.config, Some(&params.key), true)?;

    let database_size_bytes = fs::metadata(&state.config.database_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let counts = state.service.stats().await?;

    tracing::info!(
        "Admin stats requested: {} videos, {} users, {} database",
        counts.videos,
        counts.users,
        format_bytes(database_size_bytes)
    );

    Ok(Json(AdminStatsResponse {
        backend: state.service.backend_name(),
        video_count: counts.videos,
        user_count: counts.users,
        session_count: counts.sessions,
        has_site_config: counts.site_config > 0,
        database_size_bytes,
        database_size_human: format_bytes(database_size_bytes),
    }))
}
