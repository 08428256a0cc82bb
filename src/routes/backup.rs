use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backup::BackupCoordinator;
use crate::error::Result;
use crate::service::BackupStatus;
use crate::AppState;

use super::validation::{admin_key_from_headers, check_admin_key};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResponse {
    pub success: bool,
    pub backup_key: String,
    pub backup_date: DateTime<Utc>,
    pub videos: usize,
    pub users: usize,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResponse {
    pub success: bool,
    pub videos: usize,
    pub users: usize,
    pub sessions: usize,
}

/// Snapshot the catalog and upload it to the bucket
///
/// POST /api/backup
pub async fn create_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BackupResponse>> {
    check_admin_key(&state.config, admin_key_from_headers(&headers), false)?;

    let receipt = state.service.backup().await?;

    Ok(Json(BackupResponse {
        success: true,
        backup_key: receipt.backup_key,
        backup_date: receipt.backup_date,
        videos: receipt.videos,
        users: receipt.users,
        sessions: receipt.sessions,
    }))
}

/// Restore the catalog
///
/// With an empty body the most recent remote backup is restored; otherwise
/// the body must be a backup bundle.
///
/// POST /api/restore
pub async fn restore_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RestoreResponse>> {
    check_admin_key(&state.config, admin_key_from_headers(&headers), false)?;

    let summary = if body.iter().all(u8::is_ascii_whitespace) {
        state.service.restore_latest().await?
    } else {
        let bundle = BackupCoordinator::parse_bundle(&body)?;
        state.service.restore(&bundle).await?
    };

    Ok(Json(RestoreResponse {
        success: true,
        videos: summary.videos,
        users: summary.users,
        sessions: summary.sessions,
    }))
}

/// Whether the live metadata document exists
///
/// GET /api/backup/status
pub async fn backup_status(State(state): State<AppState>) -> Result<Json<BackupStatus>> {
    Ok(Json(state.service.backup_status().await?))
}
