use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::constants::JSON_CONTENT_TYPE;
use crate::error::{AppError, Result};
use crate::object_store::ObjectStore;
use crate::AppState;

use super::validation::validate_object_request;

#[derive(Debug, Deserialize)]
pub struct SignedObjectParams {
    pub expires: i64,
    pub signature: String,
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("json") => JSON_CONTENT_TYPE,
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Serve an object through a signed, expiring link
///
/// GET /api/objects/:bucket/*key?expires=<unix>&signature=<hex>
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<SignedObjectParams>,
) -> Result<impl IntoResponse> {
    validate_object_request(
        &bucket,
        &key,
        params.expires,
        &params.signature,
        &state.config.url_signing_secret,
    )?;

    let body = state
        .objects
        .get(&bucket, &key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No object at {}/{}", bucket, key)))?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&key))], body))
}
