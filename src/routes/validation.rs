use axum::http::HeaderMap;

use crate::config::Config;
use crate::error::AppError;
use crate::security::verify_object_signature;

/// Header carrying the admin key on backup/restore requests
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Error type for signed object requests (constrained to only possible errors)
#[derive(Debug)]
pub enum SignedRequestError {
    InvalidSignature,
    Expired,
}

impl From<SignedRequestError> for AppError {
    fn from(err: SignedRequestError) -> Self {
        match err {
            SignedRequestError::InvalidSignature | SignedRequestError::Expired => {
                AppError::InvalidSignature
            }
        }
    }
}

/// Verify the signature and expiry of an object download link
pub fn validate_object_request(
    bucket: &str,
    key: &str,
    expires: i64,
    signature: &str,
    secret: &str,
) -> Result<(), SignedRequestError> {
    let now = chrono::Utc::now().timestamp();

    if expires <= now {
        tracing::warn!("Expired object link for {}/{}", bucket, key);
        return Err(SignedRequestError::Expired);
    }

    if !verify_object_signature(bucket, key, expires, signature, secret, now) {
        tracing::warn!("Invalid object link signature for {}/{}", bucket, key);
        return Err(SignedRequestError::InvalidSignature);
    }

    Ok(())
}

/// Check an admin key against the configured one
///
/// Without a configured key the check passes when `required` is false
/// (backup/restore) and fails when it is true (admin stats).
pub fn check_admin_key(
    config: &Config,
    provided: Option<&str>,
    required: bool,
) -> Result<(), AppError> {
    let Some(expected) = config.admin_secret_key.as_deref() else {
        return if required {
            Err(AppError::Unauthorized)
        } else {
            Ok(())
        };
    };

    match provided {
        Some(key) if key == expected => Ok(()),
        _ => {
            tracing::warn!("Invalid admin key attempt");
            Err(AppError::Unauthorized)
        }
    }
}

/// Admin key from the request headers, if any
pub fn admin_key_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
}
