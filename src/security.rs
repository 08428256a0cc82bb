use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::constants::{ID_SEGMENT_LEN, SESSION_TOKEN_BYTES};

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Identifiers
// =============================================================================

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate an entity id: two random base-36 segments concatenated
///
/// Uniqueness is probabilistic only. With ~113 bits of randomness collisions
/// are negligible for a single catalog, but the ids are not meant to be
/// unguessable credentials.
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    let mut id = String::with_capacity(ID_SEGMENT_LEN * 2);

    for _ in 0..2 {
        for _ in 0..ID_SEGMENT_LEN {
            let index = rng.random_range(0..BASE36_ALPHABET.len());
            id.push(BASE36_ALPHABET[index] as char);
        }
    }

    id
}

/// Generate a bearer token for a session (64 hex characters)
pub fn generate_session_token() -> String {
    let bytes: [u8; SESSION_TOKEN_BYTES] = rand::rng().random();
    hex::encode(bytes)
}

// =============================================================================
// Password Hashing
// =============================================================================

/// Strategy used to turn a plaintext password into the stored digest
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> String;

    fn verify(&self, password: &str, stored: &str) -> bool {
        constant_time_eq(self.hash(password).as_bytes(), stored.as_bytes())
    }
}

/// Unsalted single-round SHA-256, hex encoded
///
/// Weak by modern standards. Kept as the default because existing user
/// records were written with it; swap the hasher to migrate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256PasswordHasher;

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> String {
        sha256_hex(password.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// SHA-256 of arbitrary bytes as lowercase hex
///
/// Also used as the document fingerprint for optimistic writes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// =============================================================================
// Signed Object URLs
// =============================================================================

/// Payload covered by an object URL signature
fn signing_payload(bucket: &str, key: &str, expires: i64) -> String {
    format!("{}/{}:{}", bucket, key, expires)
}

/// HMAC-SHA256 signature for an object download link
pub fn sign_object(bucket: &str, key: &str, expires: i64, secret: &str) -> String {
    // HMAC accepts keys of any length, so construction cannot fail here
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(signing_payload(bucket, key, expires).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify HMAC-SHA256 signature
pub fn verify_hmac(data: &str, signature: &str, secret: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            tracing::error!("Failed to create HMAC instance");
            return false;
        }
    };

    mac.update(data.as_bytes());

    let sig_bytes = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::warn!("Invalid hex signature format");
            return false;
        }
    };

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Check a signed object link: signature must match and `expires` lie ahead of `now`
pub fn verify_object_signature(
    bucket: &str,
    key: &str,
    expires: i64,
    signature: &str,
    secret: &str,
    now: i64,
) -> bool {
    if expires <= now {
        tracing::warn!("Signed URL expired {} seconds ago", now - expires);
        return false;
    }

    verify_hmac(&signing_payload(bucket, key, expires), signature, secret)
}
