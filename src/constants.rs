/// Prefix shared by every metadata object in the bucket
pub const METADATA_PREFIX: &str = "metadata";

/// Default dataset name, the live document lives at `metadata/<dataset>.json`
pub const DEFAULT_DATASET: &str = "videosplus-data";

/// Pointer object naming the most recent remote backup
pub const LATEST_BACKUP_KEY: &str = "metadata/latest-backup.json";

/// Format version stamped on every backup bundle
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Content type used for every JSON object written to the store
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// How long a loaded document is served from cache (30 seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Upper bound for a single object store call
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 15;

/// Fixed primary key of the site configuration singleton
pub const SITE_CONFIG_ID: &str = "site-config";

/// Sessions opened by login expire after 24 hours
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Random bytes in a session token (hex encoded to 64 chars)
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Signed download links stay valid for one hour
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;

/// Length of each random base-36 segment in a generated id
pub const ID_SEGMENT_LEN: usize = 11;

/// Default page size for catalog listings
pub const DEFAULT_PAGE_SIZE: usize = 12;

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for a video without a title
pub const ERR_EMPTY_TITLE: &str = "Video title must not be empty";

/// Error message for a negative or non-finite price
pub const ERR_INVALID_PRICE: &str = "Video price must be a non-negative number";

/// Error message for a malformed email address
pub const ERR_INVALID_EMAIL: &str = "User email must be a valid address";

/// Error message for a user without a name
pub const ERR_EMPTY_NAME: &str = "User name must not be empty";

/// Error message for a session without a token or owner
pub const ERR_INVALID_SESSION: &str = "Session requires a user id and a token";

/// Error message for a backup bundle without a videos collection
pub const ERR_BUNDLE_MISSING_VIDEOS: &str = "Backup bundle must contain a videos array";
