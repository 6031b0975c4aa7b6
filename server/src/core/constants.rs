//! Shared constants
//!
//! Single source for defaults, caps and key-format parameters.

// =============================================================================
// Server defaults
// =============================================================================

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3080;

// =============================================================================
// API keys
// =============================================================================

/// Public key prefix (identifies the key pair, stored in clear)
pub const PUBLIC_KEY_PREFIX: &str = "pk-lt-";
/// Secret key prefix (hashed at rest)
pub const SECRET_KEY_PREFIX: &str = "sk-lt-";
/// Random suffix length for generated keys
pub const SECRET_KEY_RANDOM_LENGTH: usize = 50;
/// Characters of the secret shown in the stored display form
pub const SECRET_KEY_DISPLAY_LEN: usize = 10;

// =============================================================================
// Ingestion
// =============================================================================

/// Default cap on events per ingestion batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;
/// Default end-to-end deadline for one ingestion request
pub const DEFAULT_INGESTION_DEADLINE_MS: u64 = 25_000;
/// Number of keyed-lock shards for per-entity serialization
pub const INGESTION_LOCK_SHARDS: usize = 1024;
/// Concurrent event-processing upper bound within a batch
pub const INGESTION_MAX_CONCURRENCY: usize = 32;
/// Maximum length of trace/observation/score names (bytes)
pub const MAX_NAME_LENGTH: usize = 1024;
/// Environment names must match `ENVIRONMENT_PATTERN` and not use this prefix
pub const RESERVED_ENVIRONMENT_PREFIX: &str = "lumitrace";
/// Environment name pattern
pub const ENVIRONMENT_PATTERN: &str = "^[a-z0-9_-]{1,40}$";
/// Environment applied when an event does not carry one
pub const DEFAULT_ENVIRONMENT: &str = "default";

// =============================================================================
// Media
// =============================================================================

/// Default maximum media payload size (1 GB)
pub const DEFAULT_MEDIA_MAX_CONTENT_LENGTH: u64 = 1_000_000_000;
/// Default lifetime of pre-signed upload URLs
pub const DEFAULT_MEDIA_UPLOAD_URL_EXPIRY_SECS: u64 = 3600;
/// Default lifetime of pre-signed download URLs
pub const DEFAULT_MEDIA_DOWNLOAD_URL_EXPIRY_SECS: u64 = 3600;

/// Content types accepted by the media side-channel
pub const MEDIA_CONTENT_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/webp",
    "image/gif",
    "image/svg+xml",
    "image/tiff",
    "image/bmp",
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/webm",
    "audio/ogg",
    "audio/oga",
    "audio/aac",
    "audio/mp4",
    "audio/flac",
    "video/mp4",
    "video/webm",
    "text/plain",
    "text/html",
    "text/css",
    "text/csv",
    "application/pdf",
    "application/msword",
    "application/vnd.ms-excel",
    "application/zip",
    "application/json",
    "application/octet-stream",
];

// =============================================================================
// Organization roles
// =============================================================================

pub const ORG_ROLE_OWNER: &str = "OWNER";
pub const ORG_ROLE_ADMIN: &str = "ADMIN";
pub const ORG_ROLE_MEMBER: &str = "MEMBER";
pub const ORG_ROLE_VIEWER: &str = "VIEWER";
