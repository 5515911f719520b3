//! Store-specific models.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Metadata for a file uploaded to the local blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Unique blob identifier.
    pub id: Uuid,
    /// Bucket the blob was uploaded to.
    pub bucket: String,
    /// Path inside the bucket.
    pub path: String,
    /// File size in bytes.
    pub size: i64,
    /// BLAKE3 content hash (hex string).
    pub blake3_hash: String,
    /// MIME type supplied by the uploader.
    pub content_type: String,
    /// When the blob was uploaded.
    pub created_at: DateTime<Utc>,
}
