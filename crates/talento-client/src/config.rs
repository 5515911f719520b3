//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so a local session starts with zero
//! configuration.

use std::path::PathBuf;

use talento_shared::constants::{DEFAULT_MEDIA_BUCKET, SWIPE_BATCH_LIMIT};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// SQLite database file of the local backend.
    /// Env: `TALENTO_DB_PATH`
    /// Default: `None` (platform data directory).
    pub db_path: Option<PathBuf>,

    /// Directory holding uploaded blobs.
    /// Env: `TALENTO_BLOB_DIR`
    /// Default: `./blobs`
    pub blob_dir: PathBuf,

    /// Base URL blobs are served under.
    /// Env: `TALENTO_BLOB_BASE_URL`
    /// Default: `http://localhost:8080/storage`
    pub blob_base_url: String,

    /// Bucket receiving chat attachments.
    /// Env: `TALENTO_MEDIA_BUCKET`
    /// Default: `chat-media`
    pub media_bucket: String,

    /// Cards fetched per swipe queue load (1..=20).
    /// Env: `TALENTO_SWIPE_BATCH`
    /// Default: `20`
    pub swipe_batch: usize,

    /// Cards per day shown as a full progress bar.
    /// Env: `TALENTO_DAILY_GOAL`
    /// Default: `30`
    pub daily_goal: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            blob_dir: PathBuf::from("./blobs"),
            blob_base_url: "http://localhost:8080/storage".to_string(),
            media_bucket: DEFAULT_MEDIA_BUCKET.to_string(),
            swipe_batch: SWIPE_BATCH_LIMIT,
            daily_goal: 30,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("TALENTO_DB_PATH").filter(|p| !p.is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(dir) = lookup("TALENTO_BLOB_DIR") {
            config.blob_dir = PathBuf::from(dir);
        }

        if let Some(url) = lookup("TALENTO_BLOB_BASE_URL") {
            config.blob_base_url = url;
        }

        if let Some(bucket) = lookup("TALENTO_MEDIA_BUCKET").filter(|b| !b.is_empty()) {
            config.media_bucket = bucket;
        }

        if let Some(val) = lookup("TALENTO_SWIPE_BATCH") {
            match val.parse::<usize>() {
                Ok(n) if (1..=SWIPE_BATCH_LIMIT).contains(&n) => config.swipe_batch = n,
                _ => tracing::warn!(
                    value = %val,
                    max = SWIPE_BATCH_LIMIT,
                    "Invalid TALENTO_SWIPE_BATCH, using default"
                ),
            }
        }

        if let Some(val) = lookup("TALENTO_DAILY_GOAL") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.daily_goal = n,
                _ => tracing::warn!(value = %val, "Invalid TALENTO_DAILY_GOAL, using default"),
            }
        }

        config
    }
}
