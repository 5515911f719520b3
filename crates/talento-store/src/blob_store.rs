//! Filesystem blob storage laid out as `<root>/<bucket>/<path>`.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// Validate a bucket-relative path and resolve it under `base`.
/// Rejects absolute paths, `..` segments and empty paths.
fn resolve_within(base: &Path, relative: &str) -> Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => {
                resolved.push(c);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::BlobPath(relative.to_string()));
            }
        }
    }

    if depth == 0 {
        return Err(StoreError::BlobPath(relative.to_string()));
    }
    Ok(resolved)
}

/// Write `data` through `out`, a freshly created `target`. On failure the
/// partial file is removed so the path stays free.
async fn fill_or_discard<W>(target: &Path, mut out: W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match out.write_all(data).await {
        Ok(()) => out.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(out);
        if let Err(cleanup) = fs::remove_file(target).await {
            warn!(path = %target.display(), error = %cleanup, "Failed to remove partial blob");
        }
        return Err(e.into());
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
    max_size: usize,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, base_url: impl Into<String>, max_size: usize) -> Self {
        Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL a stored blob is served under.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, path.trim_start_matches('/'))
    }

    /// Filesystem location of `bucket/path`, validated against traversal.
    pub fn blob_path(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == ".." {
            return Err(StoreError::BlobPath(bucket.to_string()));
        }
        resolve_within(&self.root.join(bucket), path)
    }

    /// Write a new blob. Fails if the target already exists.
    pub async fn write(&self, bucket: &str, path: &str, data: &[u8]) -> Result<PathBuf> {
        if data.is_empty() {
            return Err(StoreError::BlobPath(format!("{bucket}/{path}: empty blob")));
        }
        if data.len() > self.max_size {
            return Err(StoreError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let target = self.blob_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await?;
        fill_or_discard(&target, file, data).await?;

        debug!(bucket, path, size = data.len(), "Stored blob");
        Ok(target)
    }
}
