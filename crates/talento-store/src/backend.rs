//! Local implementation of every collaborator service.
//!
//! [`LocalBackend`] persists records and settings in SQLite, stores blobs on
//! disk and fans row changes out to realtime subscribers in process. It backs
//! offline sessions and the test suites of the client crate.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use talento_shared::constants::MAX_ATTACHMENT_SIZE;
use talento_shared::service::{
    BlobStorage, ChangeEvent, ChangeKind, KeyValueStore, RealtimeService, RecordService,
    Subscription, SubscriptionId, SubscriptionSpec,
};
use talento_shared::{Predicate, Query, Record, ServiceError};

use crate::blob_store::LocalBlobStore;
use crate::database::Database;
use crate::error::StoreError;
use crate::models::StoredBlob;
use crate::realtime::RealtimeHub;

pub struct LocalBackend {
    db: Mutex<Database>,
    hub: RealtimeHub,
    blobs: LocalBlobStore,
}

impl LocalBackend {
    pub fn new(db: Database, blobs: LocalBlobStore) -> Self {
        Self {
            db: Mutex::new(db),
            hub: RealtimeHub::new(),
            blobs,
        }
    }

    /// Open a backend persisted at `db_path` with blobs under `blob_root`.
    pub fn open(
        db_path: &Path,
        blob_root: PathBuf,
        blob_base_url: &str,
    ) -> Result<Self, StoreError> {
        let db = Database::open_at(db_path)?;
        info!(
            db = %db_path.display(),
            blobs = %blob_root.display(),
            "Local backend opened"
        );
        Ok(Self::new(
            db,
            LocalBlobStore::new(blob_root, blob_base_url, MAX_ATTACHMENT_SIZE),
        ))
    }

    /// Ephemeral backend: in-memory database, blobs under `blob_root`.
    pub fn in_memory(blob_root: PathBuf) -> Result<Self, StoreError> {
        Ok(Self::new(
            Database::open_in_memory()?,
            LocalBlobStore::new(blob_root, "memory://blobs", MAX_ATTACHMENT_SIZE),
        ))
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, StoreError> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Run `f` against the database, mapping store errors to service errors.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, StoreError>,
    ) -> Result<T, ServiceError> {
        let db = self.db()?;
        Ok(f(&db)?)
    }

    pub fn blob_store(&self) -> &LocalBlobStore {
        &self.blobs
    }

    /// Number of live realtime subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.hub.len()
    }

    fn publish(&self, kind: ChangeKind, resource: &str, record: &Record) {
        let delivered = self.hub.publish(&ChangeEvent {
            kind,
            resource: resource.to_string(),
            record: record.clone(),
        });
        debug!(?kind, resource, delivered, "Published change");
    }
}

#[async_trait]
impl RecordService for LocalBackend {
    async fn query(&self, query: Query) -> Result<Vec<Record>, ServiceError> {
        self.with_db(|db| db.query_records(&query))
    }

    async fn insert(&self, resource: &str, record: Record) -> Result<Record, ServiceError> {
        let stored = self.with_db(|db| db.insert_record(resource, record))?;
        self.publish(ChangeKind::Insert, resource, &stored);
        Ok(stored)
    }

    async fn update(
        &self,
        resource: &str,
        predicate: Predicate,
        patch: Record,
    ) -> Result<Vec<Record>, ServiceError> {
        let updated = self.with_db(|db| db.update_records(resource, &predicate, &patch))?;
        for record in &updated {
            self.publish(ChangeKind::Update, resource, record);
        }
        Ok(updated)
    }
}

#[async_trait]
impl RealtimeService for LocalBackend {
    async fn subscribe(&self, spec: SubscriptionSpec) -> Result<Subscription, ServiceError> {
        Ok(self.hub.register(spec))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.hub.remove(id);
    }
}

#[async_trait]
impl BlobStorage for LocalBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, ServiceError> {
        // Validate before touching either the metadata table or the disk.
        self.blobs.blob_path(bucket, path)?;

        let meta = StoredBlob {
            id: Uuid::new_v4(),
            bucket: bucket.to_string(),
            path: path.to_string(),
            size: data.len() as i64,
            blake3_hash: blake3::hash(&data).to_hex().to_string(),
            content_type: content_type.to_string(),
            created_at: Utc::now(),
        };
        self.with_db(|db| db.insert_blob(&meta))?;

        if let Err(e) = self.blobs.write(bucket, path, &data).await {
            self.with_db(|db| db.delete_blob(meta.id))?;
            return Err(e.into());
        }

        info!(bucket, path, size = meta.size, hash = %meta.blake3_hash, "Blob uploaded");
        Ok(self.blobs.public_url(bucket, path))
    }
}

impl KeyValueStore for LocalBackend {
    fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        self.with_db(|db| db.get_setting(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        self.with_db(|db| db.set_setting(key, value))
    }
}
