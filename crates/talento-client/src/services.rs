//! The collaborator bundle handed to every coordinator.

use std::sync::Arc;

use talento_shared::service::{
    BlobStorage, KeyValueStore, NotificationSink, RealtimeService, RecordService,
};
use talento_store::{LocalBackend, StoreError};

use crate::config::ClientConfig;
use crate::settings::{Clock, Settings, SystemClock};

#[derive(Clone)]
pub struct Services {
    pub records: Arc<dyn RecordService>,
    pub realtime: Arc<dyn RealtimeService>,
    pub blobs: Arc<dyn BlobStorage>,
    pub notifier: Arc<dyn NotificationSink>,
    pub settings: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Route every collaborator to one local backend.
    pub fn from_local(backend: Arc<LocalBackend>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            records: backend.clone(),
            realtime: backend.clone(),
            blobs: backend.clone(),
            settings: backend,
            notifier,
            clock: Arc::new(SystemClock),
        }
    }

    /// Open the local backend described by `config`.
    pub fn local(
        config: &ClientConfig,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, StoreError> {
        let db_path = match &config.db_path {
            Some(path) => path.clone(),
            None => {
                let path = talento_store::database::default_path()?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                path
            }
        };
        let backend = LocalBackend::open(&db_path, config.blob_dir.clone(), &config.blob_base_url)?;
        Ok(Self::from_local(Arc::new(backend), notifier))
    }

    /// Ephemeral session with an in-memory database.
    pub fn in_memory(
        config: &ClientConfig,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, StoreError> {
        let backend = LocalBackend::in_memory(config.blob_dir.clone())?;
        Ok(Self::from_local(Arc::new(backend), notifier))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn typed_settings(&self) -> Settings {
        Settings::new(self.settings.clone())
    }
}
