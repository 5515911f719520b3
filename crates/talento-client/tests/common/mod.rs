#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tempfile::TempDir;

use talento_client::{ConversationChannelManager, FixedClock, MemoryNotifier, Services};
use talento_shared::models::Message;
use talento_store::LocalBackend;

pub struct Harness {
    pub backend: Arc<LocalBackend>,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(LocalBackend::in_memory(dir.path().join("blobs")).unwrap());
        Self { backend, _dir: dir }
    }

    /// Services for one participant's device, sharing the backend.
    pub fn device(&self) -> (Services, Arc<MemoryNotifier>) {
        let notifier = Arc::new(MemoryNotifier::new());
        let services = Services::from_local(self.backend.clone(), notifier.clone())
            .with_clock(Arc::new(FixedClock(today())));
        (services, notifier)
    }
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

/// Wait until the manager's message list satisfies `cond`.
pub async fn settle(manager: &ConversationChannelManager, cond: impl Fn(&[Message]) -> bool) {
    let mut rx = manager.watch();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if cond(&manager.messages()) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    })
    .await
    .expect("condition not reached in time");
}
