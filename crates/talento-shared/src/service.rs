//! Collaborator interfaces consumed by the client coordinators.
//!
//! The client never talks to a concrete backend: persistence, realtime
//! delivery, blob storage, user notifications and device-local settings are
//! all reached through the traits below and bundled per session.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ServiceError;
use crate::query::{Predicate, Query, Record};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecordService: Send + Sync {
    /// Ordered, optionally limited, query over one resource.
    async fn query(&self, query: Query) -> Result<Vec<Record>, ServiceError>;

    /// Persist a new record and return it as stored (with generated fields).
    async fn insert(&self, resource: &str, record: Record) -> Result<Record, ServiceError>;

    /// Merge `patch` into every record matching `predicate` and return the
    /// updated records.
    async fn update(
        &self,
        resource: &str,
        predicate: Predicate,
        patch: Record,
    ) -> Result<Vec<Record>, ServiceError>;
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change pushed by the realtime transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub resource: String,
    /// The record after the change (before it, for deletes).
    pub record: Record,
}

/// What a subscription listens to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionSpec {
    /// Logical channel name, shared by every member of the conversation.
    pub channel: String,
    pub resource: String,
    pub events: Vec<ChangeKind>,
    pub predicate: Option<Predicate>,
}

impl SubscriptionSpec {
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        event.resource == self.resource
            && self.events.contains(&event.kind)
            && self
                .predicate
                .as_ref()
                .map_or(true, |p| p.matches(&event.record))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving half of a realtime subscription. Events are buffered from the
/// moment the subscription is registered until they are polled.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub channel: String,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        channel: impl Into<String>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
    ) -> Self {
        Self {
            id,
            channel: channel.into(),
            events,
        }
    }
}

impl Stream for Subscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

#[async_trait]
pub trait RealtimeService: Send + Sync {
    async fn subscribe(&self, spec: SubscriptionSpec) -> Result<Subscription, ServiceError>;

    /// Stop delivering events for `id`. Synchronous and idempotent.
    fn unsubscribe(&self, id: SubscriptionId);
}

// ---------------------------------------------------------------------------
// Blobs
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Upload `data` to `bucket/path` and return its public URL.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, ServiceError>;
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Success,
    Info,
    Error,
}

pub trait NotificationSink: Send + Sync {
    /// Short-lived in-app message.
    fn toast(&self, level: ToastLevel, text: &str);

    /// Platform (OS / browser) notification.
    fn platform(&self, title: &str, body: &str);

    /// Whether the host window is currently focused and visible.
    fn host_visible(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Device-local key/value settings
// ---------------------------------------------------------------------------

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ServiceError>;

    fn set(&self, key: &str, value: &str) -> Result<(), ServiceError>;
}
