//! Conversation channel manager.
//!
//! Keeps exactly one realtime subscription per open conversation, merges the
//! initial history and live events into one ordered, deduplicated message
//! list, and drives read receipts and new-message notifications.
//!
//! Lifecycle of [`ConversationChannelManager::open`]:
//!
//! 1. register the subscription, so every later change is buffered;
//! 2. fetch the pair's history, ordered by `(created_at, id)`;
//! 3. mark the history addressed to us as read;
//! 4. start consuming the buffered and live events.
//!
//! Events that repeat a message already in the list are dropped, so nothing
//! is lost or duplicated between steps 1 and 4. Every state mutation checks
//! the session token taken at `open`, which discards results that arrive
//! after `close` or after another conversation was opened.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use talento_shared::constants::{MAX_ATTACHMENT_SIZE, RESOURCE_MESSAGES, RESOURCE_NOTIFICATIONS};
use talento_shared::models::{
    from_record, to_record, Message, MessageKind, NewMessage, NewNotification, NotificationKind,
};
use talento_shared::service::{
    ChangeEvent, ChangeKind, Subscription, SubscriptionId, SubscriptionSpec, ToastLevel,
};
use talento_shared::{
    ChannelName, MessageId, OrderBy, Participant, ParticipantId, Predicate, Query, Record,
};

use crate::error::{ClientError, Result};
use crate::notify::texts;
use crate::services::Services;

/// Deterministic channel name of a one-to-one conversation.
pub fn channel_name(a: &ParticipantId, b: &ParticipantId) -> ChannelName {
    ChannelName::for_pair(a, b)
}

/// Messages travelling between `a` and `b` in either direction.
fn pair_predicate(a: &ParticipantId, b: &ParticipantId) -> Predicate {
    let direction = |from: &ParticipantId, to: &ParticipantId| {
        Predicate::And(vec![
            Predicate::eq("sender_id", from.as_str()),
            Predicate::eq("receiver_id", to.as_str()),
        ])
    };
    Predicate::Or(vec![direction(a, b), direction(b, a)])
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// The message input of a conversation view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl Composer {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }

    fn take(&mut self) -> (String, Option<Attachment>) {
        (std::mem::take(&mut self.text), self.attachment.take())
    }

    fn restore(&mut self, text: String, attachment: Option<Attachment>) {
        self.text = text;
        self.attachment = attachment;
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// The same pair was already open; nothing changed.
    AlreadyOpen,
    /// The channel was closed or replaced while opening.
    Superseded,
}

struct OpenChannel {
    session: u64,
    name: ChannelName,
    peer: Participant,
    messages: Vec<Message>,
    subscription: Option<SubscriptionId>,
    listener: Option<JoinHandle<()>>,
}

impl OpenChannel {
    fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    /// Insert at the message's `(created_at, id)` position. Live events
    /// normally land at the end, but transport reordering must not scramble
    /// the list.
    fn insert_ordered(&mut self, message: Message) {
        let pos = self
            .messages
            .partition_point(|m| m.conversation_order(&message).is_le());
        self.messages.insert(pos, message);
    }
}

#[derive(Default)]
struct ChannelState {
    session: u64,
    open: Option<OpenChannel>,
}

struct Inner {
    services: Services,
    me: Participant,
    media_bucket: String,
    state: Mutex<ChannelState>,
    revision: watch::Sender<u64>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn teardown(&self, channel: OpenChannel) {
        if let Some(id) = channel.subscription {
            self.services.realtime.unsubscribe(id);
        }
        if let Some(listener) = channel.listener {
            listener.abort();
        }
        info!(channel = %channel.name, "Conversation closed");
    }

    /// Run `f` on the open channel if it still belongs to `session`.
    fn with_session<T>(&self, session: u64, f: impl FnOnce(&mut OpenChannel) -> T) -> Option<T> {
        let mut state = self.state();
        state
            .open
            .as_mut()
            .filter(|open| open.session == session)
            .map(f)
    }

    /// Drop the open channel if it still belongs to `session`.
    fn abandon(&self, session: u64) {
        let abandoned = {
            let mut state = self.state();
            if state.open.as_ref().is_some_and(|open| open.session == session) {
                state.session += 1;
                state.open.take()
            } else {
                None
            }
        };
        if let Some(open) = abandoned {
            self.teardown(open);
            self.bump();
        }
    }

    fn current_session(&self) -> Option<u64> {
        self.state().open.as_ref().map(|open| open.session)
    }

    async fn dispatch(&self, session: u64, event: ChangeEvent) {
        match event.kind {
            ChangeKind::Insert => self.handle_insert(session, event.record).await,
            ChangeKind::Update => self.handle_update(session, event.record),
            ChangeKind::Delete => debug!("Ignoring message delete event"),
        }
    }

    async fn handle_insert(&self, session: u64, record: Record) {
        let message: Message = match from_record(record) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message event");
                return;
            }
        };

        let me = &self.me.id;
        // None: not applied. Some(None): our own message. Some(Some(peer)):
        // the peer wrote to us.
        let outcome = self.with_session(session, |open| {
            if !message.is_between(me, &open.peer.id) {
                return None;
            }
            // Covers the echo of our own send and events that were
            // buffered while the history was being fetched.
            if open.contains(&message.id) {
                debug!(id = %message.id, "Duplicate message event ignored");
                return None;
            }
            open.insert_ordered(message.clone());
            Some((message.sender_id == open.peer.id).then(|| open.peer.clone()))
        });

        let Some(from_peer) = outcome.flatten() else {
            return;
        };
        self.bump();
        let Some(from_peer) = from_peer else {
            return;
        };

        debug!(id = %message.id, from = %from_peer.id, "Incoming message");

        if let Err(e) = self.mark_as_read(session).await {
            warn!(error = %e, "Failed to mark incoming message as read");
        }

        let preview = message.preview();
        self.services.notifier.toast(
            ToastLevel::Info,
            &format!(
                "{} {}: {}",
                texts::NEW_MESSAGE_FROM,
                from_peer.display_name,
                preview
            ),
        );
        if !self.services.notifier.host_visible() {
            self.services
                .notifier
                .platform(&from_peer.display_name, &preview);
        }

        self.record_notification(&from_peer, &preview).await;
    }

    fn handle_update(&self, session: u64, record: Record) {
        let message: Message = match from_record(record) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message update");
                return;
            }
        };

        let changed = self.with_session(session, |open| {
            match open.messages.iter_mut().find(|m| m.id == message.id) {
                Some(existing) if existing.read != message.read => {
                    existing.read = message.read;
                    true
                }
                _ => false,
            }
        });

        if changed == Some(true) {
            debug!(id = %message.id, read = message.read, "Read receipt applied");
            self.bump();
        }
    }

    async fn record_notification(&self, from: &Participant, preview: &str) {
        let notification = NewNotification {
            user_id: self.me.id.clone(),
            kind: NotificationKind::Message,
            title: format!("{} {}", texts::NEW_MESSAGE_FROM, from.display_name),
            body: preview.to_string(),
            link: Some(from.id.to_string()),
            read: false,
        };

        let result = match to_record(&notification) {
            Ok(record) => self
                .services
                .records
                .insert(RESOURCE_NOTIFICATIONS, record)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist message notification");
        }
    }

    /// Flag every unread message from the peer to us as read, remotely and
    /// then locally. Repeating it changes nothing.
    async fn mark_as_read(&self, session: u64) -> Result<usize> {
        let Some(peer_id) = self.with_session(session, |open| open.peer.id.clone()) else {
            return Ok(0);
        };

        let predicate = Predicate::And(vec![
            Predicate::eq("receiver_id", self.me.id.as_str()),
            Predicate::eq("sender_id", peer_id.as_str()),
            Predicate::eq("read", false),
        ]);
        let updated = self
            .services
            .records
            .update(RESOURCE_MESSAGES, predicate, json!({ "read": true }))
            .await?;

        let me = &self.me.id;
        let flipped = self
            .with_session(session, |open| {
                let mut flipped = 0;
                for m in open
                    .messages
                    .iter_mut()
                    .filter(|m| &m.receiver_id == me && m.sender_id == peer_id && !m.read)
                {
                    m.read = true;
                    flipped += 1;
                }
                flipped
            })
            .unwrap_or(0);
        if flipped > 0 {
            self.bump();
        }

        debug!(updated = updated.len(), flipped, "Marked conversation as read");
        Ok(updated.len())
    }

    async fn fetch_history(&self, peer: &ParticipantId) -> Result<Vec<Message>> {
        let query = Query::new(RESOURCE_MESSAGES)
            .filter(pair_predicate(&self.me.id, peer))
            .order_by(OrderBy::asc("created_at"))
            .order_by(OrderBy::asc("id"));

        let records = self.services.records.query(query).await?;

        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            match from_record::<Message>(record) {
                Ok(m) => messages.push(m),
                Err(e) => warn!(error = %e, "Skipping malformed message in history"),
            }
        }
        // The backend's order is not trusted for ties.
        messages.sort_by(Message::conversation_order);
        messages.dedup_by(|a, b| a.id == b.id);
        Ok(messages)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let open = self.state().open.take();
        if let Some(open) = open {
            self.teardown(open);
        }
    }
}

async fn listen(manager: Weak<Inner>, session: u64, mut subscription: Subscription) {
    debug!(channel = %subscription.channel, "Conversation listener started");
    while let Some(event) = subscription.next().await {
        let Some(inner) = manager.upgrade() else {
            break;
        };
        inner.dispatch(session, event).await;
    }
    debug!(channel = %subscription.channel, "Conversation listener stopped");
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Handle to the conversation state of one participant. Cheap to clone.
#[derive(Clone)]
pub struct ConversationChannelManager {
    inner: Arc<Inner>,
}

impl ConversationChannelManager {
    pub fn new(services: Services, me: Participant, media_bucket: impl Into<String>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                services,
                me,
                media_bucket: media_bucket.into(),
                state: Mutex::new(ChannelState::default()),
                revision,
            }),
        }
    }

    pub fn me(&self) -> &Participant {
        &self.inner.me
    }

    /// Open the conversation with `peer`. Opening the pair that is already
    /// open is a no-op; opening another pair closes the current one first.
    ///
    /// A failed history fetch is reported and returned, but the channel
    /// stays open with an empty list and keeps receiving live messages.
    pub async fn open(&self, peer: Participant) -> Result<OpenOutcome> {
        let inner = &self.inner;
        let name = channel_name(&inner.me.id, &peer.id);

        let session = {
            let mut state = inner.state();
            if state.open.as_ref().is_some_and(|open| open.name == name) {
                debug!(channel = %name, "Conversation already open");
                return Ok(OpenOutcome::AlreadyOpen);
            }
            if let Some(previous) = state.open.take() {
                inner.teardown(previous);
            }
            state.session += 1;
            let session = state.session;
            state.open = Some(OpenChannel {
                session,
                name: name.clone(),
                peer: peer.clone(),
                messages: Vec::new(),
                subscription: None,
                listener: None,
            });
            session
        };
        inner.bump();
        info!(channel = %name, peer = %peer.id, "Opening conversation");

        let spec = SubscriptionSpec {
            channel: name.to_string(),
            resource: RESOURCE_MESSAGES.to_string(),
            events: vec![ChangeKind::Insert, ChangeKind::Update],
            predicate: Some(pair_predicate(&inner.me.id, &peer.id)),
        };
        let subscription = match inner.services.realtime.subscribe(spec).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(channel = %name, error = %e, "Subscription failed");
                inner
                    .services
                    .notifier
                    .toast(ToastLevel::Error, texts::MESSAGES_LOAD_FAILED);
                // Without a subscription the channel is unusable; forget it so
                // repeating `open` starts over.
                inner.abandon(session);
                return Err(e.into());
            }
        };

        let sub_id = subscription.id;
        if inner
            .with_session(session, |open| open.subscription = Some(sub_id))
            .is_none()
        {
            inner.services.realtime.unsubscribe(sub_id);
            return Ok(OpenOutcome::Superseded);
        }

        let history = inner.fetch_history(&peer.id).await;
        let fetch_error = match history {
            Ok(messages) => {
                let count = messages.len();
                let applied = inner.with_session(session, |open| {
                    for message in messages {
                        if !open.contains(&message.id) {
                            open.insert_ordered(message);
                        }
                    }
                });
                if applied.is_none() {
                    debug!(channel = %name, "Discarding history of a closed conversation");
                    return Ok(OpenOutcome::Superseded);
                }
                inner.bump();
                debug!(channel = %name, count, "History loaded");

                if let Err(e) = inner.mark_as_read(session).await {
                    warn!(channel = %name, error = %e, "Failed to mark history as read");
                }
                None
            }
            Err(e) => {
                warn!(channel = %name, error = %e, "Failed to load history");
                inner
                    .services
                    .notifier
                    .toast(ToastLevel::Error, texts::MESSAGES_LOAD_FAILED);
                Some(e)
            }
        };

        let listener = tokio::spawn(listen(Arc::downgrade(&self.inner), session, subscription));
        let registered = inner
            .with_session(session, |open| open.listener = Some(listener))
            .is_some();
        if !registered {
            // The subscription went away with the channel, so the detached
            // listener sees its stream end and exits.
            return Ok(OpenOutcome::Superseded);
        }

        match fetch_error {
            Some(e) => Err(e),
            None => Ok(OpenOutcome::Opened),
        }
    }

    /// Apply a message insert delivered by the realtime transport.
    pub async fn on_insert_event(&self, record: Record) {
        if let Some(session) = self.inner.current_session() {
            self.inner.handle_insert(session, record).await;
        }
    }

    /// Apply a message update (read receipt) delivered by the transport.
    pub fn on_update_event(&self, record: Record) {
        if let Some(session) = self.inner.current_session() {
            self.inner.handle_update(session, record);
        }
    }

    /// Send the composer's content to the open conversation.
    ///
    /// The composer is cleared before the remote call and restored if it
    /// fails. On success the message is NOT appended here: it appears when
    /// the realtime echo of the insert arrives, which keeps the subscription
    /// the single source of what is on screen. Appending the insert's return
    /// value as well would show the message twice.
    pub async fn send(&self, composer: &mut Composer) -> Result<()> {
        let inner = &self.inner;

        if composer.is_blank() {
            inner
                .services
                .notifier
                .toast(ToastLevel::Error, texts::MESSAGE_EMPTY);
            return Err(ClientError::Validation("empty message".into()));
        }
        if let Some(attachment) = &composer.attachment {
            if attachment.data.len() > MAX_ATTACHMENT_SIZE {
                inner
                    .services
                    .notifier
                    .toast(ToastLevel::Error, texts::ATTACHMENT_TOO_LARGE);
                return Err(ClientError::Validation(format!(
                    "attachment of {} bytes exceeds {MAX_ATTACHMENT_SIZE}",
                    attachment.data.len()
                )));
            }
        }

        let peer = inner
            .state()
            .open
            .as_ref()
            .map(|open| open.peer.id.clone())
            .ok_or(ClientError::NoOpenChannel)?;

        let (text, attachment) = composer.take();

        let media = match &attachment {
            None => None,
            Some(file) => match self.upload(file).await {
                Ok(url) => Some((url, MessageKind::from_content_type(&file.content_type))),
                Err(e) => {
                    warn!(error = %e, file = %file.file_name, "Attachment upload failed");
                    composer.restore(text, attachment);
                    inner
                        .services
                        .notifier
                        .toast(ToastLevel::Error, texts::ATTACHMENT_UPLOAD_FAILED);
                    return Err(e);
                }
            },
        };

        let content = Some(text.trim().to_string()).filter(|t| !t.is_empty());
        let (media_url, kind) = match media {
            Some((url, kind)) => (Some(url), kind),
            None => (None, MessageKind::Text),
        };
        let message = NewMessage {
            sender_id: inner.me.id.clone(),
            receiver_id: peer.clone(),
            content,
            media_url,
            kind,
            read: false,
        };

        let result = match to_record(&message) {
            Ok(record) => inner.services.records.insert(RESOURCE_MESSAGES, record).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(_echoed_by_realtime) => {
                debug!(to = %peer, ?kind, "Message sent");
                Ok(())
            }
            Err(e) => {
                warn!(to = %peer, error = %e, "Message send failed");
                composer.restore(text, attachment);
                inner
                    .services
                    .notifier
                    .toast(ToastLevel::Error, texts::MESSAGE_SEND_FAILED);
                Err(e.into())
            }
        }
    }

    async fn upload(&self, file: &Attachment) -> Result<String> {
        let safe_name: String = file
            .file_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = format!("{}/{}-{}", self.inner.me.id, Uuid::new_v4(), safe_name);

        Ok(self
            .inner
            .services
            .blobs
            .upload(
                &self.inner.media_bucket,
                &path,
                file.data.clone(),
                &file.content_type,
            )
            .await?)
    }

    /// Mark every unread message from the peer as read. Idempotent.
    pub async fn mark_as_read(&self) -> Result<usize> {
        let session = self
            .inner
            .current_session()
            .ok_or(ClientError::NoOpenChannel)?;
        self.inner.mark_as_read(session).await
    }

    /// Tear down the open conversation, if any. Idempotent.
    pub fn close(&self) {
        let closed = {
            let mut state = self.inner.state();
            let closed = state.open.take();
            if closed.is_some() {
                state.session += 1;
            }
            closed
        };
        if let Some(open) = closed {
            self.inner.teardown(open);
            self.inner.bump();
        }
    }

    /// Snapshot of the visible message list.
    pub fn messages(&self) -> Vec<Message> {
        self.inner
            .state()
            .open
            .as_ref()
            .map(|open| open.messages.clone())
            .unwrap_or_default()
    }

    pub fn current_channel(&self) -> Option<ChannelName> {
        self.inner.state().open.as_ref().map(|open| open.name.clone())
    }

    pub fn peer(&self) -> Option<Participant> {
        self.inner.state().open.as_ref().map(|open| open.peer.clone())
    }

    pub fn is_open(&self) -> bool {
        self.inner.state().open.is_some()
    }

    /// Revision counter bumped on every visible change.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use talento_shared::service::{RealtimeService, RecordService};
    use tokio::sync::Notify;
    use talento_shared::ServiceError;
    use talento_store::LocalBackend;
    use tempfile::TempDir;

    use crate::notify::MemoryNotifier;

    struct Fixture {
        backend: Arc<LocalBackend>,
        notifier: Arc<MemoryNotifier>,
        services: Services,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(LocalBackend::in_memory(dir.path().to_path_buf()).unwrap());
        let notifier = Arc::new(MemoryNotifier::new());
        let services = Services::from_local(backend.clone(), notifier.clone());
        Fixture {
            backend,
            notifier,
            services,
            _dir: dir,
        }
    }

    fn anna() -> Participant {
        Participant::new("anna", "Anna")
    }

    fn bruno() -> Participant {
        Participant::new("bruno", "Bruno")
    }

    fn record(id: &str, from: &str, to: &str, content: &str, at: &str) -> Record {
        json!({
            "id": id,
            "sender_id": from,
            "receiver_id": to,
            "content": content,
            "kind": "text",
            "read": false,
            "created_at": at,
        })
    }

    async fn seed(fx: &Fixture, rec: Record) {
        fx.backend.insert(RESOURCE_MESSAGES, rec).await.unwrap();
    }

    async fn settle(manager: &ConversationChannelManager, cond: impl Fn(&[Message]) -> bool) {
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

    /// Records service whose calls fail on demand.
    struct Flaky {
        inner: Arc<LocalBackend>,
        fail_query: bool,
        fail_insert: bool,
    }

    #[async_trait]
    impl RecordService for Flaky {
        async fn query(&self, query: Query) -> std::result::Result<Vec<Record>, ServiceError> {
            if self.fail_query {
                return Err(ServiceError::Network("connection reset".into()));
            }
            self.inner.query(query).await
        }

        async fn insert(
            &self,
            resource: &str,
            record: Record,
        ) -> std::result::Result<Record, ServiceError> {
            if self.fail_insert {
                return Err(ServiceError::Network("connection reset".into()));
            }
            self.inner.insert(resource, record).await
        }

        async fn update(
            &self,
            resource: &str,
            predicate: Predicate,
            patch: Record,
        ) -> std::result::Result<Vec<Record>, ServiceError> {
            self.inner.update(resource, predicate, patch).await
        }
    }

    /// Realtime transport that refuses the first subscription.
    struct OfflineOnce {
        inner: Arc<LocalBackend>,
        offline: AtomicBool,
    }

    #[async_trait]
    impl RealtimeService for OfflineOnce {
        async fn subscribe(
            &self,
            spec: SubscriptionSpec,
        ) -> std::result::Result<Subscription, ServiceError> {
            if self.offline.swap(false, Ordering::SeqCst) {
                return Err(ServiceError::Network("offline".into()));
            }
            self.inner.subscribe(spec).await
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            self.inner.unsubscribe(id);
        }
    }

    /// Records service whose queries wait for the gate to open.
    struct Gated {
        inner: Arc<LocalBackend>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl RecordService for Gated {
        async fn query(&self, query: Query) -> std::result::Result<Vec<Record>, ServiceError> {
            self.gate.notified().await;
            self.inner.query(query).await
        }

        async fn insert(
            &self,
            resource: &str,
            record: Record,
        ) -> std::result::Result<Record, ServiceError> {
            self.inner.insert(resource, record).await
        }

        async fn update(
            &self,
            resource: &str,
            predicate: Predicate,
            patch: Record,
        ) -> std::result::Result<Vec<Record>, ServiceError> {
            self.inner.update(resource, predicate, patch).await
        }
    }

    #[tokio::test]
    async fn test_failed_subscribe_can_be_retried() {
        let fx = fixture();
        let mut services = fx.services.clone();
        services.realtime = Arc::new(OfflineOnce {
            inner: fx.backend.clone(),
            offline: AtomicBool::new(true),
        });
        let manager = ConversationChannelManager::new(services, anna(), "chat-media");

        let err = manager.open(bruno()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Transient);
        assert!(!manager.is_open());
        assert_eq!(fx.notifier.errors(), vec![texts::MESSAGES_LOAD_FAILED.to_string()]);

        assert_eq!(manager.open(bruno()).await.unwrap(), OpenOutcome::Opened);
        assert!(manager.is_open());
        assert_eq!(fx.backend.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_history_arriving_after_close_is_discarded() {
        let fx = fixture();
        seed(&fx, record("m-1", "bruno", "anna", "Ciao", "2026-03-01T10:00:00.000000Z")).await;

        let gate = Arc::new(Notify::new());
        let mut services = fx.services.clone();
        services.records = Arc::new(Gated {
            inner: fx.backend.clone(),
            gate: gate.clone(),
        });
        let manager = ConversationChannelManager::new(services, anna(), "chat-media");

        let opening = tokio::spawn({
            let manager = manager.clone();
            async move { manager.open(bruno()).await }
        });
        tokio::time::timeout(Duration::from_secs(2), async {
            while fx.backend.subscription_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscription not registered");

        manager.close();
        gate.notify_one();

        let outcome = opening.await.unwrap().unwrap();
        assert_eq!(outcome, OpenOutcome::Superseded);
        assert!(!manager.is_open());
        assert!(manager.messages().is_empty());
        assert_eq!(fx.backend.subscription_count(), 0);

        // Nothing was marked read for a conversation nobody looked at.
        let stored = fx.backend.with_db(|db| db.get_record(RESOURCE_MESSAGES, "m-1")).unwrap();
        assert_eq!(stored["read"], false);
    }

    #[tokio::test]
    async fn test_history_arriving_after_switch_is_discarded() {
        let fx = fixture();
        seed(&fx, record("m-1", "bruno", "anna", "Ciao", "2026-03-01T10:00:00.000000Z")).await;

        let gate = Arc::new(Notify::new());
        let mut services = fx.services.clone();
        services.records = Arc::new(Gated {
            inner: fx.backend.clone(),
            gate: gate.clone(),
        });
        let manager = ConversationChannelManager::new(services, anna(), "chat-media");

        let opening = tokio::spawn({
            let manager = manager.clone();
            async move { manager.open(bruno()).await }
        });
        tokio::time::timeout(Duration::from_secs(2), async {
            while fx.backend.subscription_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscription not registered");

        let switching = tokio::spawn({
            let manager = manager.clone();
            async move { manager.open(Participant::new("carla", "Carla")).await }
        });
        tokio::time::timeout(Duration::from_secs(2), async {
            while manager.current_channel().map(|c| c.to_string())
                != Some("chat:anna__carla".to_string())
            {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("switch not started");

        // Release the stale query and leave a permit for the new one.
        gate.notify_waiters();
        gate.notify_one();

        assert_eq!(opening.await.unwrap().unwrap(), OpenOutcome::Superseded);
        assert_eq!(switching.await.unwrap().unwrap(), OpenOutcome::Opened);
        assert!(manager.messages().is_empty());
        assert_eq!(fx.backend.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_history_is_ordered_with_id_tiebreak_and_marked_read() {
        let fx = fixture();
        let ts = "2026-03-01T09:00:00.000000Z";
        seed(&fx, record("m-b", "bruno", "anna", "secondo", ts)).await;
        seed(&fx, record("m-a", "bruno", "anna", "primo", ts)).await;
        seed(&fx, record("m-0", "anna", "bruno", "ciao", "2026-03-01T08:00:00.000000Z")).await;
        seed(&fx, record("m-x", "bruno", "carla", "altro", ts)).await;

        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        assert_eq!(manager.open(bruno()).await.unwrap(), OpenOutcome::Opened);

        let ids: Vec<_> = manager.messages().iter().map(|m| m.id.0.clone()).collect();
        assert_eq!(ids, vec!["m-0", "m-a", "m-b"]);

        let messages = manager.messages();
        assert!(messages.iter().filter(|m| m.sender_id.as_str() == "bruno").all(|m| m.read));
        // Our own message to Bruno is not ours to mark.
        assert!(!messages[0].read);

        let stored = fx.backend.with_db(|db| db.get_record(RESOURCE_MESSAGES, "m-a")).unwrap();
        assert_eq!(stored["read"], true);
    }

    #[tokio::test]
    async fn test_reopen_same_pair_is_noop() {
        let fx = fixture();
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");

        manager.open(bruno()).await.unwrap();
        assert_eq!(manager.open(bruno()).await.unwrap(), OpenOutcome::AlreadyOpen);
        assert_eq!(fx.backend.subscription_count(), 1);

        manager
            .open(Participant::new("carla", "Carla"))
            .await
            .unwrap();
        assert_eq!(fx.backend.subscription_count(), 1);
        assert_eq!(
            manager.current_channel().unwrap().as_str(),
            "chat:anna__carla"
        );
    }

    #[tokio::test]
    async fn test_self_echo_is_deduplicated() {
        let fx = fixture();
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        manager.open(bruno()).await.unwrap();

        let echo = record("m-1", "anna", "bruno", "Ciao", "2026-03-01T10:00:00.000000Z");
        manager.on_insert_event(echo.clone()).await;
        manager.on_insert_event(echo).await;

        assert_eq!(manager.messages().len(), 1);
        assert!(fx.notifier.toasts().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_event_is_placed_by_timestamp() {
        let fx = fixture();
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        manager.open(bruno()).await.unwrap();

        manager
            .on_insert_event(record("m-2", "anna", "bruno", "dopo", "2026-03-01T10:05:00.000000Z"))
            .await;
        manager
            .on_insert_event(record("m-1", "anna", "bruno", "prima", "2026-03-01T10:00:00.000000Z"))
            .await;

        let ids: Vec<_> = manager.messages().iter().map(|m| m.id.0.clone()).collect();
        assert_eq!(ids, vec!["m-1", "m-2"]);
    }

    #[tokio::test]
    async fn test_incoming_message_notifies_and_persists_notification() {
        let fx = fixture();
        fx.notifier.set_visible(false);
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        manager.open(bruno()).await.unwrap();

        seed(&fx, record("m-1", "bruno", "anna", "Ciao", "2026-03-01T10:00:00.000000Z")).await;
        settle(&manager, |msgs| msgs.len() == 1 && msgs[0].read).await;

        let toasts = fx.notifier.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].text, "Nuovo messaggio da Bruno: Ciao");

        let platform = fx.notifier.platform_notices();
        assert_eq!(platform.len(), 1);
        assert_eq!(platform[0].title, "Bruno");

        let notifications = fx
            .backend
            .query(Query::new(RESOURCE_NOTIFICATIONS))
            .await
            .unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["user_id"], "anna");
        assert_eq!(notifications[0]["link"], "bruno");
    }

    #[tokio::test]
    async fn test_visible_host_gets_no_platform_notification() {
        let fx = fixture();
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        manager.open(bruno()).await.unwrap();

        manager
            .on_insert_event(record("m-1", "bruno", "anna", "Ciao", "2026-03-01T10:00:00.000000Z"))
            .await;

        assert_eq!(fx.notifier.toasts().len(), 1);
        assert!(fx.notifier.platform_notices().is_empty());
    }

    #[tokio::test]
    async fn test_mark_as_read_is_idempotent() {
        let fx = fixture();
        seed(&fx, record("m-1", "bruno", "anna", "uno", "2026-03-01T09:00:00.000000Z")).await;

        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        manager.open(bruno()).await.unwrap();

        let snapshot = || {
            fx.backend
                .with_db(|db| db.get_record(RESOURCE_MESSAGES, "m-1"))
                .unwrap()
        };
        let once = snapshot();
        assert_eq!(manager.mark_as_read().await.unwrap(), 0);
        assert_eq!(manager.mark_as_read().await.unwrap(), 0);
        assert_eq!(snapshot(), once);
        assert_eq!(once["read"], true);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_events() {
        let fx = fixture();
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");

        manager.close();
        manager.open(bruno()).await.unwrap();
        manager.close();
        manager.close();

        assert!(!manager.is_open());
        assert_eq!(fx.backend.subscription_count(), 0);

        manager
            .on_insert_event(record("m-1", "bruno", "anna", "Ciao", "2026-03-01T10:00:00.000000Z"))
            .await;
        assert!(manager.messages().is_empty());
        assert!(fx.notifier.toasts().is_empty());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let fx = fixture();
        {
            let manager =
                ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
            manager.open(bruno()).await.unwrap();
            assert_eq!(fx.backend.subscription_count(), 1);
        }
        assert_eq!(fx.backend.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_send_is_rejected_locally() {
        let fx = fixture();
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        manager.open(bruno()).await.unwrap();

        let mut composer = Composer::text("   ");
        let err = manager.send(&mut composer).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(fx.notifier.errors(), vec![texts::MESSAGE_EMPTY.to_string()]);

        let stored = fx.backend.query(Query::new(RESOURCE_MESSAGES)).await.unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_send_without_open_channel() {
        let fx = fixture();
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        let mut composer = Composer::text("Ciao");
        assert!(matches!(
            manager.send(&mut composer).await,
            Err(ClientError::NoOpenChannel)
        ));
        assert_eq!(composer.text, "Ciao");
    }

    #[tokio::test]
    async fn test_send_shows_message_only_through_echo() {
        let fx = fixture();
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        manager.open(bruno()).await.unwrap();

        let mut composer = Composer::text("Ciao Bruno");
        manager.send(&mut composer).await.unwrap();
        assert!(composer.text.is_empty());

        settle(&manager, |msgs| msgs.len() == 1).await;
        // Give the listener a chance to see any duplicate delivery.
        tokio::task::yield_now().await;
        let messages = manager.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.as_deref(), Some("Ciao Bruno"));
        assert!(fx.notifier.toasts().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_restores_composer() {
        let fx = fixture();
        let mut services = fx.services.clone();
        services.records = Arc::new(Flaky {
            inner: fx.backend.clone(),
            fail_query: false,
            fail_insert: true,
        });

        let manager = ConversationChannelManager::new(services, anna(), "chat-media");
        manager.open(bruno()).await.unwrap();

        let mut composer = Composer::text("Ciao");
        let err = manager.send(&mut composer).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Transient);
        assert_eq!(composer.text, "Ciao");
        assert_eq!(fx.notifier.errors(), vec![texts::MESSAGE_SEND_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn test_send_attachment_uploads_then_inserts() {
        let fx = fixture();
        let manager = ConversationChannelManager::new(fx.services.clone(), anna(), "chat-media");
        manager.open(bruno()).await.unwrap();

        let mut composer = Composer {
            text: String::new(),
            attachment: Some(Attachment {
                file_name: "cv finale.pdf".into(),
                content_type: "application/pdf".into(),
                data: Bytes::from_static(b"%PDF-1.7"),
            }),
        };
        manager.send(&mut composer).await.unwrap();
        assert!(composer.attachment.is_none());

        settle(&manager, |msgs| msgs.len() == 1).await;
        let message = &manager.messages()[0];
        assert_eq!(message.kind, MessageKind::Document);
        assert_eq!(message.content, None);
        let url = message.media_url.as_deref().unwrap();
        assert!(url.starts_with("memory://blobs/chat-media/anna/"));
        assert!(url.ends_with("-cv_finale.pdf"));
    }

    #[tokio::test]
    async fn test_history_failure_leaves_list_empty_but_channel_live() {
        let fx = fixture();
        let mut services = fx.services.clone();
        services.records = Arc::new(Flaky {
            inner: fx.backend.clone(),
            fail_query: true,
            fail_insert: false,
        });

        let manager = ConversationChannelManager::new(services, anna(), "chat-media");
        let err = manager.open(bruno()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Transient);
        assert_eq!(fx.notifier.errors(), vec![texts::MESSAGES_LOAD_FAILED.to_string()]);
        assert!(manager.is_open());
        assert!(manager.messages().is_empty());

        seed(&fx, record("m-1", "bruno", "anna", "Ciao", "2026-03-01T10:00:00.000000Z")).await;
        settle(&manager, |msgs| msgs.len() == 1).await;
    }

    #[test]
    fn test_channel_name_symmetry() {
        let a = ParticipantId::from("anna");
        let b = ParticipantId::from("bruno");
        assert_eq!(channel_name(&a, &b), channel_name(&b, &a));
    }
}
