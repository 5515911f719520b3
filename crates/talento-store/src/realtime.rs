//! In-process realtime fan-out.
//!
//! Every subscription registers a [`SubscriptionSpec`] and the sending half
//! of an unbounded channel. Published change events are matched against each
//! spec and delivered synchronously, so an event published after
//! [`RealtimeHub::register`] returns is always buffered for that subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use talento_shared::service::{ChangeEvent, Subscription, SubscriptionId, SubscriptionSpec};

struct Subscriber {
    spec: SubscriptionSpec,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
pub struct RealtimeHub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, spec: SubscriptionSpec) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = spec.channel.clone();

        debug!(%id, channel = %channel, resource = %spec.resource, "Registering subscription");

        match self.subscribers.lock() {
            Ok(mut subs) => {
                subs.insert(id, Subscriber { spec, tx });
            }
            Err(_) => warn!(%id, "Subscriber table lock poisoned; subscription is inert"),
        }

        Subscription::new(id, channel, rx)
    }

    /// Drop a subscription. Returns whether it was registered.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self
            .subscribers
            .lock()
            .map(|mut subs| subs.remove(&id).is_some())
            .unwrap_or(false);
        if removed {
            debug!(%id, "Removed subscription");
        }
        removed
    }

    /// Deliver `event` to every matching subscriber and return how many
    /// received it. Subscribers whose receiver was dropped are pruned.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let Ok(mut subs) = self.subscribers.lock() else {
            warn!("Subscriber table lock poisoned; dropping event");
            return 0;
        };

        let mut delivered = 0;
        subs.retain(|id, sub| {
            if !sub.spec.accepts(event) {
                return !sub.tx.is_closed();
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    debug!(%id, "Pruning closed subscription");
                    false
                }
            }
        });
        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
