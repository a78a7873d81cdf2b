//! Fan-out of lifecycle events to live dashboard subscribers.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use swarmdash_core::Event;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};
use uuid::Uuid;

pub type SubscriberId = Uuid;

/// Publish/subscribe hub for serialized [`Event`] envelopes.
///
/// Delivery is best-effort and fire-and-forget: a subscriber whose channel
/// has closed is dropped during publish and never affects delivery to the
/// others. Subscribers may join and leave at any time.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<HashMap<SubscriberId, UnboundedSender<String>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live subscriber. The returned receiver yields events as
    /// JSON text, ready to hand to a WebSocket.
    pub fn subscribe(&self) -> (SubscriberId, UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        debug!(subscriber = %id, "subscriber registered");
        (id, rx)
    }

    /// Remove a subscriber. Removing an id twice (or one already dropped
    /// during publish) is a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.lock().remove(&id).is_some() {
            debug!(subscriber = %id, "subscriber removed");
        }
    }

    /// Serialize `event` once and deliver it to every registered
    /// subscriber, pruning any whose receiving end has gone away.
    pub fn publish(&self, event: &Event) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                error!("failed to encode event: {err}");
                return;
            }
        };

        self.lock().retain(|id, tx| {
            if tx.send(payload.clone()).is_ok() {
                true
            } else {
                debug!(subscriber = %id, "dropping closed subscriber");
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, UnboundedSender<String>>> {
        // A panic while holding the lock leaves plain data; keep going.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
