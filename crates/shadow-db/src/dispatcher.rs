use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use shadow_types::{ConversationId, Message, Subscription};

const CHANNEL_CAPACITY: usize = 1024;

/// Fans stored inserts out to every open subscription.
#[derive(Clone)]
pub struct InsertDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// All conversations share one channel; subscriptions filter on receipt.
    broadcast_tx: broadcast::Sender<(ConversationId, Message)>,
}

impl InsertDispatcher {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to inserts into one conversation.
    pub fn subscribe(&self, conversation: ConversationId) -> Subscription {
        Subscription::new(conversation, self.inner.broadcast_tx.subscribe())
    }

    /// Publish an insert. Having no subscribers is not an error.
    pub fn broadcast(&self, conversation: ConversationId, message: Message) {
        let id = message.id.clone();
        match self.inner.broadcast_tx.send((conversation, message)) {
            Ok(receivers) => debug!(message_id = %id, receivers, "insert broadcast"),
            Err(_) => debug!(message_id = %id, "insert broadcast with no subscribers"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for InsertDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
