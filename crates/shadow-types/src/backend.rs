use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::error::FeedError;
use crate::models::{ConversationId, Message, MessageDraft};

/// The message store the feed core consumes: paged reads, inserts, a realtime
/// insert feed and the hearts counter write.
#[async_trait]
pub trait MessageBackend: Send + Sync {
    /// Up to `limit` messages strictly older than `before` (or the newest
    /// messages when `before` is `None`), newest first.
    async fn fetch_page(
        &self,
        conversation: &ConversationId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Message>, FeedError>;

    /// Up to `limit` messages strictly newer than `after`, oldest first.
    async fn fetch_since(
        &self,
        conversation: &ConversationId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, FeedError>;

    /// Stores a draft and returns it with its server-assigned id and timestamp.
    async fn insert(
        &self,
        conversation: &ConversationId,
        draft: MessageDraft,
    ) -> Result<Message, FeedError>;

    /// Opens a realtime stream of inserts into `conversation`.
    async fn subscribe_inserts(
        &self,
        conversation: &ConversationId,
    ) -> Result<Subscription, FeedError>;

    /// Overwrites the stored hearts counter of a message.
    async fn update_hearts_count(&self, message_id: &str, new_count: u32) -> Result<(), FeedError>;
}

/// Item yielded by a [`Subscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Insert(Message),
    /// The subscriber fell behind and `n` inserts were dropped.
    Lagged(u64),
}

/// A realtime insert stream for one conversation.
///
/// Backends fan inserts out over a broadcast channel of
/// `(conversation, message)` pairs; the subscription filters to its own
/// conversation. Dropping it or calling [`Subscription::unsubscribe`]
/// releases the receiver.
pub struct Subscription {
    conversation: ConversationId,
    rx: Option<broadcast::Receiver<(ConversationId, Message)>>,
}

impl Subscription {
    pub fn new(
        conversation: ConversationId,
        rx: broadcast::Receiver<(ConversationId, Message)>,
    ) -> Self {
        Self {
            conversation,
            rx: Some(rx),
        }
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Waits for the next insert. Returns `None` once the stream is closed
    /// or unsubscribed.
    pub async fn next(&mut self) -> Option<LiveEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok((conversation, message)) if conversation == self.conversation => {
                    return Some(LiveEvent::Insert(message));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => return Some(LiveEvent::Lagged(n)),
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        if self.rx.take().is_some() {
            debug!(conversation = %self.conversation, "unsubscribed from inserts");
        }
    }
}
