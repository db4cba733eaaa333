use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use shadow_types::{
    ConversationId, DmConversation, FeedError, Message, MessageBackend, MessageDraft, Subscription,
};

use crate::models::{MessageRow, format_timestamp};
use crate::{Database, InsertDispatcher};

/// [`MessageBackend`] over the local SQLite store. Blocking queries run on
/// the blocking pool; inserts are fanned out through the dispatcher.
#[derive(Clone)]
pub struct SqliteBackend {
    db: Arc<Database>,
    dispatcher: InsertDispatcher,
}

impl SqliteBackend {
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_dispatcher(db, InsertDispatcher::new())
    }

    pub fn with_dispatcher(db: Arc<Database>, dispatcher: InsertDispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn dispatcher(&self) -> &InsertDispatcher {
        &self.dispatcher
    }

    /// Find or create the direct conversation between two users.
    pub async fn open_direct_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<DmConversation, FeedError> {
        let (a, b) = (user_a.to_string(), user_b.to_string());
        let row = self
            .blocking(move |db| {
                let new_id = Uuid::new_v4().to_string();
                let now = format_timestamp(Utc::now());
                db.get_or_create_dm_conversation(&new_id, &a, &b, &now)
                    .map_err(storage_error)
            })
            .await?;
        Ok(row.into_conversation())
    }

    /// A user's direct conversations, most recently active first.
    pub async fn direct_conversations(&self, user_id: &str) -> Result<Vec<DmConversation>, FeedError> {
        let user_id = user_id.to_string();
        let rows = self
            .blocking(move |db| db.list_dm_conversations(&user_id).map_err(storage_error))
            .await?;
        Ok(rows.into_iter().map(|r| r.into_conversation()).collect())
    }

    /// Record that `user_id` has read `conversation_id` up to `at`.
    pub async fn mark_direct_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), FeedError> {
        let (id, user) = (conversation_id.to_string(), user_id.to_string());
        self.blocking(move |db| {
            require_conversation(db, &ConversationId::Direct(id.clone()))?;
            db.mark_dm_read(&id, &user, &format_timestamp(at))
                .map_err(storage_error)
        })
        .await?;
        info!(conversation_id, user_id, "direct conversation marked read");
        Ok(())
    }

    /// Direct conversations with messages from the other participant that
    /// `user_id` has not read yet.
    pub async fn unread_direct_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<DmConversation>, FeedError> {
        let user_id = user_id.to_string();
        let rows = self
            .blocking(move |db| db.unread_dm_conversations(&user_id).map_err(storage_error))
            .await?;
        Ok(rows.into_iter().map(|r| r.into_conversation()).collect())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, FeedError>
    where
        F: FnOnce(&Database) -> Result<T, FeedError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                FeedError::network(e)
            })?
    }
}

fn storage_error(e: anyhow::Error) -> FeedError {
    error!("storage error: {:#}", e);
    FeedError::network(e)
}

fn clamp_limit(limit: usize) -> u32 {
    u32::try_from(limit).unwrap_or(u32::MAX)
}

/// Direct conversations must exist before they can be read or written.
fn require_conversation(db: &Database, conversation: &ConversationId) -> Result<(), FeedError> {
    if let ConversationId::Direct(id) = conversation {
        if db.get_dm_conversation(id).map_err(storage_error)?.is_none() {
            return Err(FeedError::NotFound(format!("conversation {}", conversation)));
        }
    }
    Ok(())
}

#[async_trait]
impl MessageBackend for SqliteBackend {
    async fn fetch_page(
        &self,
        conversation: &ConversationId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Message>, FeedError> {
        let key = conversation.to_string();
        let before = before.map(format_timestamp);
        let rows = self
            .blocking(move |db| {
                db.get_messages(&key, clamp_limit(limit), before.as_deref())
                    .map_err(storage_error)
            })
            .await?;
        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    async fn fetch_since(
        &self,
        conversation: &ConversationId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, FeedError> {
        let key = conversation.to_string();
        let after = format_timestamp(after);
        let rows = self
            .blocking(move |db| {
                db.get_messages_after(&key, &after, clamp_limit(limit))
                    .map_err(storage_error)
            })
            .await?;
        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    async fn insert(
        &self,
        conversation: &ConversationId,
        draft: MessageDraft,
    ) -> Result<Message, FeedError> {
        let target = conversation.clone();
        let message = self
            .blocking(move |db| {
                require_conversation(db, &target)?;

                let created_at = Utc::now();
                let row = MessageRow {
                    id: Uuid::new_v4().to_string(),
                    conversation_id: target.to_string(),
                    content: draft.content,
                    user_id: draft.author_user_id,
                    user_name: draft.author_display_name,
                    avatar_color: draft.author_avatar_color,
                    avatar_url: draft.author_avatar_url,
                    hearts_count: 0,
                    created_at: format_timestamp(created_at),
                };
                db.insert_message(&row).map_err(storage_error)?;
                if let ConversationId::Direct(id) = &target {
                    db.touch_dm_conversation(id, &row.created_at)
                        .map_err(storage_error)?;
                }
                Ok(row.into_message())
            })
            .await?;

        info!(message_id = %message.id, conversation = %conversation, "message stored");
        self.dispatcher.broadcast(conversation.clone(), message.clone());
        Ok(message)
    }

    async fn subscribe_inserts(
        &self,
        conversation: &ConversationId,
    ) -> Result<Subscription, FeedError> {
        let target = conversation.clone();
        self.blocking(move |db| require_conversation(db, &target)).await?;
        Ok(self.dispatcher.subscribe(conversation.clone()))
    }

    async fn update_hearts_count(&self, message_id: &str, new_count: u32) -> Result<(), FeedError> {
        let id = message_id.to_string();
        let updated = self
            .blocking(move |db| db.update_hearts_count(&id, new_count).map_err(storage_error))
            .await?;
        if updated {
            Ok(())
        } else {
            Err(FeedError::NotFound(format!("message {}", message_id)))
        }
    }
}
