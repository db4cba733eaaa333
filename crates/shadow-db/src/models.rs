//! Row types mirroring the SQLite tables.
//! Distinct from shadow-types models to keep the DB layer independent.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use shadow_types::{DmConversation, Message};

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub user_id: String,
    pub user_name: String,
    pub avatar_color: String,
    pub avatar_url: Option<String>,
    pub hearts_count: u32,
    pub created_at: String,
}

pub struct DmConversationRow {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub updated_at: String,
}

/// Fixed-width RFC 3339 (microseconds, `Z`) so text order is time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok()
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        let created_at = parse_timestamp(&self.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on message '{}'", self.created_at, self.id);
            DateTime::default()
        });
        Message {
            id: self.id,
            content: self.content,
            author_user_id: self.user_id,
            author_display_name: self.user_name,
            author_avatar_color: self.avatar_color,
            author_avatar_url: self.avatar_url,
            created_at,
            hearts_count: self.hearts_count,
        }
    }
}

impl DmConversationRow {
    pub fn into_conversation(self) -> DmConversation {
        let updated_at = parse_timestamp(&self.updated_at).unwrap_or_else(|| {
            warn!("Corrupt updated_at '{}' on conversation '{}'", self.updated_at, self.id);
            DateTime::default()
        });
        DmConversation {
            id: self.id,
            user1_id: self.user1_id,
            user2_id: self.user2_id,
            updated_at,
        }
    }
}
