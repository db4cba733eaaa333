use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which feed a message belongs to: the shared group room or one direct
/// conversation between two users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConversationId {
    Group,
    Direct(String),
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group => write!(f, "group"),
            Self::Direct(id) => write!(f, "dm:{}", id),
        }
    }
}

impl FromStr for ConversationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(Self::Group),
            _ => match s.strip_prefix("dm:") {
                Some(id) if !id.is_empty() => Ok(Self::Direct(id.to_string())),
                _ => Err(format!("invalid conversation '{}': expected 'group' or 'dm:<id>'", s)),
            },
        }
    }
}

/// A chat message as the backend returns it.
///
/// Everything except `hearts_count` is immutable once the server has
/// assigned `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub author_user_id: String,
    pub author_display_name: String,
    pub author_avatar_color: String,
    pub author_avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub hearts_count: u32,
}

/// A message before the server has assigned its id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub content: String,
    pub author_user_id: String,
    pub author_display_name: String,
    pub author_avatar_color: String,
    pub author_avatar_url: Option<String>,
}

/// A direct conversation between two users. The pair is stored ordered so
/// that (a, b) and (b, a) resolve to the same conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmConversation {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub updated_at: DateTime<Utc>,
}

impl DmConversation {
    pub fn conversation_id(&self) -> ConversationId {
        ConversationId::Direct(self.id.clone())
    }

    /// The participant that isn't `user_id`.
    pub fn other_user(&self, user_id: &str) -> &str {
        if self.user1_id == user_id {
            &self.user2_id
        } else {
            &self.user1_id
        }
    }
}
