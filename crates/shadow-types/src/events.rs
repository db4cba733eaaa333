use serde::{Deserialize, Serialize};

use crate::models::ConversationId;

/// Which fetch a [`FeedEvent::LoadFailed`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Initial,
    Older,
    CatchUp,
}

/// Events emitted by a feed session to its embedding UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// The ordered message list changed (new page, live append, hearts).
    FeedChanged {
        conversation: ConversationId,
        len: usize,
    },

    /// The UI must move its scroll offset by `delta_px` before painting.
    ScrollCorrectionNeeded { delta_px: f64 },

    /// A fetch failed. Feed contents are untouched.
    LoadFailed {
        conversation: ConversationId,
        stage: LoadStage,
        reason: String,
    },
}

impl FeedEvent {
    /// Returns the conversation this event is scoped to, if any.
    pub fn conversation(&self) -> Option<&ConversationId> {
        match self {
            Self::FeedChanged { conversation, .. } => Some(conversation),
            Self::LoadFailed { conversation, .. } => Some(conversation),
            Self::ScrollCorrectionNeeded { .. } => None,
        }
    }
}
