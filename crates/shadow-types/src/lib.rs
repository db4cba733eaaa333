//! Shared types for ShadowMessage: the message model, feed events, the error
//! taxonomy and the backend seam the feed core talks through.

pub mod backend;
pub mod error;
pub mod events;
pub mod models;

pub use backend::{LiveEvent, MessageBackend, Subscription};
pub use error::FeedError;
pub use events::{FeedEvent, LoadStage};
pub use models::{ConversationId, DmConversation, Message, MessageDraft};
