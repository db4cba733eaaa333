//! Incrementally loaded, realtime-updated message feed with a
//! height-virtualized render window and scroll anchoring.
//!
//! - [`store`]: ordered, de-duplicated message list
//! - [`pagination`]: older-page cursor and single-flight state machine
//! - [`anchor`]: scroll position policy after each mutation
//! - [`height_cache`] / [`viewport`]: row metrics and the render window
//! - [`session`]: ties the above to a [`MessageBackend`](shadow_types::MessageBackend)
//! - [`live`]: realtime subscription pump

pub mod anchor;
pub mod config;
pub mod date_group;
pub mod height_cache;
pub mod live;
pub mod pagination;
pub mod session;
pub mod store;
pub mod viewport;

pub use anchor::{AnchorMode, AnchorState, FeedUpdate, ScrollAnchorController};
pub use config::{FeedConfig, ReconnectPolicy};
pub use height_cache::RowHeightCache;
pub use live::run_live_feed;
pub use pagination::{PaginationController, PaginationCursor, PaginationState};
pub use session::{FeedSession, FeedStatus, RowContent, VisibleRow};
pub use store::MessageFeed;
pub use viewport::{RowPlacement, VirtualViewport};
