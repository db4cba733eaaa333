//! One conversation's feed, end to end: fetches, live merges, scroll
//! anchoring and the render window, behind a single lock.
//!
//! The lock is never held across a backend call. Each fetch captures the
//! epoch and load generation it started under. Switching conversations bumps
//! the epoch, reloading bumps the generation, and a result that comes back
//! under an older one of either is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{FixedOffset, NaiveDate, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use shadow_types::{
    ConversationId, FeedError, FeedEvent, LoadStage, Message, MessageBackend, MessageDraft,
};

use crate::anchor::{AnchorState, FeedUpdate, ScrollAnchorController};
use crate::config::FeedConfig;
use crate::date_group::{divider_label, starts_new_day};
use crate::pagination::{PaginationController, PaginationCursor, PaginationState};
use crate::store::MessageFeed;
use crate::viewport::VirtualViewport;

/// Capacity of the per-session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State of the initial load, which drives the full-view UI.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedStatus {
    Idle,
    Loading,
    Ready,
    Failed(FeedError),
}

/// What a row shows.
#[derive(Debug, Clone, PartialEq)]
pub struct RowContent {
    pub message: Message,
    /// Set when this message opens a new day.
    pub date_label: Option<String>,
}

/// One row of the render window.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleRow {
    pub index: usize,
    pub key: String,
    pub content: RowContent,
    pub offset_px: f64,
    pub height_px: f64,
}

struct FeedState {
    conversation: ConversationId,
    epoch: u64,
    /// Bumped by every initial (re)load.
    generation: u64,
    status: FeedStatus,
    older_error: Option<FeedError>,
    feed: MessageFeed,
    pagination: PaginationController,
    anchor: ScrollAnchorController,
    viewport: VirtualViewport,
}

impl FeedState {
    fn new(conversation: ConversationId, config: &FeedConfig) -> Self {
        Self {
            conversation,
            epoch: 0,
            generation: 0,
            status: FeedStatus::Idle,
            older_error: None,
            feed: MessageFeed::new(),
            pagination: PaginationController::new(
                config.page_size,
                config.near_top_threshold_px,
            ),
            anchor: ScrollAnchorController::new(config.bottom_proximity_px),
            viewport: VirtualViewport::new(config.default_row_height_px, config.overscan_rows),
        }
    }

    fn is_current(&self, epoch: u64, generation: u64) -> bool {
        self.epoch == epoch && self.generation == generation
    }

    fn changed(&self) -> FeedEvent {
        FeedEvent::FeedChanged {
            conversation: self.conversation.clone(),
            len: self.feed.len(),
        }
    }

    fn failed(&self, stage: LoadStage, err: &FeedError) -> FeedEvent {
        FeedEvent::LoadFailed {
            conversation: self.conversation.clone(),
            stage,
            reason: err.to_string(),
        }
    }

    /// Record a measured height for row `index`, or forget it with `None`,
    /// and run the anchor's resize rule. Returns the scroll correction.
    fn resize_row(&mut self, index: usize, height: Option<f64>) -> Option<f64> {
        let row_top = self.viewport.row_top(index);
        let old_height = self.viewport.row_height(index);
        let delta = match height {
            Some(height) => self.viewport.measure(index, height),
            None => self.viewport.invalidate_row(index),
        };
        if delta == 0.0 {
            return None;
        }
        let height_after = self.viewport.total_height();
        self.anchor
            .on_row_resized(row_top, old_height, delta, height_after)
    }

    /// Append a batch at the tail and run the anchor rules over it.
    fn append_batch(&mut self, messages: Vec<Message>, events: &mut Vec<FeedEvent>) -> usize {
        let newest = messages.iter().map(|m| m.created_at).max();
        let added = self.feed.append_all(messages);
        if let Some(newest) = newest {
            self.pagination.observe_newer(newest);
        }
        if added == 0 {
            return 0;
        }

        let height_before = self.viewport.total_height();
        self.viewport.append_rows(added);
        let height_after = self.viewport.total_height();

        events.push(self.changed());
        if let Some(delta) =
            self.anchor
                .on_feed_update(FeedUpdate::appended(added), height_before, height_after)
        {
            events.push(FeedEvent::ScrollCorrectionNeeded { delta_px: delta });
        }
        added
    }
}

pub struct FeedSession {
    backend: Arc<dyn MessageBackend>,
    config: FeedConfig,
    tz: FixedOffset,
    events: broadcast::Sender<FeedEvent>,
    epoch_tx: watch::Sender<u64>,
    state: Mutex<FeedState>,
}

impl FeedSession {
    pub fn new(
        backend: Arc<dyn MessageBackend>,
        conversation: ConversationId,
        config: FeedConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (epoch_tx, _) = watch::channel(0);
        Self {
            backend,
            tz: config.time_zone(),
            state: Mutex::new(FeedState::new(conversation, &config)),
            config,
            events,
            epoch_tx,
        }
    }

    pub fn backend(&self) -> &Arc<dyn MessageBackend> {
        &self.backend
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Receive `FeedChanged`, `ScrollCorrectionNeeded` and `LoadFailed`.
    pub fn subscribe_events(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    /// Fires whenever the session switches conversation.
    pub fn epoch_changes(&self) -> watch::Receiver<u64> {
        self.epoch_tx.subscribe()
    }

    pub fn conversation(&self) -> ConversationId {
        self.lock().conversation.clone()
    }

    /// Current conversation together with the epoch it was selected under.
    pub fn scope(&self) -> (ConversationId, u64) {
        let st = self.lock();
        (st.conversation.clone(), st.epoch)
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn status(&self) -> FeedStatus {
        self.lock().status.clone()
    }

    /// Last older-page failure, cleared by the next successful page.
    pub fn older_error(&self) -> Option<FeedError> {
        self.lock().older_error.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().feed.messages().to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().feed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().feed.is_empty()
    }

    pub fn cursor(&self) -> PaginationCursor {
        self.lock().pagination.cursor()
    }

    pub fn is_loading_older(&self) -> bool {
        self.lock().pagination.state() == PaginationState::LoadingOlder
    }

    pub fn anchor_state(&self) -> AnchorState {
        self.lock().anchor.state()
    }

    /// Offset the viewport is expected at once issued corrections land.
    pub fn scroll_top(&self) -> f64 {
        self.lock().anchor.scroll_top()
    }

    pub fn total_height(&self) -> f64 {
        self.lock().viewport.total_height()
    }

    /// Cached row heights, for inspection.
    pub fn row_heights(&self) -> Vec<(usize, f64)> {
        self.lock().viewport.heights().entries()
    }

    /// Fetch the newest page and replace the feed with it.
    pub async fn load_initial_page(&self) -> Result<Vec<Message>, FeedError> {
        let (conversation, epoch, generation) = {
            let mut st = self.lock();
            st.generation += 1;
            st.status = FeedStatus::Loading;
            st.pagination.abandon_older();
            (st.conversation.clone(), st.epoch, st.generation)
        };
        debug!(conversation = %conversation, epoch, "loading initial page");

        let result = self
            .backend
            .fetch_page(&conversation, None, self.config.page_size)
            .await;

        let mut events = Vec::new();
        let outcome = {
            let mut st = self.lock();
            if !st.is_current(epoch, generation) {
                debug!(conversation = %conversation, epoch, generation, "discarding stale initial page");
                return Ok(Vec::new());
            }
            match result {
                Err(err) => {
                    warn!(conversation = %conversation, "initial page failed: {}", err);
                    st.status = FeedStatus::Failed(err.clone());
                    events.push(st.failed(LoadStage::Initial, &err));
                    Err(err)
                }
                Ok(page) => {
                    let fetched = page.len();
                    st.pagination.reset_from_initial(&page);
                    st.feed.replace_with_page(page);
                    if let Some(newest) = st.feed.messages().last().map(|m| m.created_at) {
                        st.pagination.observe_newer(newest);
                    }

                    let rows = st.feed.len();
                    st.viewport.reset();
                    st.viewport.append_rows(rows);
                    st.anchor.reset();
                    st.status = FeedStatus::Ready;
                    st.older_error = None;

                    let height_after = st.viewport.total_height();
                    events.push(st.changed());
                    if let Some(delta) =
                        st.anchor
                            .on_feed_update(FeedUpdate::appended(rows), 0.0, height_after)
                    {
                        events.push(FeedEvent::ScrollCorrectionNeeded { delta_px: delta });
                    }
                    info!(conversation = %conversation, fetched, rows, "initial page loaded");
                    Ok(st.feed.messages().to_vec())
                }
            }
        };
        self.emit(events);
        outcome
    }

    /// Fetch the page before the oldest loaded message and splice it in
    /// front. Returns the number of rows inserted; 0 without a network call
    /// when a fetch is already in flight, the feed is (re)loading, history
    /// is exhausted or nothing is loaded yet.
    pub async fn load_older_page(&self) -> Result<usize, FeedError> {
        let (conversation, epoch, generation, request) = {
            let mut st = self.lock();
            if st.status == FeedStatus::Loading {
                return Ok(0);
            }
            let Some(request) = st.pagination.begin_older() else {
                return Ok(0);
            };
            (st.conversation.clone(), st.epoch, st.generation, request)
        };
        debug!(conversation = %conversation, before = %request.before, "loading older page");

        let result = self
            .backend
            .fetch_page(&conversation, Some(request.before), request.limit)
            .await;

        let mut events = Vec::new();
        let outcome = {
            let mut st = self.lock();
            if !st.is_current(epoch, generation) {
                debug!(conversation = %conversation, epoch, generation, "discarding stale older page");
                return Ok(0);
            }
            match result {
                Err(err) => {
                    warn!(conversation = %conversation, "older page failed: {}", err);
                    st.pagination.fail_older();
                    st.older_error = Some(err.clone());
                    events.push(st.failed(LoadStage::Older, &err));
                    Err(err)
                }
                Ok(page) => {
                    st.pagination.finish_older(&page);
                    st.older_error = None;

                    let height_before = st.viewport.total_height();
                    let inserted = st.feed.prepend_older(page);
                    if inserted > 0 {
                        st.viewport.insert_rows_at_head(inserted);
                        // The old head used to open the first day; if the new
                        // rows end on that same day its divider is gone.
                        let lost_divider = {
                            let messages = st.feed.messages();
                            !starts_new_day(
                                Some(&messages[inserted - 1]),
                                &messages[inserted],
                                &self.tz,
                            )
                        };
                        if lost_divider {
                            st.viewport.invalidate_row(inserted);
                        }
                        let height_after = st.viewport.total_height();

                        events.push(st.changed());
                        let update =
                            FeedUpdate::prepended(inserted, height_after - height_before);
                        if let Some(delta) =
                            st.anchor.on_feed_update(update, height_before, height_after)
                        {
                            events.push(FeedEvent::ScrollCorrectionNeeded { delta_px: delta });
                        }
                    }
                    info!(
                        conversation = %conversation,
                        inserted,
                        has_more_older = st.pagination.cursor().has_more_older,
                        "older page loaded"
                    );
                    Ok(inserted)
                }
            }
        };
        self.emit(events);
        outcome
    }

    /// Idempotent tail insert of a realtime message. Returns whether the
    /// feed changed.
    pub fn append_live(&self, message: Message) -> bool {
        let epoch = self.epoch();
        self.append_live_at(epoch, message)
    }

    /// As [`append_live`](Self::append_live), but ignored unless the session
    /// is still on `epoch`.
    pub fn append_live_at(&self, epoch: u64, message: Message) -> bool {
        let mut events = Vec::new();
        let added = {
            let mut st = self.lock();
            if st.epoch != epoch {
                debug!(message_id = %message.id, "dropping live message from previous conversation");
                return false;
            }
            st.append_batch(vec![message], &mut events) > 0
        };
        self.emit(events);
        added
    }

    /// Pull messages newer than the newest one held, e.g. after the
    /// realtime stream reconnected or lagged.
    pub async fn catch_up(&self) -> Result<usize, FeedError> {
        let (conversation, epoch, generation, after) = {
            let st = self.lock();
            let Some(after) = st.pagination.cursor().newest_loaded_at else {
                return Ok(0);
            };
            (st.conversation.clone(), st.epoch, st.generation, after)
        };

        let result = self
            .backend
            .fetch_since(&conversation, after, self.config.catch_up_limit)
            .await;

        let mut events = Vec::new();
        let outcome = {
            let mut st = self.lock();
            if !st.is_current(epoch, generation) {
                return Ok(0);
            }
            match result {
                Err(err) => {
                    events.push(st.failed(LoadStage::CatchUp, &err));
                    Err(err)
                }
                Ok(mut newer) => {
                    newer.sort_by_key(|m| m.created_at);
                    let added = st.append_batch(newer, &mut events);
                    if added > 0 {
                        info!(conversation = %conversation, added, "caught up");
                    }
                    Ok(added)
                }
            }
        };
        self.emit(events);
        outcome
    }

    /// Insert a new message through the backend and merge it. The realtime
    /// echo of the same insert is then a no-op.
    pub async fn send_message(&self, draft: MessageDraft) -> Result<Message, FeedError> {
        let (conversation, epoch) = self.scope();
        let message = self.backend.insert(&conversation, draft).await?;
        self.append_live_at(epoch, message.clone());
        Ok(message)
    }

    /// Optimistically add one heart, then write the new count. A failed
    /// write is logged and not rolled back.
    pub async fn apply_heart_increment(&self, message_id: &str) -> Result<u32, FeedError> {
        let mut events = Vec::new();
        let count = {
            let mut st = self.lock();
            let (index, count) = st
                .feed
                .increment_hearts(message_id)
                .ok_or_else(|| FeedError::NotFound(message_id.to_string()))?;
            events.push(st.changed());
            // The row is re-measured on next render; keep content still
            // until then, and the re-measure undoes this correction.
            if let Some(correction) = st.resize_row(index, None) {
                events.push(FeedEvent::ScrollCorrectionNeeded {
                    delta_px: correction,
                });
            }
            count
        };
        self.emit(events);

        if let Err(err) = self.backend.update_hearts_count(message_id, count).await {
            warn!(message_id, count, "hearts write failed, keeping local count: {}", err);
        }
        Ok(count)
    }

    /// Scroll or resize from the UI. Requests an older page when the offset
    /// is inside the near-top band; returns how many rows that inserted.
    pub async fn on_scroll(&self, scroll_top: f64, viewport_height: f64) -> Result<usize, FeedError> {
        let wants_older = {
            let mut st = self.lock();
            let height = st.viewport.total_height();
            st.anchor.on_scroll(scroll_top, viewport_height, height);
            st.pagination.should_load_older(scroll_top)
        };
        if wants_older {
            self.load_older_page().await
        } else {
            Ok(0)
        }
    }

    /// Layout measured row `index` at `height` px.
    pub fn on_row_measured(&self, index: usize, height: f64) {
        let mut events = Vec::new();
        {
            let mut st = self.lock();
            if index >= st.viewport.row_count() {
                return;
            }
            if let Some(correction) = st.resize_row(index, Some(height)) {
                events.push(FeedEvent::ScrollCorrectionNeeded {
                    delta_px: correction,
                });
            }
        }
        self.emit(events);
    }

    /// Rows to render at the current offset, with day labels relative to
    /// today.
    pub fn get_visible_rows(&self) -> Vec<VisibleRow> {
        let today = Utc::now().with_timezone(&self.tz).date_naive();
        self.visible_rows_at(today)
    }

    pub fn visible_rows_at(&self, today: NaiveDate) -> Vec<VisibleRow> {
        let mut st = self.lock();
        let scroll_top = st.anchor.scroll_top();
        let viewport_height = st.anchor.viewport_height();
        let placements = st.viewport.render_window(scroll_top, viewport_height);
        let messages = st.feed.messages();
        placements
            .into_iter()
            .filter_map(|placement| {
                let message = messages.get(placement.index)?;
                Some(VisibleRow {
                    index: placement.index,
                    key: message.id.clone(),
                    content: RowContent {
                        message: message.clone(),
                        date_label: divider_label(messages, placement.index, today, &self.tz),
                    },
                    offset_px: placement.offset_px,
                    height_px: placement.height_px,
                })
            })
            .collect()
    }

    /// Point the session at another conversation. Everything held is
    /// dropped and in-flight fetches for the old one are ignored when they
    /// resolve.
    pub fn switch_conversation(&self, conversation: ConversationId) {
        let (epoch, event) = {
            let mut st = self.lock();
            st.epoch += 1;
            st.generation += 1;
            st.conversation = conversation;
            st.status = FeedStatus::Idle;
            st.older_error = None;
            st.feed.clear();
            st.pagination.reset();
            st.viewport.reset();
            st.anchor.reset();
            (st.epoch, st.changed())
        };
        info!(epoch, "switched conversation");
        self.epoch_tx.send_replace(epoch);
        self.emit(vec![event]);
    }

    fn emit(&self, events: Vec<FeedEvent>) {
        for event in events {
            // No receivers is fine.
            let _ = self.events.send(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
