#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Notify, broadcast};

use shadow_feed::FeedConfig;
use shadow_types::{
    ConversationId, FeedError, Message, MessageBackend, MessageDraft, Subscription,
};

/// 09:00 UTC on 2026-01-`day`, plus `minutes`.
pub fn at(day: u32, minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, 9, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

pub fn message(id: &str, created_at: DateTime<Utc>) -> Message {
    Message {
        id: id.into(),
        content: format!("body of {}", id),
        author_user_id: "u1".into(),
        author_display_name: "Ann".into(),
        author_avatar_color: "#aa3355".into(),
        author_avatar_url: None,
        created_at,
        hearts_count: 0,
    }
}

/// `m{first}..=m{last}` one minute apart on 2026-01-05.
pub fn run(first: usize, last: usize) -> Vec<Message> {
    (first..=last)
        .map(|i| message(&format!("m{}", i), at(5, i as i64)))
        .collect()
}

pub fn ids(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.id.clone()).collect()
}

pub fn test_config(page_size: usize) -> FeedConfig {
    FeedConfig {
        page_size,
        default_row_height_px: 100.0,
        overscan_rows: 2,
        utc_offset_minutes: Some(0),
        ..FeedConfig::default()
    }
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// In-memory backend with knobs for failure injection and fetch gating.
pub struct ScriptedBackend {
    messages: Mutex<HashMap<ConversationId, Vec<Message>>>,
    live_tx: Mutex<broadcast::Sender<(ConversationId, Message)>>,
    live_capacity: usize,
    gate: Mutex<Option<Arc<Notify>>>,
    fail_fetch: AtomicBool,
    fail_hearts: AtomicBool,
    fail_subscribe: AtomicBool,
    pub fetches: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub hearts_writes: Mutex<Vec<(String, u32)>>,
    inserted: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Self::with_live_capacity(64)
    }

    /// A backend whose realtime channel buffers only `capacity` inserts.
    pub fn with_live_capacity(capacity: usize) -> Arc<Self> {
        let (live_tx, _) = broadcast::channel(capacity);
        Arc::new(Self {
            messages: Mutex::new(HashMap::new()),
            live_tx: Mutex::new(live_tx),
            live_capacity: capacity,
            gate: Mutex::new(None),
            fail_fetch: AtomicBool::new(false),
            fail_hearts: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            hearts_writes: Mutex::new(Vec::new()),
            inserted: AtomicUsize::new(0),
        })
    }

    pub fn with_group(messages: Vec<Message>) -> Arc<Self> {
        let backend = Self::new();
        backend.store(&ConversationId::Group, messages);
        backend
    }

    /// Store without broadcasting.
    pub fn store(&self, conversation: &ConversationId, messages: Vec<Message>) {
        let mut all = self.messages.lock().unwrap();
        let list = all.entry(conversation.clone()).or_default();
        list.extend(messages);
        list.sort_by_key(|m| m.created_at);
    }

    /// Store and push to live subscribers.
    pub fn publish(&self, conversation: &ConversationId, message: Message) {
        self.store(conversation, vec![message.clone()]);
        let _ = self.live_tx.lock().unwrap().send((conversation.clone(), message));
    }

    /// Drop the realtime channel: open subscriptions see the stream close.
    pub fn close_live(&self) {
        let (fresh, _) = broadcast::channel(self.live_capacity);
        *self.live_tx.lock().unwrap() = fresh;
    }

    /// Every following fetch waits for one `notify_one` on the returned handle.
    pub fn hold_fetches(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Later fetches go through without waiting; ones already held still wait.
    pub fn release_fetches(&self) {
        *self.gate.lock().unwrap() = None;
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_hearts(&self, fail: bool) {
        self.fail_hearts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn live_receivers(&self) -> usize {
        self.live_tx.lock().unwrap().receiver_count()
    }

    async fn pass_gate(&self) -> Result<(), FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(FeedError::network("connection reset"));
        }
        Ok(())
    }

    fn snapshot(&self, conversation: &ConversationId) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .get(conversation)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageBackend for ScriptedBackend {
    async fn fetch_page(
        &self,
        conversation: &ConversationId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Message>, FeedError> {
        self.pass_gate().await?;
        Ok(self
            .snapshot(conversation)
            .into_iter()
            .rev()
            .filter(|m| before.is_none_or(|b| m.created_at < b))
            .take(limit)
            .collect())
    }

    async fn fetch_since(
        &self,
        conversation: &ConversationId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, FeedError> {
        self.pass_gate().await?;
        Ok(self
            .snapshot(conversation)
            .into_iter()
            .filter(|m| m.created_at > after)
            .take(limit)
            .collect())
    }

    async fn insert(
        &self,
        conversation: &ConversationId,
        draft: MessageDraft,
    ) -> Result<Message, FeedError> {
        let n = self.inserted.fetch_add(1, Ordering::SeqCst) + 1;
        let message = Message {
            id: format!("sent-{}", n),
            content: draft.content,
            author_user_id: draft.author_user_id,
            author_display_name: draft.author_display_name,
            author_avatar_color: draft.author_avatar_color,
            author_avatar_url: draft.author_avatar_url,
            created_at: at(6, n as i64),
            hearts_count: 0,
        };
        self.publish(conversation, message.clone());
        Ok(message)
    }

    async fn subscribe_inserts(
        &self,
        conversation: &ConversationId,
    ) -> Result<Subscription, FeedError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(FeedError::network("realtime unavailable"));
        }
        let rx = self.live_tx.lock().unwrap().subscribe();
        Ok(Subscription::new(conversation.clone(), rx))
    }

    async fn update_hearts_count(&self, message_id: &str, new_count: u32) -> Result<(), FeedError> {
        self.hearts_writes
            .lock()
            .unwrap()
            .push((message_id.to_string(), new_count));
        if self.fail_hearts.load(Ordering::SeqCst) {
            return Err(FeedError::network("write timed out"));
        }
        Ok(())
    }
}
