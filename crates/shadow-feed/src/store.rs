//! The ordered, de-duplicated message list for one conversation.
//!
//! Order is fixed at insertion time and never re-sorted: older pages are
//! spliced in front, live messages are appended at the tail.

use std::collections::HashSet;

use shadow_types::Message;

#[derive(Debug, Clone, Default)]
pub struct MessageFeed {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.messages.iter().position(|m| m.id == id)
    }

    /// Replace the contents with the newest page (newest first, as the
    /// backend returns it). Messages already held that are newer than the
    /// whole page (live arrivals that raced the fetch) are kept at the tail.
    pub fn replace_with_page(&mut self, newest_first: Vec<Message>) -> usize {
        let page = ascending(newest_first);
        let page_newest = page.last().map(|m| m.created_at);
        let held = std::mem::take(&mut self.messages);
        self.ids.clear();

        for message in page {
            self.push_unique(message);
        }
        for message in held {
            if page_newest.is_none_or(|newest| message.created_at > newest) {
                self.push_unique(message);
            }
        }
        self.messages.len()
    }

    /// Splice an older page (newest first) in front. Ids already present are
    /// dropped. Returns the number of rows inserted at the head.
    pub fn prepend_older(&mut self, newest_first: Vec<Message>) -> usize {
        let mut unique = Vec::with_capacity(newest_first.len());
        for message in ascending(newest_first) {
            if self.ids.insert(message.id.clone()) {
                unique.push(message);
            }
        }
        let inserted = unique.len();
        if inserted > 0 {
            self.messages.splice(0..0, unique);
        }
        inserted
    }

    /// Idempotent tail insert. Returns false if the id was already present.
    pub fn append(&mut self, message: Message) -> bool {
        self.push_unique(message)
    }

    /// Append an ascending batch; returns how many were new.
    pub fn append_all(&mut self, oldest_first: Vec<Message>) -> usize {
        let mut added = 0;
        for message in oldest_first {
            if self.push_unique(message) {
                added += 1;
            }
        }
        added
    }

    /// Bump the hearts counter by one. Returns the row index and new count.
    pub fn increment_hearts(&mut self, id: &str) -> Option<(usize, u32)> {
        let index = self.position(id)?;
        let message = &mut self.messages[index];
        message.hearts_count = message.hearts_count.saturating_add(1);
        Some((index, message.hearts_count))
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    fn push_unique(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

/// Reverse a newest-first page and stable-sort it by timestamp, so a backend
/// that returns ties or slightly unordered rows still yields ascending order.
fn ascending(mut newest_first: Vec<Message>) -> Vec<Message> {
    newest_first.reverse();
    newest_first.sort_by_key(|m| m.created_at);
    newest_first
}
