//! Backward pagination: the cursor and the one-fetch-in-flight discipline.

use chrono::{DateTime, Utc};
use shadow_types::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Idle,
    LoadingOlder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    pub oldest_loaded_at: Option<DateTime<Utc>>,
    pub newest_loaded_at: Option<DateTime<Utc>>,
    pub has_more_older: bool,
}

impl Default for PaginationCursor {
    fn default() -> Self {
        Self {
            oldest_loaded_at: None,
            newest_loaded_at: None,
            has_more_older: true,
        }
    }
}

/// Parameters of one older-page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OlderPageRequest {
    pub before: DateTime<Utc>,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct PaginationController {
    state: PaginationState,
    cursor: PaginationCursor,
    page_size: usize,
    near_top_threshold: f64,
}

impl PaginationController {
    pub fn new(page_size: usize, near_top_threshold: f64) -> Self {
        Self {
            state: PaginationState::Idle,
            cursor: PaginationCursor::default(),
            page_size: page_size.max(1),
            near_top_threshold,
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    pub fn cursor(&self) -> PaginationCursor {
        self.cursor
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// An older page could be requested right now.
    pub fn can_load_older(&self) -> bool {
        self.state == PaginationState::Idle
            && self.cursor.has_more_older
            && self.cursor.oldest_loaded_at.is_some()
    }

    /// The viewport is inside the pre-fetch band and a fetch may start.
    pub fn should_load_older(&self, scroll_top: f64) -> bool {
        scroll_top <= self.near_top_threshold && self.can_load_older()
    }

    /// `Idle -> LoadingOlder`. Returns `None` (and stays put) when a fetch
    /// is already in flight, the history is exhausted, or nothing is loaded.
    pub fn begin_older(&mut self) -> Option<OlderPageRequest> {
        if !self.can_load_older() {
            return None;
        }
        let before = self.cursor.oldest_loaded_at?;
        self.state = PaginationState::LoadingOlder;
        Some(OlderPageRequest {
            before,
            limit: self.page_size,
        })
    }

    /// The older fetch resolved with `page` (any order).
    pub fn finish_older(&mut self, page: &[Message]) {
        self.state = PaginationState::Idle;
        if let Some(oldest) = page.iter().map(|m| m.created_at).min() {
            self.cursor.oldest_loaded_at = Some(match self.cursor.oldest_loaded_at {
                Some(current) => current.min(oldest),
                None => oldest,
            });
        }
        self.cursor.has_more_older = page.len() >= self.page_size;
    }

    /// The older fetch failed; the same cursor is retried next time.
    pub fn fail_older(&mut self) {
        self.state = PaginationState::Idle;
    }

    /// Drop any in-flight older fetch; its result will be discarded. Used
    /// when the feed is reloaded underneath it.
    pub fn abandon_older(&mut self) {
        self.state = PaginationState::Idle;
    }

    /// Seed the cursor from the initial (newest) page.
    pub fn reset_from_initial(&mut self, page: &[Message]) {
        self.state = PaginationState::Idle;
        self.cursor = PaginationCursor {
            oldest_loaded_at: page.iter().map(|m| m.created_at).min(),
            newest_loaded_at: page.iter().map(|m| m.created_at).max(),
            has_more_older: page.len() >= self.page_size,
        };
    }

    /// Track the newest timestamp seen through any path.
    pub fn observe_newer(&mut self, at: DateTime<Utc>) {
        if self.cursor.newest_loaded_at.is_none_or(|newest| at > newest) {
            self.cursor.newest_loaded_at = Some(at);
        }
    }

    pub fn reset(&mut self) {
        self.state = PaginationState::Idle;
        self.cursor = PaginationCursor::default();
    }
}
