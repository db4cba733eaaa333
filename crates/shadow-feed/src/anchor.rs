//! Scroll anchoring: where the viewport settles after each feed mutation.
//!
//! Priority per update cycle:
//! 1. the first render that shows any message pins to the bottom;
//! 2. rows inserted above the viewport shift the offset by their height;
//! 3. a tail append pins to the bottom only if the reader was within the
//!    proximity threshold of it;
//! 4. anything else leaves the offset alone.

/// Distance from the bottom (px) still treated as "at the bottom" when
/// deciding whether measurement changes should re-pin.
const PIN_TOLERANCE_PX: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorMode {
    PinnedBottom,
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorState {
    pub mode: AnchorMode,
    /// Offset last reported by the UI.
    pub last_known_scroll_top: f64,
    /// Corrections issued since that report, not yet echoed back.
    pub pending_height_delta: f64,
}

impl Default for AnchorState {
    fn default() -> Self {
        Self {
            mode: AnchorMode::PinnedBottom,
            last_known_scroll_top: 0.0,
            pending_height_delta: 0.0,
        }
    }
}

/// What one feed mutation did to the row list.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeedUpdate {
    pub prepended_rows: usize,
    /// Height added above the previous first row, including any change to
    /// that row itself.
    pub prepended_height: f64,
    pub appended_rows: usize,
}

impl FeedUpdate {
    pub fn appended(rows: usize) -> Self {
        Self {
            appended_rows: rows,
            ..Self::default()
        }
    }

    pub fn prepended(rows: usize, height: f64) -> Self {
        Self {
            prepended_rows: rows,
            prepended_height: height,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrollAnchorController {
    state: AnchorState,
    viewport_height: f64,
    bottom_proximity: f64,
    cold_started: bool,
}

impl ScrollAnchorController {
    pub fn new(bottom_proximity: f64) -> Self {
        Self {
            state: AnchorState::default(),
            viewport_height: 0.0,
            bottom_proximity,
            cold_started: false,
        }
    }

    pub fn state(&self) -> AnchorState {
        self.state
    }

    /// Where the viewport is expected to be once pending corrections land.
    #[inline]
    pub fn scroll_top(&self) -> f64 {
        self.state.last_known_scroll_top + self.state.pending_height_delta
    }

    #[inline]
    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    pub fn has_cold_started(&self) -> bool {
        self.cold_started
    }

    pub fn distance_from_bottom(&self, scrollable_height: f64) -> f64 {
        (scrollable_height - (self.scroll_top() + self.viewport_height)).max(0.0)
    }

    /// The UI reported its real offset. Pending corrections are now
    /// reflected in it.
    pub fn on_scroll(&mut self, scroll_top: f64, viewport_height: f64, scrollable_height: f64) {
        self.state.last_known_scroll_top = scroll_top.max(0.0);
        self.state.pending_height_delta = 0.0;
        self.viewport_height = viewport_height.max(0.0);
        self.state.mode = if self.distance_from_bottom(scrollable_height) <= PIN_TOLERANCE_PX {
            AnchorMode::PinnedBottom
        } else {
            AnchorMode::Free
        };
    }

    /// Decide the correction for one feed mutation. `height_before` is the
    /// scrollable height before the mutation, `height_after` after it.
    pub fn on_feed_update(
        &mut self,
        update: FeedUpdate,
        height_before: f64,
        height_after: f64,
    ) -> Option<f64> {
        let grew = update.prepended_rows + update.appended_rows > 0;
        if !grew {
            return None;
        }

        if !self.cold_started {
            self.cold_started = true;
            return self.pin_to_bottom(height_after);
        }

        if update.prepended_rows > 0 {
            return self.shift_by(update.prepended_height);
        }

        if self.distance_from_bottom(height_before) <= self.bottom_proximity {
            return self.pin_to_bottom(height_after);
        }

        None
    }

    /// A row's measured height changed by `delta`. `row_top` and
    /// `old_height` describe the row before the change.
    pub fn on_row_resized(
        &mut self,
        row_top: f64,
        old_height: f64,
        delta: f64,
        height_after: f64,
    ) -> Option<f64> {
        if !self.cold_started || delta == 0.0 {
            return None;
        }
        if self.state.mode == AnchorMode::PinnedBottom {
            return self.pin_to_bottom(height_after);
        }
        if row_top + old_height <= self.scroll_top() {
            return self.shift_by(delta);
        }
        None
    }

    /// Forget everything; the next render is a cold start again.
    pub fn reset(&mut self) {
        self.state = AnchorState::default();
        self.cold_started = false;
    }

    fn pin_to_bottom(&mut self, scrollable_height: f64) -> Option<f64> {
        self.state.mode = AnchorMode::PinnedBottom;
        let target = (scrollable_height - self.viewport_height).max(0.0);
        self.apply(target - self.scroll_top())
    }

    fn shift_by(&mut self, delta: f64) -> Option<f64> {
        // Never push the offset above the top edge.
        let delta = delta.max(-self.scroll_top());
        self.apply(delta)
    }

    fn apply(&mut self, delta: f64) -> Option<f64> {
        if delta.abs() < f64::EPSILON {
            return None;
        }
        self.state.pending_height_delta += delta;
        Some(delta)
    }
}
