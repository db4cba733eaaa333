//! Height-virtualized render window over the feed.
//!
//! Row tops are a memoized prefix sum over the height cache. A changed
//! measurement only truncates the memo after that row; tops are recomputed
//! lazily, and only as far as the next query needs them.

use std::ops::RangeInclusive;

use crate::height_cache::RowHeightCache;

/// Position of one rendered row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowPlacement {
    pub index: usize,
    pub offset_px: f64,
    pub height_px: f64,
}

#[derive(Debug, Clone)]
pub struct VirtualViewport {
    heights: RowHeightCache,
    row_count: usize,
    overscan: usize,
    /// `tops[i]` is the top of row `i`; `tops[row_count]` is the end of the
    /// list. Only the first `tops.len()` entries are valid.
    tops: Vec<f64>,
}

impl VirtualViewport {
    pub fn new(default_row_height: f64, overscan: usize) -> Self {
        Self {
            heights: RowHeightCache::new(default_row_height),
            row_count: 0,
            overscan,
            tops: vec![0.0],
        }
    }

    pub fn heights(&self) -> &RowHeightCache {
        &self.heights
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Total scrollable height: every row's cached-or-default height.
    #[inline]
    pub fn total_height(&self) -> f64 {
        self.heights.total_height(self.row_count)
    }

    #[inline]
    pub fn row_height(&self, index: usize) -> f64 {
        self.heights.get(index)
    }

    /// `k` rows were added at the tail. Existing tops stay valid.
    pub fn append_rows(&mut self, k: usize) {
        self.row_count += k;
    }

    /// `k` rows were added at the head. Measurements shift by `k`; every
    /// memoized top is stale.
    pub fn insert_rows_at_head(&mut self, k: usize) {
        if k == 0 {
            return;
        }
        self.heights.shift_for_head_insert(k);
        self.row_count += k;
        self.invalidate_tops_after(0);
    }

    /// Record a measured height. Returns the change in the row's height.
    pub fn measure(&mut self, index: usize, height: f64) -> f64 {
        if index >= self.row_count {
            return 0.0;
        }
        let delta = self.heights.set(index, height);
        if delta != 0.0 {
            self.invalidate_tops_after(index);
        }
        delta
    }

    /// The row's content changed: drop its measurement. Returns the change
    /// in the row's height.
    pub fn invalidate_row(&mut self, index: usize) -> f64 {
        let delta = self.heights.invalidate(index);
        if delta != 0.0 {
            self.invalidate_tops_after(index);
        }
        delta
    }

    pub fn reset(&mut self) {
        self.heights.clear();
        self.row_count = 0;
        self.tops.truncate(1);
    }

    /// Top offset of row `index` (or the list end for `index == row_count`).
    pub fn row_top(&mut self, index: usize) -> f64 {
        let index = index.min(self.row_count);
        self.extend_tops_to(index);
        self.tops[index]
    }

    /// Smallest contiguous range covering `[scroll_top, scroll_top +
    /// viewport_height)`, widened by the overscan on both sides.
    pub fn visible_range(
        &mut self,
        scroll_top: f64,
        viewport_height: f64,
    ) -> Option<RangeInclusive<usize>> {
        if self.row_count == 0 {
            return None;
        }
        let top = scroll_top.max(0.0);
        let bottom = top + viewport_height.max(0.0);
        self.extend_tops_past(bottom);

        let known_rows = self.tops.len() - 1;
        let ends = &self.tops[1..];
        // First row whose end lies below the top edge.
        let first = ends.partition_point(|&end| end <= top).min(self.row_count - 1);
        // Last row whose top lies above the bottom edge.
        let tops = &self.tops[..known_rows];
        let last = tops
            .partition_point(|&t| t < bottom)
            .saturating_sub(1)
            .max(first)
            .min(self.row_count - 1);

        let first = first.saturating_sub(self.overscan);
        let last = (last + self.overscan).min(self.row_count - 1);
        Some(first..=last)
    }

    /// Placement of every row in the render window.
    pub fn render_window(&mut self, scroll_top: f64, viewport_height: f64) -> Vec<RowPlacement> {
        let Some(range) = self.visible_range(scroll_top, viewport_height) else {
            return Vec::new();
        };
        let end = *range.end();
        self.extend_tops_to(end + 1);
        range
            .map(|index| RowPlacement {
                index,
                offset_px: self.tops[index],
                height_px: self.heights.get(index),
            })
            .collect()
    }

    /// Largest valid scroll offset for a viewport of the given height.
    pub fn max_scroll_top(&self, viewport_height: f64) -> f64 {
        (self.total_height() - viewport_height).max(0.0)
    }

    #[cfg(test)]
    fn memoized_tops(&self) -> usize {
        self.tops.len()
    }

    fn invalidate_tops_after(&mut self, index: usize) {
        self.tops.truncate(index + 1);
    }

    fn extend_tops_to(&mut self, index: usize) {
        let index = index.min(self.row_count);
        while self.tops.len() <= index {
            let row = self.tops.len() - 1;
            let next = self.tops[row] + self.heights.get(row);
            self.tops.push(next);
        }
    }

    /// Extend the memo until it reaches past `offset` or covers every row.
    fn extend_tops_past(&mut self, offset: f64) {
        while self.tops.len() <= self.row_count && self.tops[self.tops.len() - 1] <= offset {
            let row = self.tops.len() - 1;
            let next = self.tops[row] + self.heights.get(row);
            self.tops.push(next);
        }
    }
}
