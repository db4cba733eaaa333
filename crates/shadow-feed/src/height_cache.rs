//! Last-measured pixel height per row index.
//!
//! Sparse: rows that were never measured (or whose content changed since)
//! report the default estimate. Keeps a running sum of the measured heights
//! so the total height of `n` rows is O(1).

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct RowHeightCache {
    measured: BTreeMap<usize, f64>,
    measured_sum: f64,
    default_height: f64,
}

impl RowHeightCache {
    pub fn new(default_height: f64) -> Self {
        Self {
            measured: BTreeMap::new(),
            measured_sum: 0.0,
            default_height,
        }
    }

    #[inline]
    pub fn default_height(&self) -> f64 {
        self.default_height
    }

    /// Cached height, or the default estimate when the row is unmeasured.
    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        self.measured.get(&index).copied().unwrap_or(self.default_height)
    }

    /// Whether the row has a measurement.
    #[inline]
    pub fn is_measured(&self, index: usize) -> bool {
        self.measured.contains_key(&index)
    }

    /// Store a measurement. Returns the change in the row's effective height
    /// (zero when nothing changed).
    pub fn set(&mut self, index: usize, height: f64) -> f64 {
        let height = height.max(0.0);
        let previous = self.measured.insert(index, height);
        match previous {
            Some(old) => {
                self.measured_sum += height - old;
                height - old
            }
            None => {
                self.measured_sum += height;
                height - self.default_height
            }
        }
    }

    /// Forget a row's measurement because its content changed. Returns the
    /// change in effective height.
    pub fn invalidate(&mut self, index: usize) -> f64 {
        match self.measured.remove(&index) {
            Some(old) => {
                self.measured_sum -= old;
                self.default_height - old
            }
            None => 0.0,
        }
    }

    /// `k` rows were inserted at the head: every cached index moves up by `k`
    /// and indices `0..k` are left unmeasured.
    pub fn shift_for_head_insert(&mut self, k: usize) {
        if k == 0 || self.measured.is_empty() {
            return;
        }
        self.measured = std::mem::take(&mut self.measured)
            .into_iter()
            .map(|(index, height)| (index + k, height))
            .collect();
    }

    /// Sum of effective heights of rows `0..row_count`.
    pub fn total_height(&self, row_count: usize) -> f64 {
        // Measurements at or past row_count can only exist transiently (the
        // feed never shrinks), so count them out explicitly.
        let (count, sum) = if self
            .measured
            .last_key_value()
            .is_none_or(|(&last, _)| last < row_count)
        {
            (self.measured.len(), self.measured_sum)
        } else {
            self.measured
                .range(..row_count)
                .fold((0, 0.0), |(c, s), (_, h)| (c + 1, s + h))
        };
        sum + (row_count - count) as f64 * self.default_height
    }

    /// Snapshot of all measurements, for inspection.
    pub fn entries(&self) -> Vec<(usize, f64)> {
        self.measured.iter().map(|(&i, &h)| (i, h)).collect()
    }

    pub fn len(&self) -> usize {
        self.measured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measured.is_empty()
    }

    pub fn clear(&mut self) {
        self.measured.clear();
        self.measured_sum = 0.0;
    }
}
