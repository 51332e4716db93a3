//! Headless row layout for the virtualized feed.
//!
//! Heights are cached per post id, so reordering or removing rows never attributes a
//! measurement to the wrong post. Row offsets are prefix sums that stay valid up to the lowest
//! invalidated row and are recomputed from there on demand.

use std::collections::HashMap;
use std::ops::Range;

use crate::models::PostId;

#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Height assumed for rows that have not been measured
    pub default_height: f64,
    /// Floor applied to every row height
    pub min_height: f64,
    /// Rows rendered beyond each edge of the viewport
    pub overscan: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            default_height: 400.0,
            min_height: 250.0,
            overscan: 3,
        }
    }
}

#[derive(Debug)]
pub struct RowLayout {
    config: LayoutConfig,
    keys: Vec<PostId>,
    index_of: HashMap<PostId, usize>,
    measured: HashMap<PostId, f64>,
    /// `offsets[i]` is the top of row `i`; `offsets[len]` is the total height
    offsets: Vec<f64>,
    /// Number of leading entries of `offsets` known to be correct
    valid: usize,
    rows_recomputed: usize,
}

impl RowLayout {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            keys: Vec::new(),
            index_of: HashMap::new(),
            measured: HashMap::new(),
            offsets: vec![0.0],
            valid: 1,
            rows_recomputed: 0,
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, index: usize) -> Option<PostId> {
        self.keys.get(index).copied()
    }

    pub fn index_of(&self, post_id: PostId) -> Option<usize> {
        self.index_of.get(&post_id).copied()
    }

    /// First row whose offset is stale, if any.
    pub fn dirty_from(&self) -> Option<usize> {
        (self.valid <= self.keys.len()).then(|| self.valid - 1)
    }

    /// Total row offsets recomputed since creation.
    pub fn rows_recomputed(&self) -> usize {
        self.rows_recomputed
    }

    /// Replace the row sequence. When the new sequence extends the old one, only the appended
    /// rows are laid out again; otherwise layout restarts at the first differing row.
    pub fn set_rows(&mut self, keys: Vec<PostId>) {
        let common = self
            .keys
            .iter()
            .zip(&keys)
            .take_while(|(a, b)| a == b)
            .count();
        if common == self.keys.len() && common == keys.len() {
            return;
        }

        for (index, key) in keys.iter().enumerate().skip(common) {
            self.index_of.insert(*key, index);
        }
        for key in &self.keys[common..] {
            if self.index_of.get(key).is_some_and(|i| keys.get(*i) != Some(key)) {
                self.index_of.remove(key);
            }
        }

        self.keys = keys;
        self.offsets.resize(self.keys.len() + 1, 0.0);
        self.mark_dirty(common);
    }

    /// Height used for the row at `index`.
    pub fn height(&self, index: usize) -> f64 {
        let height = self
            .keys
            .get(index)
            .and_then(|key| self.measured.get(key))
            .copied()
            .unwrap_or(self.config.default_height);
        height.max(self.config.min_height)
    }

    pub fn is_measured(&self, post_id: PostId) -> bool {
        self.measured.contains_key(&post_id)
    }

    /// Record a measured height. Returns true if layout changed.
    pub fn measure(&mut self, post_id: PostId, height: f64) -> bool {
        if self.measured.get(&post_id) == Some(&height) {
            return false;
        }
        self.measured.insert(post_id, height);
        if let Some(index) = self.index_of(post_id) {
            self.mark_dirty(index);
        }
        true
    }

    /// Forget a row's measurement so it is measured again on next render.
    pub fn invalidate(&mut self, post_id: PostId) {
        self.measured.remove(&post_id);
        if let Some(index) = self.index_of(post_id) {
            self.mark_dirty(index);
        }
    }

    /// Forget every measurement.
    pub fn clear_measurements(&mut self) {
        self.measured.clear();
        self.mark_dirty(0);
    }

    fn mark_dirty(&mut self, index: usize) {
        self.valid = self.valid.min(index + 1);
    }

    fn ensure_offsets(&mut self) {
        let len = self.keys.len();
        if self.valid > len {
            return;
        }
        for index in (self.valid - 1)..len {
            self.offsets[index + 1] = self.offsets[index] + self.height(index);
        }
        self.rows_recomputed += len + 1 - self.valid;
        self.valid = len + 1;
    }

    /// Top offset of the row at `index`.
    pub fn row_top(&mut self, index: usize) -> f64 {
        self.ensure_offsets();
        self.offsets[index.min(self.keys.len())]
    }

    pub fn total_height(&mut self) -> f64 {
        self.ensure_offsets();
        self.offsets[self.keys.len()]
    }

    /// Row containing `offset`, clamped to the last row.
    pub fn index_at_offset(&mut self, offset: f64) -> usize {
        self.ensure_offsets();
        let len = self.keys.len();
        if len == 0 {
            return 0;
        }
        let index = self.offsets[..len].partition_point(|&top| top <= offset);
        index.saturating_sub(1).min(len - 1)
    }

    /// Rows intersecting the viewport, widened by the overscan on both sides.
    pub fn visible_range(&mut self, scroll_offset: f64, viewport_height: f64) -> Range<usize> {
        let len = self.keys.len();
        if len == 0 {
            return 0..0;
        }
        let first = self.index_at_offset(scroll_offset.max(0.0));
        let last = self.index_at_offset(scroll_offset.max(0.0) + viewport_height.max(0.0));
        let start = first.saturating_sub(self.config.overscan);
        let end = (last + 1 + self.config.overscan).min(len);
        start..end
    }
}
