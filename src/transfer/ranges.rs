//! # Received Range Tracking
//!
//! Set of half-open byte ranges kept sorted and coalesced. Gaps are computed
//! by set difference, so chunks may arrive in any order and any number of
//! times.

use std::ops::Range;

/// Coalesced set of half-open `u32` ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    // Sorted, disjoint and never adjacent
    spans: Vec<Range<u32>>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `range`, merging with overlapping or adjacent spans
    ///
    /// Returns how many of its bytes were not already present.
    ///
    /// # Examples
    ///
    /// ```
    /// use log_downloader::transfer::ranges::RangeSet;
    ///
    /// let mut set = RangeSet::new();
    /// assert_eq!(set.insert(50..100), 50);
    /// assert_eq!(set.insert(0..60), 50);
    /// assert_eq!(set.spans(), &[0..100]);
    /// ```
    pub fn insert(&mut self, range: Range<u32>) -> u32 {
        if range.start >= range.end {
            return 0;
        }

        let mut added = range.end - range.start;
        let mut start = range.start;
        let mut end = range.end;
        let mut merged = Vec::with_capacity(self.spans.len() + 1);
        let mut placed = false;

        for span in std::mem::take(&mut self.spans) {
            if span.end < start {
                merged.push(span);
            } else if span.start > end {
                if !placed {
                    merged.push(start..end);
                    placed = true;
                }
                merged.push(span);
            } else {
                let overlap_start = span.start.max(range.start);
                let overlap_end = span.end.min(range.end);
                if overlap_end > overlap_start {
                    added -= overlap_end - overlap_start;
                }
                start = start.min(span.start);
                end = end.max(span.end);
            }
        }

        if !placed {
            merged.push(start..end);
        }

        self.spans = merged;
        added
    }

    /// First uncovered sub-range of `window`
    pub fn first_gap(&self, window: Range<u32>) -> Option<Range<u32>> {
        let mut cursor = window.start;

        for span in &self.spans {
            if cursor >= window.end {
                return None;
            }
            if span.end <= cursor {
                continue;
            }
            if span.start > cursor {
                return Some(cursor..span.start.min(window.end));
            }
            cursor = span.end;
        }

        (cursor < window.end).then(|| cursor..window.end)
    }

    /// Every uncovered sub-range of `[0, total)`
    pub fn gaps(&self, total: u32) -> Vec<Range<u32>> {
        let mut gaps = Vec::new();
        let mut cursor = 0;

        for span in &self.spans {
            if span.start >= total {
                break;
            }
            if span.start > cursor {
                gaps.push(cursor..span.start);
            }
            cursor = cursor.max(span.end);
        }

        if cursor < total {
            gaps.push(cursor..total);
        }
        gaps
    }

    /// Whether all of `window` is covered
    pub fn covers(&self, window: Range<u32>) -> bool {
        self.first_gap(window).is_none()
    }

    /// Number of distinct bytes covered
    pub fn covered(&self) -> u64 {
        self.spans.iter().map(|s| u64::from(s.end - s.start)).sum()
    }

    pub fn spans(&self) -> &[Range<u32>] {
        &self.spans
    }
}
