//! Segment timing

use crate::games::types::Segment;
use serde::{Deserialize, Serialize};

/// Derives the current segment from wall-clock seconds. Holds no mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameClock {
    pub first_segment_start: u64,
    pub segment_length: u64,
    pub last_segment: Segment,
}

impl GameClock {
    pub fn new(first_segment_start: u64, segment_length: u64, last_segment: Segment) -> Self {
        Self {
            first_segment_start,
            segment_length,
            last_segment,
        }
    }

    /// `(now - first_segment_start) / segment_length`, floored. Times before the start
    /// count as segment 0.
    pub fn current_segment(&self, now: u64) -> Segment {
        if self.segment_length == 0 {
            return 0;
        }
        now.saturating_sub(self.first_segment_start) / self.segment_length
    }

    pub fn is_completed(&self, now: u64) -> bool {
        self.current_segment(now) > self.last_segment
    }

    /// Start timestamp of `segment`, saturating at `u64::MAX`
    pub fn segment_start(&self, segment: Segment) -> u64 {
        segment
            .saturating_mul(self.segment_length)
            .saturating_add(self.first_segment_start)
    }
}
