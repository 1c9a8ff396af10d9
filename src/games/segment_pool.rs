use crate::errors::GameError;
use crate::games::types::{Amount, Segment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-segment buckets of principal collected but not yet swept into the lending pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPool {
    deposits: BTreeMap<Segment, Amount>,
}

impl SegmentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount waiting in `segment`'s bucket
    pub fn pending(&self, segment: Segment) -> Amount {
        self.deposits.get(&segment).copied().unwrap_or(0)
    }

    /// Total not yet swept across all buckets
    pub fn total_pending(&self) -> Amount {
        self.deposits.values().fold(0, |acc, v| acc.saturating_add(*v))
    }

    pub fn credit(&mut self, segment: Segment, amount: Amount) -> Result<(), GameError> {
        let bucket = self.deposits.entry(segment).or_insert(0);
        *bucket = bucket
            .checked_add(amount)
            .ok_or(GameError::ArithmeticOverflow("segment deposit"))?;
        Ok(())
    }

    /// Zero the bucket and hand back what it held. An empty bucket is a hard failure.
    pub fn take(&mut self, segment: Segment) -> Result<Amount, GameError> {
        let amount = self.pending(segment);
        if amount == 0 {
            return Err(GameError::NothingToSweep { segment });
        }
        self.deposits.insert(segment, 0);
        Ok(amount)
    }

    /// Reduce the bucket by `amount` when it still holds at least that much.
    /// Returns whether the adjustment happened; a short or swept bucket is left alone.
    pub fn debit_if_covered(&mut self, segment: Segment, amount: Amount) -> bool {
        match self.deposits.get_mut(&segment) {
            Some(bucket) if *bucket > 0 && *bucket >= amount => {
                *bucket -= amount;
                true
            }
            _ => false,
        }
    }
}
