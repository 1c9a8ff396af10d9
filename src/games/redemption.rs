//! One-shot redemption bookkeeping
//!
//! `PoolGame::redeem_from_external_pool` drives the collaborator calls; this module owns the
//! idempotency flag and the interest arithmetic.

use crate::errors::GameError;
use crate::games::types::{Address, Amount};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionState {
    redeemed: bool,
    total_game_interest: Amount,
}

impl RedemptionState {
    pub fn is_redeemed(&self) -> bool {
        self.redeemed
    }

    pub fn total_game_interest(&self) -> Amount {
        self.total_game_interest
    }

    /// false -> true, exactly once
    pub fn begin(&mut self) -> Result<(), GameError> {
        if self.redeemed {
            return Err(GameError::AlreadyRedeemed);
        }
        self.redeemed = true;
        Ok(())
    }

    pub fn record_interest(&mut self, interest: Amount) {
        self.total_game_interest = interest;
    }
}

/// Interest is whatever the pool holds beyond tracked principal. A balance below principal
/// yields zero interest and reports the shortfall.
pub fn compute_interest(total_balance: Amount, total_principal: Amount) -> (Amount, Amount) {
    match total_balance.checked_sub(total_principal) {
        Some(interest) => (interest, 0),
        None => (0, total_principal - total_balance),
    }
}

/// Outcome of a completed redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionReport {
    pub total_amount: Amount,
    pub total_principal: Amount,
    pub total_interest: Amount,
    pub winners: Vec<Address>,
    /// Set when nobody won and the interest went to the owner
    pub interest_to_owner: Option<Amount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_one_shot() {
        let mut state = RedemptionState::default();
        assert!(state.begin().is_ok());
        assert!(state.is_redeemed());
        assert_eq!(state.begin(), Err(GameError::AlreadyRedeemed));
    }

    #[test]
    fn test_compute_interest() {
        assert_eq!(compute_interest(230, 200), (30, 0));
        assert_eq!(compute_interest(200, 200), (0, 0));
        assert_eq!(compute_interest(190, 200), (0, 10));
    }
}
