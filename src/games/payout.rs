//! Payout arithmetic for final and early withdrawals
//!
//! All amounts are integers; divisions floor. Remainders stay in the pool.

use crate::errors::GameError;
use crate::games::types::{Amount, Player, Segment};
use serde::{Deserialize, Serialize};

/// Early withdrawal fees are whole percentages
pub const FEE_DENOMINATOR: Amount = 100;

/// What a player receives on `withdraw`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutBreakdown {
    pub principal: Amount,
    pub interest_share: Amount,
}

impl PayoutBreakdown {
    pub fn total(&self) -> Result<Amount, GameError> {
        self.principal
            .checked_add(self.interest_share)
            .ok_or(GameError::ArithmeticOverflow("payout"))
    }
}

/// `amount_paid - floor(amount_paid * fee / 100)`
pub fn early_withdrawal_amount(amount_paid: Amount, fee_percent: u8) -> Result<Amount, GameError> {
    let fee = amount_paid
        .checked_mul(Amount::from(fee_percent))
        .ok_or(GameError::ArithmeticOverflow("early withdrawal fee"))?
        / FEE_DENOMINATOR;
    amount_paid
        .checked_sub(fee)
        .ok_or(GameError::ArithmeticOverflow("early withdrawal amount"))
}

/// `floor(total_interest / winner_count)`, zero without winners
pub fn winner_share(total_interest: Amount, winner_count: usize) -> Amount {
    if winner_count == 0 {
        return 0;
    }
    total_interest / winner_count as Amount
}

pub fn final_payout(
    player: &Player,
    last_segment: Segment,
    total_interest: Amount,
    winner_count: usize,
) -> PayoutBreakdown {
    let interest_share = if player.paid_all_segments(last_segment) {
        winner_share(total_interest, winner_count)
    } else {
        0
    };

    PayoutBreakdown {
        principal: player.amount_paid,
        interest_share,
    }
}
