//! Per-player payment history and eligibility rules
//!
//! The ledger only validates and records. It never talks to collaborators; the
//! coordinator in `processor` decides when its mutations are committed.

use crate::errors::GameError;
use crate::games::types::{Address, Amount, Player, Segment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLedger {
    players: BTreeMap<Address, Player>,
    /// Join order
    roster: Vec<Address>,
    /// Append-only, populated during the final payment window
    winners: Vec<Address>,
}

impl PlayerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&self, address: &Address) -> Option<&Player> {
        self.players.get(address)
    }

    pub fn roster(&self) -> &[Address] {
        &self.roster
    }

    pub fn winners(&self) -> &[Address] {
        &self.winners
    }

    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    /// Create a fresh record. Joining is only possible during segment 0.
    pub fn register(&mut self, address: &Address, segment: Segment) -> Result<(), GameError> {
        if segment != 0 {
            return Err(GameError::GameAlreadyStarted);
        }
        if self.players.contains_key(address) {
            return Err(GameError::AlreadyJoined(address.clone()));
        }

        self.players.insert(address.clone(), Player::new(address.clone()));
        self.roster.push(address.clone());
        Ok(())
    }

    /// Check every precondition of a periodic deposit for `segment`
    pub fn check_deposit_eligibility(
        &self,
        address: &Address,
        segment: Segment,
        last_segment: Segment,
    ) -> Result<(), GameError> {
        let player = self.active_player(address)?;

        if segment == 0 || segment >= last_segment {
            return Err(GameError::DepositWindowClosed { segment });
        }
        if player.most_recent_segment_paid == segment {
            return Err(GameError::SegmentAlreadyPaid { segment });
        }
        if player.most_recent_segment_paid != segment - 1 {
            return Err(GameError::PreviousSegmentNotPaid {
                last_paid: player.most_recent_segment_paid,
                segment,
            });
        }
        Ok(())
    }

    /// Append to the winner list; a player appears at most once
    pub fn add_winner(&mut self, address: &Address) {
        if !self.winners.contains(address) {
            self.winners.push(address.clone());
        }
    }

    /// Record a payment of `amount` for `segment` on the player's record
    pub fn record_payment(
        &mut self,
        address: &Address,
        segment: Segment,
        amount: Amount,
    ) -> Result<(), GameError> {
        let player = self
            .players
            .get_mut(address)
            .ok_or_else(|| GameError::NotAPlayer(address.clone()))?;

        player.most_recent_segment_paid = segment;
        player.amount_paid = player
            .amount_paid
            .checked_add(amount)
            .ok_or(GameError::ArithmeticOverflow("player amount paid"))?;
        Ok(())
    }

    /// Flip the withdrawn flag and return the record as it stood
    pub fn mark_withdrawn(&mut self, address: &Address) -> Result<Player, GameError> {
        self.active_player(address)?;
        let player = self
            .players
            .get_mut(address)
            .ok_or_else(|| GameError::NotAPlayer(address.clone()))?;
        player.withdrawn = true;
        Ok(player.clone())
    }

    fn active_player(&self, address: &Address) -> Result<&Player, GameError> {
        let player = self
            .players
            .get(address)
            .ok_or_else(|| GameError::NotAPlayer(address.clone()))?;
        if player.withdrawn {
            return Err(GameError::PlayerAlreadyWithdrawn(address.clone()));
        }
        Ok(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(name: &str) -> Address {
        Address::from(name)
    }

    fn joined(names: &[&str]) -> PlayerLedger {
        let mut ledger = PlayerLedger::new();
        for name in names {
            ledger.register(&addr(name), 0).unwrap();
            ledger.record_payment(&addr(name), 0, 10).unwrap();
        }
        ledger
    }

    #[test]
    fn test_register_only_in_first_segment() {
        let mut ledger = PlayerLedger::new();
        assert_eq!(ledger.register(&addr("a"), 1), Err(GameError::GameAlreadyStarted));
        assert!(ledger.register(&addr("a"), 0).is_ok());
        assert_eq!(
            ledger.register(&addr("a"), 0),
            Err(GameError::AlreadyJoined(addr("a")))
        );
        assert_eq!(ledger.roster(), &[addr("a")]);
    }

    #[test]
    fn test_deposit_window_bounds() {
        let ledger = joined(&["a"]);
        assert_eq!(
            ledger.check_deposit_eligibility(&addr("a"), 0, 6),
            Err(GameError::DepositWindowClosed { segment: 0 })
        );
        assert_eq!(
            ledger.check_deposit_eligibility(&addr("a"), 6, 6),
            Err(GameError::DepositWindowClosed { segment: 6 })
        );
        assert!(ledger.check_deposit_eligibility(&addr("a"), 1, 6).is_ok());
    }

    #[test]
    fn test_skipped_segment_locks_player_out() {
        let mut ledger = joined(&["a"]);
        ledger.record_payment(&addr("a"), 1, 10).unwrap();

        assert_eq!(
            ledger.check_deposit_eligibility(&addr("a"), 1, 6),
            Err(GameError::SegmentAlreadyPaid { segment: 1 })
        );
        assert_eq!(
            ledger.check_deposit_eligibility(&addr("a"), 3, 6),
            Err(GameError::PreviousSegmentNotPaid { last_paid: 1, segment: 3 })
        );
        assert_eq!(
            ledger.check_deposit_eligibility(&addr("a"), 4, 6),
            Err(GameError::PreviousSegmentNotPaid { last_paid: 1, segment: 4 })
        );
    }

    #[test]
    fn test_unknown_and_withdrawn_players_are_rejected() {
        let mut ledger = joined(&["a"]);
        assert_eq!(
            ledger.check_deposit_eligibility(&addr("ghost"), 1, 6),
            Err(GameError::NotAPlayer(addr("ghost")))
        );

        let record = ledger.mark_withdrawn(&addr("a")).unwrap();
        assert!(record.withdrawn);
        assert_eq!(record.amount_paid, 10);
        assert_eq!(
            ledger.mark_withdrawn(&addr("a")),
            Err(GameError::PlayerAlreadyWithdrawn(addr("a")))
        );
        assert_eq!(
            ledger.check_deposit_eligibility(&addr("a"), 1, 6),
            Err(GameError::PlayerAlreadyWithdrawn(addr("a")))
        );
    }

    #[test]
    fn test_winners_are_unique() {
        let mut ledger = joined(&["a", "b"]);
        ledger.add_winner(&addr("b"));
        ledger.add_winner(&addr("b"));
        ledger.add_winner(&addr("a"));
        assert_eq!(ledger.winners(), &[addr("b"), addr("a")]);
    }
}
