//! Aggregate game state with all-or-nothing operations
//!
//! Every public game operation runs inside [`StateManager::atomic`]: the state is
//! checkpointed on entry and restored if anything in the body fails, including failures
//! reported by collaborators after effects were committed. Effects are applied through
//! [`StateManager::update`], which never keeps the state borrowed once it returns, so
//! collaborators invoked afterwards can read the game. Operations do not nest: `atomic`
//! refuses to start while another one is in flight.

use crate::errors::{GameError, PoolResult};
use crate::games::{
    ledger::PlayerLedger, redemption::RedemptionState, segment_pool::SegmentPool,
    types::{Amount, GameEvent},
};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};

/// Everything the game mutates. Configuration lives outside since it is immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub ledger: PlayerLedger,
    pub segments: SegmentPool,
    pub redemption: RedemptionState,
    pub total_game_principal: Amount,
    /// Event journal; rolled back together with the rest of the state
    pub events: Vec<GameEvent>,
}

/// State captured when an operation starts. The journal only grows while an operation runs,
/// so its length is enough to undo it.
#[derive(Debug)]
struct Checkpoint {
    ledger: PlayerLedger,
    segments: SegmentPool,
    redemption: RedemptionState,
    total_game_principal: Amount,
    events_len: usize,
}

impl GameState {
    pub fn add_principal(&mut self, amount: Amount) -> Result<(), GameError> {
        self.total_game_principal = self
            .total_game_principal
            .checked_add(amount)
            .ok_or(GameError::ArithmeticOverflow("total game principal"))?;
        Ok(())
    }

    pub fn remove_principal(&mut self, amount: Amount) -> Result<(), GameError> {
        self.total_game_principal = self
            .total_game_principal
            .checked_sub(amount)
            .ok_or(GameError::ArithmeticOverflow("total game principal"))?;
        Ok(())
    }

    pub fn emit(&mut self, event: GameEvent) {
        tracing::debug!(event = event.name(), "Event emitted");
        self.events.push(event);
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            ledger: self.ledger.clone(),
            segments: self.segments.clone(),
            redemption: self.redemption.clone(),
            total_game_principal: self.total_game_principal,
            events_len: self.events.len(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.ledger = checkpoint.ledger;
        self.segments = checkpoint.segments;
        self.redemption = checkpoint.redemption;
        self.total_game_principal = checkpoint.total_game_principal;
        self.events.truncate(checkpoint.events_len);
    }
}

/// Owner of the single [`GameState`]. Single-threaded by construction.
#[derive(Debug, Default)]
pub struct StateManager {
    state: RefCell<GameState>,
    /// Nesting depth of `atomic`, non-zero while an operation is in flight
    depth: Cell<usize>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: GameState) -> Self {
        Self {
            state: RefCell::new(state),
            depth: Cell::new(0),
        }
    }

    /// Read-only access to the committed state
    pub fn view<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Apply effects to the committed state. Errors leave partial writes behind, so this is
    /// only meaningful inside [`atomic`](Self::atomic), which restores them.
    pub fn update<R>(&self, f: impl FnOnce(&mut GameState) -> Result<R, GameError>) -> PoolResult<R> {
        let mut state = self.state.borrow_mut();
        Ok(f(&mut state)?)
    }

    /// Run `body` as one all-or-nothing unit. Fails with [`GameError::ReentrantCall`] without
    /// running `body` when another operation is already in flight.
    pub fn atomic<R>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&Self) -> PoolResult<R>,
    ) -> PoolResult<R> {
        self.ensure_idle(operation)?;

        let checkpoint = self.state.borrow().checkpoint();
        self.depth.set(self.depth.get() + 1);
        let result = body(self);
        self.depth.set(self.depth.get() - 1);

        if let Err(ref error) = result {
            tracing::warn!(operation, "Operation failed, state rolled back: {}", error);
            self.state.borrow_mut().restore(checkpoint);
        }
        result
    }

    /// True while an operation is running, i.e. when a call arrives re-entrantly
    pub fn in_operation(&self) -> bool {
        self.depth.get() > 0
    }

    pub fn ensure_idle(&self, operation: &'static str) -> Result<(), GameError> {
        if self.in_operation() {
            tracing::warn!(operation, "Rejected reentrant call");
            return Err(GameError::ReentrantCall(operation));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> GameState {
        self.state.borrow().clone()
    }

    /// Remove and return all journaled events. Refused while an operation is running, since
    /// its rollback restores the journal by length.
    pub fn drain_events(&self) -> PoolResult<Vec<GameEvent>> {
        self.ensure_idle("drain_events")?;
        Ok(std::mem::take(&mut self.state.borrow_mut().events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GhostPoolError;

    #[test]
    fn test_failed_operation_rolls_back_effects_and_events() {
        let manager = StateManager::new();

        let result: PoolResult<()> = manager.atomic("test", |tx| {
            tx.update(|s| {
                s.add_principal(10)?;
                s.emit(GameEvent::FundsDepositedIntoExternalPool { amount: 10 });
                Ok(())
            })?;
            Err(GameError::Paused.into())
        });

        assert_eq!(result, Err(GhostPoolError::Game(GameError::Paused)));
        manager.view(|s| {
            assert_eq!(s.total_game_principal, 0);
            assert!(s.events.is_empty());
        });
    }

    #[test]
    fn test_nested_operation_is_rejected() {
        let manager = StateManager::new();
        let mut inner_ran = false;

        manager
            .atomic("outer", |tx| {
                tx.update(|s| s.add_principal(5))?;
                assert!(tx.in_operation());
                let inner: PoolResult<()> = tx.atomic("inner", |tx| {
                    inner_ran = true;
                    tx.update(|s| s.add_principal(7))
                });
                assert_eq!(inner, Err(GhostPoolError::Game(GameError::ReentrantCall("inner"))));
                Ok(())
            })
            .unwrap();

        assert!(!inner_ran);
        assert!(!manager.in_operation());
        manager.view(|s| assert_eq!(s.total_game_principal, 5));
    }

    #[test]
    fn test_rollback_truncates_only_new_events() {
        let manager = StateManager::new();
        manager
            .atomic("first", |tx| {
                tx.update(|s| {
                    s.add_principal(10)?;
                    s.emit(GameEvent::FundsDepositedIntoExternalPool { amount: 10 });
                    Ok(())
                })
            })
            .unwrap();

        let result: PoolResult<()> = manager.atomic("second", |tx| {
            tx.update(|s| {
                s.add_principal(4)?;
                s.emit(GameEvent::FundsDepositedIntoExternalPool { amount: 4 });
                s.emit(GameEvent::FundsDepositedIntoExternalPool { amount: 6 });
                Ok(())
            })?;
            Err(GameError::Paused.into())
        });

        assert!(result.is_err());
        manager.view(|s| {
            assert_eq!(s.total_game_principal, 10);
            assert_eq!(s.events, vec![GameEvent::FundsDepositedIntoExternalPool { amount: 10 }]);
        });
    }

    #[test]
    fn test_drain_events_refused_during_operation() {
        let manager = StateManager::new();
        let result: PoolResult<()> = manager.atomic("emit", |tx| {
            tx.update(|s| {
                s.emit(GameEvent::FundsDepositedIntoExternalPool { amount: 1 });
                Ok(())
            })?;
            assert_eq!(
                tx.drain_events(),
                Err(GhostPoolError::Game(GameError::ReentrantCall("drain_events")))
            );
            Err(GameError::Paused.into())
        });

        assert!(result.is_err());
        assert_eq!(manager.drain_events(), Ok(vec![]));
    }

    #[test]
    fn test_remove_principal_underflow() {
        let mut state = GameState::default();
        assert_eq!(
            state.remove_principal(1),
            Err(GameError::ArithmeticOverflow("total game principal"))
        );
    }
}
