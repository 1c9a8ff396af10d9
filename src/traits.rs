//! Collaborator interfaces
//!
//! The game talks to the outside world only through these traits: the payment token, the
//! yield-bearing lending pool, the reserve data provider, administration (owner and pause)
//! and a time source. Implementations may call back into the game; the game never holds
//! its state borrowed across any of these calls.

use crate::errors::{CollaboratorError, GameError};
use crate::games::types::{Address, Amount};
use std::cell::{Cell, RefCell};

/// Sentinel amount meaning "withdraw the whole available balance"
pub const WITHDRAW_ALL: Amount = Amount::MAX;

/// Transferable-value token used for payments.
///
/// `Ok(false)` means the token refused the operation; the game treats it like an error.
pub trait PaymentToken {
    fn balance_of(&self, holder: &Address) -> Result<Amount, CollaboratorError>;

    fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, CollaboratorError>;

    fn approve(
        &self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<bool, CollaboratorError>;

    fn transfer(&self, from: &Address, to: &Address, amount: Amount)
        -> Result<bool, CollaboratorError>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance
    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<bool, CollaboratorError>;
}

/// External yield protocol holding swept principal
pub trait LendingPool {
    /// Pull `amount` of `asset` from `caller` and credit the position of `on_behalf_of`
    fn deposit(
        &self,
        caller: &Address,
        asset: &Address,
        amount: Amount,
        on_behalf_of: &Address,
        referral_code: u16,
    ) -> Result<(), CollaboratorError>;

    /// Withdraw from `caller`'s position to `to`. [`WITHDRAW_ALL`] empties the position.
    /// Returns the amount actually withdrawn.
    fn withdraw(
        &self,
        caller: &Address,
        asset: &Address,
        amount: Amount,
        to: &Address,
    ) -> Result<Amount, CollaboratorError>;

    /// Current position (principal plus accrued yield) of `holder`
    fn balance_of(&self, asset: &Address, holder: &Address) -> Result<Amount, CollaboratorError>;

    fn address(&self) -> Address;
}

/// Resolves the yield-bearing token of a reserve. Consulted once, at construction.
pub trait ReserveDataProvider {
    fn yield_token_address(&self, asset: &Address) -> Result<Address, CollaboratorError>;
}

/// Owner identity and pause gating
pub trait Administration {
    fn owner(&self) -> Address;

    fn is_paused(&self) -> bool;
}

/// Wall-clock seconds
pub trait TimeSource {
    fn now(&self) -> u64;
}

/// Ownable + pausable administration held in-process
#[derive(Debug)]
pub struct OwnablePause {
    owner: RefCell<Address>,
    paused: Cell<bool>,
}

impl OwnablePause {
    pub fn new(owner: Address) -> Self {
        Self {
            owner: RefCell::new(owner),
            paused: Cell::new(false),
        }
    }

    pub fn pause(&self, caller: &Address) -> Result<(), GameError> {
        self.only_owner(caller)?;
        self.paused.set(true);
        tracing::info!("Game paused by {}", caller);
        Ok(())
    }

    pub fn unpause(&self, caller: &Address) -> Result<(), GameError> {
        self.only_owner(caller)?;
        self.paused.set(false);
        tracing::info!("Game unpaused by {}", caller);
        Ok(())
    }

    pub fn transfer_ownership(&self, caller: &Address, new_owner: Address) -> Result<(), GameError> {
        self.only_owner(caller)?;
        tracing::info!("Ownership transferred from {} to {}", caller, new_owner);
        *self.owner.borrow_mut() = new_owner;
        Ok(())
    }

    fn only_owner(&self, caller: &Address) -> Result<(), GameError> {
        if *self.owner.borrow() != *caller {
            return Err(GameError::NotOwner(caller.clone()));
        }
        Ok(())
    }
}

impl Administration for OwnablePause {
    fn owner(&self) -> Address {
        self.owner.borrow().clone()
    }

    fn is_paused(&self) -> bool {
        self.paused.get()
    }
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }
}
