use serde::{Deserialize, Serialize};
use std::fmt;

/// Token amounts, in the smallest unit of the payment token
pub type Amount = u128;

/// Zero-based segment index
pub type Segment = u64;

/// Identity of a participant or collaborator (wallet or contract address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Per-participant payment record. Created on join, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub address: Address,
    /// Flips to true exactly once, on withdraw or early withdraw
    pub withdrawn: bool,
    pub most_recent_segment_paid: Segment,
    /// Running sum of payments. Early withdrawal does not reduce it.
    pub amount_paid: Amount,
}

impl Player {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            withdrawn: false,
            most_recent_segment_paid: 0,
            amount_paid: 0,
        }
    }

    /// True when the player paid through the penultimate segment
    pub fn paid_all_segments(&self, last_segment: Segment) -> bool {
        last_segment
            .checked_sub(1)
            .map_or(false, |final_payment| self.most_recent_segment_paid == final_payment)
    }
}

/// Observable notifications journaled by the game
// Externally tagged: internally tagged enums cannot carry u128 fields through serde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEvent {
    JoinedGame {
        player: Address,
        amount: Amount,
    },
    Deposit {
        player: Address,
        segment: Segment,
        amount: Amount,
    },
    Withdrawal {
        player: Address,
        amount: Amount,
    },
    FundsDepositedIntoExternalPool {
        amount: Amount,
    },
    FundsRedeemedFromExternalPool {
        total_amount: Amount,
        total_principal: Amount,
        total_interest: Amount,
    },
    WinnersAnnouncement {
        winners: Vec<Address>,
    },
    EarlyWithdrawal {
        player: Address,
        amount: Amount,
    },
}

impl GameEvent {
    /// Short event name, as shown in logs
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::JoinedGame { .. } => "JoinedGame",
            GameEvent::Deposit { .. } => "Deposit",
            GameEvent::Withdrawal { .. } => "Withdrawal",
            GameEvent::FundsDepositedIntoExternalPool { .. } => "FundsDepositedIntoExternalPool",
            GameEvent::FundsRedeemedFromExternalPool { .. } => "FundsRedeemedFromExternalPool",
            GameEvent::WinnersAnnouncement { .. } => "WinnersAnnouncement",
            GameEvent::EarlyWithdrawal { .. } => "EarlyWithdrawal",
        }
    }
}
