//! Error types for the GhostPool savings game
//!
//! Every failure is terminal for the invocation that raised it: the game state is rolled
//! back to what it was before the call and nothing is retried automatically.

use crate::games::types::{Address, Amount};
use thiserror::Error;

/// Root error type for all GhostPool operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GhostPoolError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Precondition and double-execution violations raised by the game itself
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// Failures reported by the token, lending pool or data provider
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Snapshot persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Configuration and validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Missing required field: {0}")]
    MissingRequired(String),
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue { field: String, value: String, reason: String },
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Named precondition violations. None of these are retryable as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Game has already started")]
    GameAlreadyStarted,
    #[error("Cannot join the game more than once: {0}")]
    AlreadyJoined(Address),
    #[error("Not a player: {0}")]
    NotAPlayer(Address),
    #[error("Player has already withdrawn: {0}")]
    PlayerAlreadyWithdrawn(Address),
    #[error("Deposits are only accepted between segment 1 and the penultimate segment (current: {segment})")]
    DepositWindowClosed { segment: u64 },
    #[error("Player already paid segment {segment}")]
    SegmentAlreadyPaid { segment: u64 },
    #[error("Player didn't pay the previous segment (last paid {last_paid}, current {segment})")]
    PreviousSegmentNotPaid { last_paid: u64, segment: u64 },
    #[error("Insufficient allowance: required {required}, approved {approved}")]
    InsufficientAllowance { required: Amount, approved: Amount },
    #[error("Cannot deposit into the external pool during segment zero")]
    SweepDuringFirstSegment,
    #[error("No amount from segment {segment} to deposit into the external pool")]
    NothingToSweep { segment: u64 },
    #[error("Game is not completed")]
    GameNotCompleted,
    #[error("Game is already completed")]
    GameCompleted,
    #[error("Redeem operation already happened for the game")]
    AlreadyRedeemed,
    #[error("Game is paused")]
    Paused,
    #[error("Caller is not the owner: {0}")]
    NotOwner(Address),
    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),
    #[error("Reentrant call to {0} while another operation is in progress")]
    ReentrantCall(&'static str),
}

/// Failures of external collaborators. Any of these aborts the whole operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("Token transfer of {amount} to {to} was rejected")]
    TransferRejected { to: Address, amount: Amount },
    #[error("Token approval of {amount} for {spender} was rejected")]
    ApprovalRejected { spender: Address, amount: Amount },
    #[error("Token operation failed: {0}")]
    TokenFailed(String),
    #[error("Lending pool operation failed: {0}")]
    ProtocolFailed(String),
    #[error("Reserve data lookup failed: {0}")]
    DataProviderFailed(String),
}

/// Snapshot storage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Read failed: {0}")]
    ReadFailed(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error("Corrupted data: {0}")]
    CorruptedData(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl From<std::io::Error> for GhostPoolError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                GhostPoolError::Storage(StorageError::PermissionDenied(e.to_string()))
            }
            _ => GhostPoolError::Storage(StorageError::ReadFailed(e.to_string())),
        }
    }
}

impl From<serde_json::Error> for GhostPoolError {
    fn from(e: serde_json::Error) -> Self {
        GhostPoolError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

// Convenience type alias for Results
pub type PoolResult<T> = Result<T, GhostPoolError>;
