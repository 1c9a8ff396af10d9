//! GhostPool - Pooled Savings Game Ledger
//!
//! Players pay a fixed amount every segment. Idle deposits are swept into an external
//! lending pool, and once the game ends players who paid every segment split the yield.
//! Everyone gets their principal back; early leavers forfeit a fee to the pool.

pub mod config;
pub mod errors;
pub mod game_store;
pub mod games;
pub mod simulation;
pub mod state_manager;
pub mod traits;

pub use config::{ConfigLoader, PoolConfig};
pub use errors::{GhostPoolError, PoolResult};
pub use game_store::GameSnapshot;
pub use games::{Address, Amount, Collaborators, GameEvent, PoolGame, Segment};
pub use traits::{
    Administration, LendingPool, OwnablePause, PaymentToken, ReserveDataProvider, TimeSource,
};
