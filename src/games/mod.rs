pub mod clock;
pub mod ledger;
pub mod payout;
pub mod processor;
pub mod redemption;
pub mod segment_pool;
pub mod types;

pub use clock::GameClock;
pub use payout::PayoutBreakdown;
pub use processor::{Collaborators, PoolGame};
pub use redemption::RedemptionReport;
pub use types::*;
