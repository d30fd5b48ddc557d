//! Raffle - autonomous recurring lottery service
//!
//! Players pay an entrance fee into the current round. Once the round has
//! been open long enough and holds at least one paid entry, anyone may close
//! it; the service then requests verifiable randomness from an oracle and,
//! when the callback arrives, pays the whole pot to one uniformly selected
//! entry and starts a new round.

pub mod api;
pub mod clock;
pub mod common;
pub mod config;
pub mod errors;
pub mod keeper;
pub mod lottery;
pub mod metrics;
pub mod oracle;
pub mod settlement;

pub use clock::{Clock, ManualClock, SystemClock};
pub use common::types::*;
pub use config::{ConfigLoader, RaffleConfig};
pub use errors::{ConfigurationError, OracleError, PaymentError, RaffleError, RaffleResult};
pub use keeper::UpkeepKeeper;
pub use lottery::{
    EngineDeps, Raffle, RaffleEngine, RaffleEvent, RaffleHandle, RaffleParams, RaffleSnapshot, Resolution,
    UpkeepCheck, UpkeepDiagnostics,
};
pub use metrics::RaffleMetrics;
pub use oracle::{LocalCoordinator, RandomWordsRequest, RandomnessConsumer, RandomnessCoordinator};
pub use settlement::{InMemoryBank, Treasury};
