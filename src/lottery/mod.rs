//! Raffle core
//!
//! - `round`: OPEN/CALCULATING state, timing and the upkeep predicate
//! - `ledger`: entries and pot of the current round
//! - `raffle`: the state machine tying them to the oracle and the treasury
//! - `engine`: single-owner task serializing mutations
//! - `events`: notifications emitted on success

pub mod engine;
pub mod events;
pub mod ledger;
pub mod raffle;
pub mod round;

pub use engine::{EngineDeps, RaffleEngine, RaffleHandle};
pub use events::RaffleEvent;
pub use ledger::{EntryLedger, DEFAULT_MAX_PLAYERS};
pub use raffle::{select_winner, Raffle, RaffleParams, RaffleSnapshot, Resolution};
pub use round::{evaluate_upkeep, RoundState, UpkeepCheck, UpkeepDiagnostics};
