//! Round state and the upkeep predicate
//!
//! `evaluate_upkeep` is the single source of truth for "may this round be
//! finalized now". It is pure so it can be called from the engine, from
//! read-only snapshots and from pollers at any frequency.

use crate::common::types::{Amount, RaffleState};
use serde::{Deserialize, Serialize};

/// State machine plus timing bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundState {
    state: RaffleState,
    last_timestamp: u64,
    interval: u64,
    entrance_fee: Amount,
}

impl RoundState {
    pub fn new(entrance_fee: Amount, interval: u64, now: u64) -> Self {
        Self {
            state: RaffleState::Open,
            last_timestamp: now,
            interval,
            entrance_fee,
        }
    }

    pub fn state(&self) -> RaffleState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == RaffleState::Open
    }

    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn entrance_fee(&self) -> Amount {
        self.entrance_fee
    }

    pub(crate) fn begin_calculating(&mut self) {
        self.state = RaffleState::Calculating;
    }

    pub(crate) fn reopen(&mut self) {
        self.state = RaffleState::Open;
    }

    /// Back to OPEN with a fresh interval starting at `now`
    pub(crate) fn reset(&mut self, now: u64) {
        self.state = RaffleState::Open;
        self.last_timestamp = now;
    }
}

/// Why upkeep is (or is not) needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpkeepDiagnostics {
    pub state: RaffleState,
    #[serde(with = "crate::lottery::events::amount_string")]
    pub pot: Amount,
    pub players: usize,
    pub elapsed: u64,
    pub interval: u64,
    pub is_open: bool,
    pub time_passed: bool,
    pub has_players: bool,
    pub has_balance: bool,
}

/// Result of the upkeep check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpkeepCheck {
    pub upkeep_needed: bool,
    pub diagnostics: UpkeepDiagnostics,
}

/// `open && elapsed >= interval && players > 0 && pot > 0`
pub fn evaluate_upkeep(
    state: RaffleState,
    last_timestamp: u64,
    interval: u64,
    players: usize,
    pot: Amount,
    now: u64,
) -> UpkeepCheck {
    let elapsed = now.saturating_sub(last_timestamp);
    let is_open = state == RaffleState::Open;
    let time_passed = elapsed >= interval;
    let has_players = players > 0;
    let has_balance = pot > 0;

    UpkeepCheck {
        upkeep_needed: is_open && time_passed && has_players && has_balance,
        diagnostics: UpkeepDiagnostics {
            state,
            pot,
            players,
            elapsed,
            interval,
            is_open,
            time_passed,
            has_players,
            has_balance,
        },
    }
}
