//! Raffle metrics in Prometheus text format

use crate::common::types::WEI_PER_ETHER;
use crate::errors::RaffleError;
use crate::lottery::events::RaffleEvent;
use crate::lottery::raffle::RaffleSnapshot;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::time::Instant;

pub struct RaffleMetrics {
    registry: Registry,
    start_time: Instant,
    entries_total: IntCounter,
    randomness_requests_total: IntCounter,
    winners_picked_total: IntCounter,
    rejected_total: IntCounterVec,
    players: IntGauge,
    pot_ether: Gauge,
    state: IntGauge,
    uptime_seconds: Gauge,
}

impl RaffleMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("raffle".to_string()), None)?;

        let entries_total = IntCounter::new("entries_total", "Accepted entries")?;
        let randomness_requests_total =
            IntCounter::new("randomness_requests_total", "Rounds closed with a randomness request")?;
        let winners_picked_total = IntCounter::new("winners_picked_total", "Rounds resolved and paid")?;
        let rejected_total = IntCounterVec::new(
            Opts::new("rejected_total", "Rejected operations by reason"),
            &["reason"],
        )?;
        let players = IntGauge::new("players", "Entries in the current round")?;
        let pot_ether = Gauge::new("pot_ether", "Current pot in ether")?;
        let state = IntGauge::new("state", "Round state (0 open, 1 calculating)")?;
        let uptime_seconds = Gauge::new("uptime_seconds", "Seconds since the service started")?;

        registry.register(Box::new(entries_total.clone()))?;
        registry.register(Box::new(randomness_requests_total.clone()))?;
        registry.register(Box::new(winners_picked_total.clone()))?;
        registry.register(Box::new(rejected_total.clone()))?;
        registry.register(Box::new(players.clone()))?;
        registry.register(Box::new(pot_ether.clone()))?;
        registry.register(Box::new(state.clone()))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry,
            start_time: Instant::now(),
            entries_total,
            randomness_requests_total,
            winners_picked_total,
            rejected_total,
            players,
            pot_ether,
            state,
            uptime_seconds,
        })
    }

    pub fn observe_snapshot(&self, snapshot: &RaffleSnapshot) {
        self.players.set(snapshot.number_of_players() as i64);
        self.pot_ether.set(snapshot.pot as f64 / WEI_PER_ETHER as f64);
        self.state.set(snapshot.state.as_u8() as i64);
    }

    pub fn record_event(&self, event: &RaffleEvent) {
        match event {
            RaffleEvent::Entered { .. } => self.entries_total.inc(),
            RaffleEvent::RandomnessRequested { .. } => self.randomness_requests_total.inc(),
            RaffleEvent::WinnerPicked { .. } => self.winners_picked_total.inc(),
        }
    }

    pub fn record_error(&self, error: &RaffleError) {
        let reason = match error {
            RaffleError::InsufficientPayment { .. } => "insufficient_payment",
            RaffleError::NotOpen { .. } => "not_open",
            RaffleError::RoundFull { .. } => "round_full",
            RaffleError::UpkeepNotNeeded { .. } => "upkeep_not_needed",
            RaffleError::UnknownRequest { .. } => "unknown_request",
            RaffleError::UnauthorizedCaller { .. } => "unauthorized_caller",
            RaffleError::MissingRandomness => "missing_randomness",
            RaffleError::NoPlayers => "no_players",
            RaffleError::PayoutFailed { .. } => "payout_failed",
            RaffleError::PaymentRejected { .. } => "payment_rejected",
            RaffleError::Oracle(_) => "oracle",
            RaffleError::EngineUnavailable => "engine_unavailable",
        };
        self.rejected_total.with_label_values(&[reason]).inc();
    }

    pub fn rejected(&self, reason: &str) -> u64 {
        self.rejected_total.with_label_values(&[reason]).get()
    }

    pub fn winners_picked(&self) -> u64 {
        self.winners_picked_total.get()
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        self.uptime_seconds.set(self.start_time.elapsed().as_secs_f64());

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
