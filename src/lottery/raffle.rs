//! The raffle state machine
//!
//! `Raffle` owns one round at a time: it accepts paid entries while OPEN,
//! closes the round and asks the oracle for randomness once the upkeep
//! predicate holds, and resolves the round when the matching callback
//! arrives. It is a plain struct; serialization of concurrent callers is the
//! engine's job.

use crate::common::types::{Address, Amount, CoordinatorId, KeyHash, RaffleState, RandomWord, RequestId, SubscriptionId};
use crate::errors::{OracleError, RaffleError, RaffleResult};
use crate::lottery::events::{amount_string, RaffleEvent};
use crate::lottery::ledger::{EntryLedger, DEFAULT_MAX_PLAYERS};
use crate::lottery::round::{evaluate_upkeep, RoundState, UpkeepCheck};
use crate::oracle::coordinator::{RandomWordsRequest, RandomnessCoordinator};
use crate::settlement::Treasury;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_REQUEST_CONFIRMATIONS: u16 = 3;
pub const DEFAULT_NUM_WORDS: u32 = 1;

/// Fixed deployment parameters of a raffle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleParams {
    /// Identity of the raffle itself: escrow account and oracle consumer
    pub address: Address,
    /// The only transport allowed to deliver randomness
    pub coordinator: CoordinatorId,
    #[serde(with = "amount_string")]
    pub entrance_fee: Amount,
    pub key_hash: KeyHash,
    pub subscription_id: SubscriptionId,
    pub callback_gas_limit: u32,
    pub request_confirmations: u16,
    pub num_words: u32,
    /// Minimum seconds between round start and finalization
    pub interval: u64,
    pub max_players: usize,
}

impl RaffleParams {
    pub fn new(address: Address, coordinator: CoordinatorId, entrance_fee: Amount, interval: u64) -> Self {
        Self {
            address,
            coordinator,
            entrance_fee,
            key_hash: KeyHash::default(),
            subscription_id: 0,
            callback_gas_limit: 500_000,
            request_confirmations: DEFAULT_REQUEST_CONFIRMATIONS,
            num_words: DEFAULT_NUM_WORDS,
            interval,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

/// A completed round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub winner: Address,
    pub winner_index: usize,
    pub prize: Amount,
    pub request_id: RequestId,
    /// 1-based round number
    pub round: u64,
}

impl Resolution {
    pub fn event(&self) -> RaffleEvent {
        RaffleEvent::WinnerPicked {
            winner: self.winner,
            prize: self.prize,
            request_id: self.request_id,
            round: self.round,
        }
    }
}

/// Read-only view of the raffle at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaffleSnapshot {
    pub address: Address,
    pub state: RaffleState,
    pub entrance_fee: Amount,
    pub interval: u64,
    pub last_timestamp: u64,
    pub players: Arc<Vec<Address>>,
    pub pot: Amount,
    pub recent_winner: Option<Address>,
    pub pending_request: Option<RequestId>,
    pub rounds_completed: u64,
}

impl RaffleSnapshot {
    pub fn check_upkeep(&self, now: u64) -> UpkeepCheck {
        evaluate_upkeep(self.state, self.last_timestamp, self.interval, self.players.len(), self.pot, now)
    }

    pub fn number_of_players(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, index: usize) -> Option<Address> {
        self.players.get(index).copied()
    }
}

/// Pick `players[word mod len]`.
///
/// Reducing a uniform 256-bit word modulo `n` skews each index by at most
/// `n / 2^256`, which is negligible for any realistic player count.
pub fn select_winner(players: &[Address], word: &RandomWord) -> Option<(usize, Address)> {
    let index = word.modulo(players.len() as u64)? as usize;
    players.get(index).map(|winner| (index, *winner))
}

pub struct Raffle {
    params: RaffleParams,
    round: RoundState,
    ledger: EntryLedger,
    pending_request: Option<RequestId>,
    recent_winner: Option<Address>,
    rounds_completed: u64,
}

impl Raffle {
    /// Start in OPEN with the first round beginning at `now`
    pub fn new(params: RaffleParams, now: u64) -> Self {
        let round = RoundState::new(params.entrance_fee, params.interval, now);
        let ledger = EntryLedger::new(params.max_players);
        Self {
            params,
            round,
            ledger,
            pending_request: None,
            recent_winner: None,
            rounds_completed: 0,
        }
    }

    pub fn params(&self) -> &RaffleParams {
        &self.params
    }

    /// Join the current round with `payment`, which must cover the fee.
    /// Overpayment is kept in the pot.
    pub async fn enter<T: Treasury + ?Sized>(
        &mut self,
        player: Address,
        payment: Amount,
        treasury: &T,
    ) -> RaffleResult<RaffleEvent> {
        if !self.round.is_open() {
            return Err(RaffleError::NotOpen {
                state: self.round.state(),
            });
        }
        let required = self.round.entrance_fee();
        if payment < required {
            return Err(RaffleError::InsufficientPayment { paid: payment, required });
        }
        if self.ledger.is_full() {
            return Err(RaffleError::RoundFull {
                max: self.ledger.max_players(),
            });
        }

        treasury
            .collect(player, payment)
            .await
            .map_err(|reason| RaffleError::PaymentRejected {
                player,
                amount: payment,
                reason,
            })?;

        self.ledger.record(player, payment);
        info!(
            "🎟️ {} entered with {} wei ({} players, pot {} wei)",
            player,
            payment,
            self.ledger.len(),
            self.ledger.pot()
        );

        Ok(RaffleEvent::Entered { player, amount: payment })
    }

    pub fn check_upkeep(&self, now: u64) -> UpkeepCheck {
        evaluate_upkeep(
            self.round.state(),
            self.round.last_timestamp(),
            self.round.interval(),
            self.ledger.len(),
            self.ledger.pot(),
            now,
        )
    }

    /// Close the round and request randomness.
    ///
    /// The state is CALCULATING before the request is issued. If the oracle
    /// refuses, the round goes back to OPEN and nothing else changes.
    pub async fn perform_upkeep<C: RandomnessCoordinator + ?Sized>(
        &mut self,
        now: u64,
        coordinator: &C,
    ) -> RaffleResult<RequestId> {
        let check = self.check_upkeep(now);
        if !check.upkeep_needed {
            return Err(RaffleError::UpkeepNotNeeded {
                diagnostics: check.diagnostics,
            });
        }

        self.round.begin_calculating();

        let request = RandomWordsRequest {
            consumer: self.params.address,
            key_hash: self.params.key_hash,
            subscription_id: self.params.subscription_id,
            request_confirmations: self.params.request_confirmations,
            callback_gas_limit: self.params.callback_gas_limit,
            num_words: self.params.num_words,
        };

        let request_id = match coordinator.request_random_words(request).await {
            Ok(id) if !id.is_zero() => id,
            Ok(id) => {
                self.round.reopen();
                return Err(OracleError::InvalidRequestId(id).into());
            }
            Err(e) => {
                self.round.reopen();
                warn!("⚠️ Randomness request failed, round reopened: {}", e);
                return Err(e.into());
            }
        };

        self.pending_request = Some(request_id);
        info!(
            "🔒 Round closed with {} players, requested randomness (request {})",
            self.ledger.len(),
            request_id
        );

        Ok(request_id)
    }

    /// Resolve the round from the oracle callback.
    ///
    /// The prize is transferred before any state changes, so a failed payout
    /// leaves the raffle exactly as it was (CALCULATING, same pending id).
    pub async fn fulfill_random_words<T: Treasury + ?Sized>(
        &mut self,
        caller: CoordinatorId,
        request_id: RequestId,
        random_words: &[RandomWord],
        now: u64,
        treasury: &T,
    ) -> RaffleResult<Resolution> {
        if caller != self.params.coordinator {
            warn!("⚠️ Rejected randomness callback from {}", caller);
            return Err(RaffleError::UnauthorizedCaller { caller });
        }
        if request_id.is_zero() || self.pending_request != Some(request_id) {
            return Err(RaffleError::UnknownRequest { request_id });
        }

        let word = random_words.first().ok_or(RaffleError::MissingRandomness)?;
        let (winner_index, winner) =
            select_winner(self.ledger.players(), word).ok_or(RaffleError::NoPlayers)?;
        let prize = self.ledger.pot();

        treasury.pay_out(winner, prize).await.map_err(|reason| {
            warn!("⚠️ Payout of {} wei to {} failed: {}", prize, winner, reason);
            RaffleError::PayoutFailed {
                winner,
                amount: prize,
                reason,
            }
        })?;

        self.ledger.clear_round();
        self.round.reset(now);
        self.pending_request = None;
        self.recent_winner = Some(winner);
        self.rounds_completed += 1;

        info!(
            "🏆 Round {} won by {} (index {}), prize {} wei",
            self.rounds_completed, winner, winner_index, prize
        );

        Ok(Resolution {
            winner,
            winner_index,
            prize,
            request_id,
            round: self.rounds_completed,
        })
    }

    pub fn raffle_state(&self) -> RaffleState {
        self.round.state()
    }

    pub fn entrance_fee(&self) -> Amount {
        self.round.entrance_fee()
    }

    pub fn interval(&self) -> u64 {
        self.round.interval()
    }

    pub fn player(&self, index: usize) -> Option<Address> {
        self.ledger.player(index)
    }

    pub fn number_of_players(&self) -> usize {
        self.ledger.len()
    }

    pub fn request_confirmations(&self) -> u16 {
        self.params.request_confirmations
    }

    pub fn num_words(&self) -> u32 {
        self.params.num_words
    }

    pub fn pot(&self) -> Amount {
        self.ledger.pot()
    }

    pub fn recent_winner(&self) -> Option<Address> {
        self.recent_winner
    }

    pub fn latest_timestamp(&self) -> u64 {
        self.round.last_timestamp()
    }

    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending_request
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    pub fn snapshot(&self) -> RaffleSnapshot {
        RaffleSnapshot {
            address: self.params.address,
            state: self.round.state(),
            entrance_fee: self.round.entrance_fee(),
            interval: self.round.interval(),
            last_timestamp: self.round.last_timestamp(),
            players: self.ledger.shared_players(),
            pot: self.ledger.pot(),
            recent_winner: self.recent_winner,
            pending_request: self.pending_request,
            rounds_completed: self.rounds_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PaymentError;
    use crate::settlement::InMemoryBank;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    const FEE: Amount = 10_000_000_000_000_000;
    const INTERVAL: u64 = 30;
    const START: u64 = 1_700_000_000;

    /// Hands out sequential ids, or a scripted failure
    struct StubCoordinator {
        id: CoordinatorId,
        next: AtomicU64,
        fail: Option<OracleError>,
    }

    impl StubCoordinator {
        fn new() -> Self {
            Self {
                id: Address::from_label("coordinator"),
                next: AtomicU64::new(1),
                fail: None,
            }
        }
    }

    #[async_trait]
    impl RandomnessCoordinator for StubCoordinator {
        fn id(&self) -> CoordinatorId {
            self.id
        }

        async fn request_random_words(&self, _request: RandomWordsRequest) -> Result<RequestId, OracleError> {
            match &self.fail {
                Some(e) => Err(e.clone()),
                None => Ok(RequestId(self.next.fetch_add(1, Ordering::SeqCst))),
            }
        }
    }

    fn setup() -> (Raffle, InMemoryBank, StubCoordinator) {
        let coordinator = StubCoordinator::new();
        let params = RaffleParams::new(Address::from_label("raffle"), coordinator.id(), FEE, INTERVAL);
        let bank = InMemoryBank::new(params.address);
        (Raffle::new(params, START), bank, coordinator)
    }

    fn funded(bank: &InMemoryBank, label: &str) -> Address {
        let player = Address::from_label(label);
        bank.fund(player, 100 * FEE);
        player
    }

    async fn fill(raffle: &mut Raffle, bank: &InMemoryBank, count: usize) -> Vec<Address> {
        let mut players = Vec::new();
        for i in 0..count {
            let player = funded(bank, &format!("player-{}", i));
            raffle.enter(player, FEE, bank).await.unwrap();
            players.push(player);
        }
        players
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (raffle, _, _) = setup();
        assert_eq!(raffle.raffle_state(), RaffleState::Open);
        assert_eq!(raffle.interval(), INTERVAL);
        assert_eq!(raffle.entrance_fee(), FEE);
        assert_eq!(raffle.number_of_players(), 0);
        assert_eq!(raffle.recent_winner(), None);
        assert_eq!(raffle.latest_timestamp(), START);
    }

    #[tokio::test]
    async fn test_enter_rejects_underpayment() {
        let (mut raffle, bank, _) = setup();
        let player = funded(&bank, "alice");

        let err = raffle.enter(player, FEE - 1, &bank).await.unwrap_err();
        assert_eq!(err, RaffleError::InsufficientPayment { paid: FEE - 1, required: FEE });
        assert_eq!(raffle.number_of_players(), 0);
        assert_eq!(bank.escrow_balance(), 0);
    }

    #[tokio::test]
    async fn test_enter_records_player_and_event() {
        let (mut raffle, bank, _) = setup();
        let player = funded(&bank, "alice");

        let event = raffle.enter(player, FEE, &bank).await.unwrap();
        assert_eq!(event, RaffleEvent::Entered { player, amount: FEE });
        assert_eq!(raffle.player(0), Some(player));
        assert_eq!(raffle.pot(), FEE);
        assert_eq!(bank.escrow_balance(), FEE);
    }

    #[tokio::test]
    async fn test_overpayment_goes_to_pot() {
        let (mut raffle, bank, _) = setup();
        let player = funded(&bank, "alice");

        raffle.enter(player, FEE * 3, &bank).await.unwrap();
        assert_eq!(raffle.pot(), FEE * 3);
    }

    #[tokio::test]
    async fn test_enter_rejected_while_calculating() {
        let (mut raffle, bank, coordinator) = setup();
        fill(&mut raffle, &bank, 1).await;
        raffle.perform_upkeep(START + INTERVAL + 1, &coordinator).await.unwrap();

        let late = funded(&bank, "late");
        let err = raffle.enter(late, FEE, &bank).await.unwrap_err();
        assert_eq!(err, RaffleError::NotOpen { state: RaffleState::Calculating });
        assert_eq!(raffle.number_of_players(), 1);
    }

    #[tokio::test]
    async fn test_closed_round_rejects_any_payment() {
        let (mut raffle, bank, coordinator) = setup();
        fill(&mut raffle, &bank, 1).await;
        raffle.perform_upkeep(START + INTERVAL + 1, &coordinator).await.unwrap();

        let late = funded(&bank, "late");
        let err = raffle.enter(late, 0, &bank).await.unwrap_err();
        assert_eq!(err, RaffleError::NotOpen { state: RaffleState::Calculating });
    }

    #[tokio::test]
    async fn test_enter_without_funds_is_rejected() {
        let (mut raffle, bank, _) = setup();
        let broke = Address::from_label("broke");

        let err = raffle.enter(broke, FEE, &bank).await.unwrap_err();
        assert!(matches!(
            err,
            RaffleError::PaymentRejected {
                reason: PaymentError::InsufficientBalance { .. },
                ..
            }
        ));
        assert_eq!(raffle.number_of_players(), 0);
    }

    #[tokio::test]
    async fn test_round_capacity() {
        let coordinator = StubCoordinator::new();
        let mut params = RaffleParams::new(Address::from_label("raffle"), coordinator.id(), FEE, INTERVAL);
        params.max_players = 2;
        let bank = InMemoryBank::new(params.address);
        let mut raffle = Raffle::new(params, START);

        fill(&mut raffle, &bank, 2).await;
        let extra = funded(&bank, "extra");
        assert_eq!(
            raffle.enter(extra, FEE, &bank).await.unwrap_err(),
            RaffleError::RoundFull { max: 2 }
        );
    }

    #[tokio::test]
    async fn test_perform_upkeep_requires_upkeep() {
        let (mut raffle, bank, coordinator) = setup();

        // No players yet
        let err = raffle.perform_upkeep(START + INTERVAL + 1, &coordinator).await.unwrap_err();
        match err {
            RaffleError::UpkeepNotNeeded { diagnostics } => {
                assert_eq!(diagnostics.players, 0);
                assert_eq!(diagnostics.pot, 0);
                assert_eq!(diagnostics.state, RaffleState::Open);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Players but not enough time
        fill(&mut raffle, &bank, 1).await;
        assert!(raffle.perform_upkeep(START + 1, &coordinator).await.is_err());
        assert_eq!(raffle.raffle_state(), RaffleState::Open);
    }

    #[tokio::test]
    async fn test_perform_upkeep_closes_round() {
        let (mut raffle, bank, coordinator) = setup();
        fill(&mut raffle, &bank, 2).await;

        let id = raffle.perform_upkeep(START + INTERVAL + 1, &coordinator).await.unwrap();
        assert!(!id.is_zero());
        assert_eq!(raffle.raffle_state(), RaffleState::Calculating);
        assert_eq!(raffle.pending_request(), Some(id));
        assert!(!raffle.check_upkeep(START + INTERVAL * 10).upkeep_needed);

        // Second attempt while calculating fails with diagnostics
        let err = raffle.perform_upkeep(START + INTERVAL + 2, &coordinator).await.unwrap_err();
        assert!(matches!(err, RaffleError::UpkeepNotNeeded { .. }));
    }

    #[tokio::test]
    async fn test_oracle_failure_reopens_round() {
        let (mut raffle, bank, mut coordinator) = setup();
        fill(&mut raffle, &bank, 1).await;
        coordinator.fail = Some(OracleError::Unavailable("down".into()));

        let err = raffle.perform_upkeep(START + INTERVAL, &coordinator).await.unwrap_err();
        assert!(matches!(err, RaffleError::Oracle(OracleError::Unavailable(_))));
        assert_eq!(raffle.raffle_state(), RaffleState::Open);
        assert_eq!(raffle.pending_request(), None);
        assert_eq!(raffle.number_of_players(), 1);
    }

    #[tokio::test]
    async fn test_fulfill_picks_winner_and_resets() {
        let (mut raffle, bank, coordinator) = setup();
        let players = fill(&mut raffle, &bank, 4).await;
        let id = raffle.perform_upkeep(START + INTERVAL + 1, &coordinator).await.unwrap();

        let before = bank.balance_of(&players[2]);
        let resolution = raffle
            .fulfill_random_words(coordinator.id(), id, &[RandomWord::from(42)], START + 100, &bank)
            .await
            .unwrap();

        assert_eq!(resolution.winner, players[2]);
        assert_eq!(resolution.winner_index, 2);
        assert_eq!(resolution.prize, 4 * FEE);
        assert_eq!(resolution.round, 1);
        assert_eq!(bank.balance_of(&players[2]), before + 4 * FEE);
        assert_eq!(bank.escrow_balance(), 0);

        assert_eq!(raffle.raffle_state(), RaffleState::Open);
        assert_eq!(raffle.number_of_players(), 0);
        assert_eq!(raffle.pot(), 0);
        assert_eq!(raffle.recent_winner(), Some(players[2]));
        assert_eq!(raffle.latest_timestamp(), START + 100);
        assert_eq!(raffle.pending_request(), None);
        assert_eq!(raffle.rounds_completed(), 1);
    }

    #[tokio::test]
    async fn test_fulfill_rejects_unknown_and_replayed_ids() {
        let (mut raffle, bank, coordinator) = setup();
        fill(&mut raffle, &bank, 1).await;

        for bogus in [RequestId(0), RequestId(1)] {
            let err = raffle
                .fulfill_random_words(coordinator.id(), bogus, &[RandomWord::from(1)], START, &bank)
                .await
                .unwrap_err();
            assert_eq!(err, RaffleError::UnknownRequest { request_id: bogus });
        }

        let id = raffle.perform_upkeep(START + INTERVAL, &coordinator).await.unwrap();
        raffle
            .fulfill_random_words(coordinator.id(), id, &[RandomWord::from(0)], START + 40, &bank)
            .await
            .unwrap();

        let replay = raffle
            .fulfill_random_words(coordinator.id(), id, &[RandomWord::from(0)], START + 41, &bank)
            .await
            .unwrap_err();
        assert_eq!(replay, RaffleError::UnknownRequest { request_id: id });
        assert_eq!(raffle.rounds_completed(), 1);
    }

    #[tokio::test]
    async fn test_fulfill_rejects_foreign_caller() {
        let (mut raffle, bank, coordinator) = setup();
        fill(&mut raffle, &bank, 2).await;
        let id = raffle.perform_upkeep(START + INTERVAL, &coordinator).await.unwrap();

        let intruder = Address::from_label("intruder");
        let err = raffle
            .fulfill_random_words(intruder, id, &[RandomWord::from(0)], START + 40, &bank)
            .await
            .unwrap_err();
        assert_eq!(err, RaffleError::UnauthorizedCaller { caller: intruder });
        assert_eq!(raffle.raffle_state(), RaffleState::Calculating);
        assert_eq!(raffle.pending_request(), Some(id));
    }

    #[tokio::test]
    async fn test_fulfill_requires_a_word() {
        let (mut raffle, bank, coordinator) = setup();
        fill(&mut raffle, &bank, 1).await;
        let id = raffle.perform_upkeep(START + INTERVAL, &coordinator).await.unwrap();

        let err = raffle
            .fulfill_random_words(coordinator.id(), id, &[], START + 40, &bank)
            .await
            .unwrap_err();
        assert_eq!(err, RaffleError::MissingRandomness);
        assert_eq!(raffle.pending_request(), Some(id));
    }

    #[tokio::test]
    async fn test_failed_payout_changes_nothing() {
        let (mut raffle, bank, coordinator) = setup();
        let players = fill(&mut raffle, &bank, 3).await;
        let id = raffle.perform_upkeep(START + INTERVAL, &coordinator).await.unwrap();
        bank.reject_payouts_to(players[1]);
        let before = raffle.snapshot();

        let err = raffle
            .fulfill_random_words(coordinator.id(), id, &[RandomWord::from(4)], START + 40, &bank)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RaffleError::PayoutFailed {
                reason: PaymentError::RecipientRejected(_),
                ..
            }
        ));
        assert_eq!(raffle.snapshot(), before);
        assert_eq!(bank.escrow_balance(), 3 * FEE);
    }

    #[tokio::test]
    async fn test_next_round_after_resolution() {
        let (mut raffle, bank, coordinator) = setup();
        fill(&mut raffle, &bank, 2).await;
        let first = raffle.perform_upkeep(START + INTERVAL, &coordinator).await.unwrap();
        raffle
            .fulfill_random_words(coordinator.id(), first, &[RandomWord::from(1)], START + 50, &bank)
            .await
            .unwrap();

        assert!(!raffle.check_upkeep(START + 50 + INTERVAL).upkeep_needed);
        fill(&mut raffle, &bank, 1).await;
        assert!(!raffle.check_upkeep(START + 50 + INTERVAL - 1).upkeep_needed);
        let second = raffle.perform_upkeep(START + 50 + INTERVAL, &coordinator).await.unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_select_winner() {
        let players: Vec<Address> = (0..4).map(|i| Address::from_label(&format!("p{}", i))).collect();
        assert_eq!(select_winner(&players, &RandomWord::from(42)), Some((2, players[2])));
        assert_eq!(select_winner(&players[..1], &RandomWord::from(u64::MAX)), Some((0, players[0])));
        assert_eq!(select_winner(&[], &RandomWord::from(1)), None);
    }
}
