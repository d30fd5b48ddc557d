//! Single-owner raffle engine
//!
//! One task owns the `Raffle` and applies commands in arrival order, so
//! mutations are serialized without locks. After every command it publishes
//! a fresh `RaffleSnapshot` on a watch channel; readers never queue behind
//! writers. Successful mutations are announced on a broadcast channel.

use crate::clock::Clock;
use crate::common::types::{Address, Amount, CoordinatorId, RaffleState, RandomWord, RequestId};
use crate::errors::{RaffleError, RaffleResult};
use crate::lottery::events::RaffleEvent;
use crate::lottery::raffle::{Raffle, RaffleSnapshot, Resolution};
use crate::lottery::round::UpkeepCheck;
use crate::metrics::RaffleMetrics;
use crate::oracle::coordinator::{RandomnessConsumer, RandomnessCoordinator};
use crate::settlement::Treasury;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 1024;

/// Collaborators the engine calls out to
#[derive(Clone)]
pub struct EngineDeps {
    pub coordinator: Arc<dyn RandomnessCoordinator>,
    pub treasury: Arc<dyn Treasury>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Option<Arc<RaffleMetrics>>,
}

enum Command {
    Enter {
        player: Address,
        payment: Amount,
        reply: oneshot::Sender<RaffleResult<()>>,
    },
    PerformUpkeep {
        reply: oneshot::Sender<RaffleResult<RequestId>>,
    },
    Fulfill {
        caller: CoordinatorId,
        request_id: RequestId,
        random_words: Vec<RandomWord>,
        reply: oneshot::Sender<RaffleResult<Resolution>>,
    },
}

pub struct RaffleEngine {
    raffle: Raffle,
    deps: EngineDeps,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<RaffleSnapshot>,
    events: broadcast::Sender<RaffleEvent>,
}

impl RaffleEngine {
    /// Move `raffle` into its own task and return a handle to it.
    /// The task ends once every handle is dropped.
    pub fn spawn(raffle: Raffle, deps: EngineDeps) -> (RaffleHandle, JoinHandle<()>) {
        if deps.coordinator.id() != raffle.params().coordinator {
            warn!(
                "⚠️ Coordinator {} differs from the configured coordinator {}; callbacks will be rejected",
                deps.coordinator.id(),
                raffle.params().coordinator
            );
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(raffle.snapshot());
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        if let Some(metrics) = &deps.metrics {
            metrics.observe_snapshot(&raffle.snapshot());
        }

        let handle = RaffleHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            events: event_tx.clone(),
            clock: Arc::clone(&deps.clock),
        };

        let engine = RaffleEngine {
            raffle,
            deps,
            commands: command_rx,
            snapshots: snapshot_tx,
            events: event_tx,
        };

        (handle, tokio::spawn(engine.run()))
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command).await;
        }
        debug!("Raffle engine stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enter { player, payment, reply } => {
                let result = self
                    .raffle
                    .enter(player, payment, self.deps.treasury.as_ref())
                    .await;
                let result = self.finish(result, |event| event.clone());
                let _ = reply.send(result.map(|_| ()));
            }
            Command::PerformUpkeep { reply } => {
                let now = self.deps.clock.now();
                let result = self
                    .raffle
                    .perform_upkeep(now, self.deps.coordinator.as_ref())
                    .await;
                let result = self.finish(result, |request_id| RaffleEvent::RandomnessRequested {
                    request_id: *request_id,
                });
                let _ = reply.send(result);
            }
            Command::Fulfill {
                caller,
                request_id,
                random_words,
                reply,
            } => {
                let now = self.deps.clock.now();
                let result = self
                    .raffle
                    .fulfill_random_words(caller, request_id, &random_words, now, self.deps.treasury.as_ref())
                    .await;
                let result = self.finish(result, Resolution::event);
                let _ = reply.send(result);
            }
        }
    }

    /// Publish the new snapshot, then emit the event for a successful command.
    /// Runs before the reply so callers observe their own writes.
    fn finish<T>(&self, result: RaffleResult<T>, to_event: impl FnOnce(&T) -> RaffleEvent) -> RaffleResult<T> {
        self.publish_snapshot();
        match &result {
            Ok(value) => {
                let event = to_event(value);
                if let Some(metrics) = &self.deps.metrics {
                    metrics.record_event(&event);
                }
                // No subscribers is fine
                let _ = self.events.send(event);
            }
            Err(e) => {
                debug!("Command rejected: {}", e);
                if let Some(metrics) = &self.deps.metrics {
                    metrics.record_error(e);
                }
            }
        }
        result
    }

    fn publish_snapshot(&self) {
        let snapshot = self.raffle.snapshot();
        if let Some(metrics) = &self.deps.metrics {
            metrics.observe_snapshot(&snapshot);
        }
        self.snapshots.send_replace(snapshot);
    }
}

/// Cloneable front door to a running engine
#[derive(Clone)]
pub struct RaffleHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<RaffleSnapshot>,
    events: broadcast::Sender<RaffleEvent>,
    clock: Arc<dyn Clock>,
}

impl RaffleHandle {
    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<RaffleResult<T>>) -> Command) -> RaffleResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| RaffleError::EngineUnavailable)?;
        response.await.map_err(|_| RaffleError::EngineUnavailable)?
    }

    pub async fn enter(&self, player: Address, payment: Amount) -> RaffleResult<()> {
        self.call(|reply| Command::Enter { player, payment, reply }).await
    }

    pub async fn perform_upkeep(&self) -> RaffleResult<RequestId> {
        self.call(|reply| Command::PerformUpkeep { reply }).await
    }

    pub async fn fulfill_random_words(
        &self,
        caller: CoordinatorId,
        request_id: RequestId,
        random_words: Vec<RandomWord>,
    ) -> RaffleResult<Resolution> {
        self.call(|reply| Command::Fulfill {
            caller,
            request_id,
            random_words,
            reply,
        })
        .await
    }

    /// Evaluated against the latest snapshot; never waits on the engine
    pub fn check_upkeep(&self) -> UpkeepCheck {
        self.snapshots.borrow().check_upkeep(self.clock.now())
    }

    pub fn snapshot(&self) -> RaffleSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next published snapshot
    pub async fn changed(&mut self) -> RaffleResult<RaffleSnapshot> {
        self.snapshots
            .changed()
            .await
            .map_err(|_| RaffleError::EngineUnavailable)?;
        Ok(self.snapshots.borrow_and_update().clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RaffleEvent> {
        self.events.subscribe()
    }

    pub fn raffle_state(&self) -> RaffleState {
        self.snapshots.borrow().state
    }

    pub fn entrance_fee(&self) -> Amount {
        self.snapshots.borrow().entrance_fee
    }

    pub fn interval(&self) -> u64 {
        self.snapshots.borrow().interval
    }

    pub fn player(&self, index: usize) -> Option<Address> {
        self.snapshots.borrow().player(index)
    }

    pub fn number_of_players(&self) -> usize {
        self.snapshots.borrow().number_of_players()
    }

    pub fn recent_winner(&self) -> Option<Address> {
        self.snapshots.borrow().recent_winner
    }

    pub fn latest_timestamp(&self) -> u64 {
        self.snapshots.borrow().last_timestamp
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}

#[async_trait]
impl RandomnessConsumer for RaffleHandle {
    async fn raw_fulfill_random_words(
        &self,
        caller: CoordinatorId,
        request_id: RequestId,
        random_words: Vec<RandomWord>,
    ) -> RaffleResult<()> {
        self.fulfill_random_words(caller, request_id, random_words)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lottery::raffle::RaffleParams;
    use crate::oracle::local::LocalCoordinator;
    use crate::settlement::InMemoryBank;

    const FEE: Amount = 10_000_000_000_000_000;
    const INTERVAL: u64 = 30;
    const START: u64 = 1_700_000_000;

    struct Harness {
        handle: RaffleHandle,
        clock: Arc<ManualClock>,
        bank: Arc<InMemoryBank>,
        coordinator: Arc<LocalCoordinator>,
    }

    fn harness() -> Harness {
        let coordinator = Arc::new(LocalCoordinator::new(Address::from_label("coordinator")));
        let address = Address::from_label("raffle");
        let sub = coordinator.create_subscription(address);
        coordinator.fund_subscription(sub, 100_000_000_000_000_000_000).unwrap();
        coordinator.add_consumer(sub, address).unwrap();

        let mut params = RaffleParams::new(address, coordinator.id(), FEE, INTERVAL);
        params.subscription_id = sub;

        let clock = Arc::new(ManualClock::new(START));
        let bank = Arc::new(InMemoryBank::new(address));
        let (handle, _task) = RaffleEngine::spawn(
            Raffle::new(params, START),
            EngineDeps {
                coordinator: coordinator.clone(),
                treasury: bank.clone(),
                clock: clock.clone(),
                metrics: None,
            },
        );

        Harness {
            handle,
            clock,
            bank,
            coordinator,
        }
    }

    #[tokio::test]
    async fn test_enter_publishes_snapshot_and_event() {
        let h = harness();
        let mut events = h.handle.subscribe();
        let player = Address::from_label("alice");
        h.bank.fund(player, FEE);

        h.handle.enter(player, FEE).await.unwrap();

        assert_eq!(h.handle.number_of_players(), 1);
        assert_eq!(h.handle.player(0), Some(player));
        assert_eq!(events.recv().await.unwrap(), RaffleEvent::Entered { player, amount: FEE });
    }

    #[tokio::test]
    async fn test_rejected_command_emits_nothing() {
        let h = harness();
        let mut events = h.handle.subscribe();

        let err = h.handle.enter(Address::from_label("bob"), FEE - 1).await.unwrap_err();
        assert!(matches!(err, RaffleError::InsufficientPayment { .. }));
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_check_upkeep_follows_clock() {
        let h = harness();
        let player = Address::from_label("alice");
        h.bank.fund(player, FEE);
        h.handle.enter(player, FEE).await.unwrap();

        assert!(!h.handle.check_upkeep().upkeep_needed);
        h.clock.advance(INTERVAL + 1);
        assert!(h.handle.check_upkeep().upkeep_needed);
    }

    #[tokio::test]
    async fn test_concurrent_entries_are_all_recorded() {
        let h = harness();
        let mut tasks = Vec::new();
        for i in 0..50 {
            let handle = h.handle.clone();
            let player = Address::from_label(&format!("player-{}", i));
            h.bank.fund(player, FEE);
            tasks.push(tokio::spawn(async move { handle.enter(player, FEE).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let snapshot = h.handle.snapshot();
        assert_eq!(snapshot.number_of_players(), 50);
        assert_eq!(snapshot.pot, 50 * FEE);
        assert_eq!(h.bank.escrow_balance(), 50 * FEE);
    }

    #[tokio::test]
    async fn test_full_round_through_coordinator() {
        let h = harness();
        let mut events = h.handle.subscribe();
        let players: Vec<Address> = (0..4).map(|i| Address::from_label(&format!("p{}", i))).collect();
        for player in &players {
            h.bank.fund(*player, FEE);
            h.handle.enter(*player, FEE).await.unwrap();
        }

        h.clock.advance(INTERVAL + 1);
        let request_id = h.handle.perform_upkeep().await.unwrap();
        assert_eq!(h.handle.raffle_state(), RaffleState::Calculating);

        h.clock.advance(5);
        let receipt = h
            .coordinator
            .fulfill_random_words_with_override(request_id, &h.handle, vec![RandomWord::from(42)])
            .await
            .unwrap();
        assert!(receipt.success);

        assert_eq!(h.handle.recent_winner(), Some(players[2]));
        assert_eq!(h.handle.raffle_state(), RaffleState::Open);
        assert_eq!(h.handle.number_of_players(), 0);
        assert_eq!(h.handle.latest_timestamp(), START + INTERVAL + 6);
        assert_eq!(h.bank.balance_of(&players[2]), 4 * FEE);

        let names: Vec<&str> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(names.len(), 6);
        assert_eq!(names[4], "RandomnessRequested");
        assert_eq!(names[5], "WinnerPicked");
    }

    #[tokio::test]
    async fn test_concurrent_upkeep_has_one_winner() {
        let h = harness();
        let player = Address::from_label("alice");
        h.bank.fund(player, FEE);
        h.handle.enter(player, FEE).await.unwrap();
        h.clock.advance(INTERVAL);

        let (a, b) = tokio::join!(h.handle.perform_upkeep(), h.handle.perform_upkeep());
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        assert_eq!(h.coordinator.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_clone_observes_changes() {
        let h = harness();
        let mut watcher = h.handle.clone();

        let player = Address::from_label("alice");
        h.bank.fund(player, FEE);
        h.handle.enter(player, FEE).await.unwrap();

        let snapshot = watcher.changed().await.unwrap();
        assert_eq!(snapshot.number_of_players(), 1);
    }

    #[tokio::test]
    async fn test_stopped_engine_is_unavailable() {
        let h = harness();
        let (handle, task) = RaffleEngine::spawn(
            Raffle::new(
                RaffleParams::new(Address::from_label("other"), h.coordinator.id(), FEE, INTERVAL),
                START,
            ),
            EngineDeps {
                coordinator: h.coordinator.clone(),
                treasury: h.bank.clone(),
                clock: h.clock.clone(),
                metrics: None,
            },
        );
        task.abort();
        let _ = task.await;

        assert_eq!(
            handle.enter(Address::from_label("alice"), FEE).await.unwrap_err(),
            RaffleError::EngineUnavailable
        );
    }
}
