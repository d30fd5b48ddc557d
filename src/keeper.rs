//! Upkeep automation
//!
//! Polls the read-only upkeep check and triggers finalization when it holds.
//! The engine re-checks inside `perform_upkeep`, so a stale read only ever
//! costs a rejected call.

use crate::common::types::RequestId;
use crate::errors::{RaffleError, RaffleResult};
use crate::lottery::engine::RaffleHandle;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct UpkeepKeeper {
    handle: RaffleHandle,
    poll_interval: Duration,
}

impl UpkeepKeeper {
    pub fn new(handle: RaffleHandle, poll_interval: Duration) -> Self {
        Self { handle, poll_interval }
    }

    /// One poll. Returns the request id when a round was closed.
    pub async fn run_once(&self) -> RaffleResult<Option<RequestId>> {
        let check = self.handle.check_upkeep();
        if !check.upkeep_needed {
            return Ok(None);
        }

        match self.handle.perform_upkeep().await {
            Ok(request_id) => {
                info!("⏰ Upkeep performed, waiting on request {}", request_id);
                Ok(Some(request_id))
            }
            // Someone else closed the round between the check and the call
            Err(RaffleError::UpkeepNotNeeded { .. }) => {
                debug!("Upkeep no longer needed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until `shutdown` flips to true or the engine goes away
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("⏰ Keeper started (poll every {:?})", self.poll_interval);
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(_) => {}
                            Err(RaffleError::EngineUnavailable) => {
                                warn!("Raffle engine gone, keeper stopping");
                                break;
                            }
                            Err(e) => warn!("⚠️ Upkeep failed: {}", e),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Keeper stopped");
        })
    }
}
