//! Randomness oracle gateway
//!
//! - `coordinator`: the request/callback traits the raffle depends on
//! - `vrf_engine`: schnorrkel-backed verifiable randomness
//! - `local`: subscription-billed coordinator running in-process

pub mod coordinator;
pub mod local;
pub mod vrf_engine;

pub use coordinator::{RandomWordsRequest, RandomnessConsumer, RandomnessCoordinator};
pub use local::{FulfillmentReceipt, LocalCoordinator, Subscription};
pub use vrf_engine::{RandomnessProof, VrfEngine};
