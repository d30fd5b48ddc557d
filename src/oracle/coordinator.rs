//! Randomness request/callback seam
//!
//! The raffle talks to the oracle only through these two traits: it asks a
//! `RandomnessCoordinator` for words, and later the oracle transport calls
//! back into a `RandomnessConsumer` with the result.

use crate::common::types::{Address, CoordinatorId, KeyHash, RandomWord, RequestId, SubscriptionId};
use crate::errors::{OracleError, RaffleResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Parameters of a randomness request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomWordsRequest {
    /// Contract/consumer that will receive the callback
    pub consumer: Address,
    pub key_hash: KeyHash,
    pub subscription_id: SubscriptionId,
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
}

/// Oracle side: accepts requests and hands back an id
#[async_trait]
pub trait RandomnessCoordinator: Send + Sync {
    /// Identity the coordinator uses when it calls back
    fn id(&self) -> CoordinatorId;

    async fn request_random_words(&self, request: RandomWordsRequest) -> Result<RequestId, OracleError>;
}

/// Consumer side: receives the oracle callback
#[async_trait]
pub trait RandomnessConsumer: Send + Sync {
    async fn raw_fulfill_random_words(
        &self,
        caller: CoordinatorId,
        request_id: RequestId,
        random_words: Vec<RandomWord>,
    ) -> RaffleResult<()>;
}
