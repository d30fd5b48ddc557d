//! In-process randomness coordinator
//!
//! Mirrors a subscription-billed VRF coordinator: consumers are registered on
//! funded subscriptions, requests get monotonically increasing ids starting at
//! one, and each id is fulfilled at most once. Fulfilment can be driven
//! manually (tests, simulations) or by a background fulfiller task.

use crate::common::types::{Address, Amount, CoordinatorId, RandomWord, RequestId, SubscriptionId};
use crate::errors::OracleError;
use crate::oracle::coordinator::{RandomWordsRequest, RandomnessConsumer, RandomnessCoordinator};
use crate::oracle::vrf_engine::{RandomnessProof, VrfEngine};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Flat fee per fulfilment, in LINK wei (0.25 LINK)
pub const DEFAULT_BASE_FEE: Amount = 250_000_000_000_000_000;
/// LINK wei charged per unit of callback gas
pub const DEFAULT_GAS_PRICE_LINK: Amount = 1_000_000_000;
pub const MAX_NUM_WORDS: u32 = 500;
pub const MAX_REQUEST_CONFIRMATIONS: u16 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub owner: Address,
    #[serde(with = "crate::lottery::events::amount_string")]
    pub balance: Amount,
    pub consumers: Vec<Address>,
}

/// Outcome of a single fulfilment attempt
#[derive(Debug, Clone, Serialize)]
pub struct FulfillmentReceipt {
    pub request_id: RequestId,
    #[serde(with = "crate::lottery::events::amount_string")]
    pub payment: Amount,
    /// Whether the consumer accepted the callback
    pub success: bool,
    pub random_words: Vec<RandomWord>,
    pub error: Option<String>,
    pub proof: Option<RandomnessProof>,
}

pub struct LocalCoordinator {
    id: CoordinatorId,
    base_fee: Amount,
    gas_price_link: Amount,
    vrf: VrfEngine,
    subscriptions: DashMap<SubscriptionId, Subscription>,
    requests: DashMap<RequestId, RandomWordsRequest>,
    next_subscription_id: AtomicU64,
    next_request_id: AtomicU64,
    /// Feed for the background fulfiller; `None` until one is spawned
    queue: Mutex<Option<mpsc::UnboundedSender<RequestId>>>,
}

impl LocalCoordinator {
    pub fn new(id: CoordinatorId) -> Self {
        Self::with_fees(id, DEFAULT_BASE_FEE, DEFAULT_GAS_PRICE_LINK)
    }

    pub fn with_fees(id: CoordinatorId, base_fee: Amount, gas_price_link: Amount) -> Self {
        Self {
            id,
            base_fee,
            gas_price_link,
            vrf: VrfEngine::new_random(),
            subscriptions: DashMap::new(),
            requests: DashMap::new(),
            next_subscription_id: AtomicU64::new(1),
            next_request_id: AtomicU64::new(1),
            queue: Mutex::new(None),
        }
    }

    pub fn vrf_public_key(&self) -> String {
        self.vrf.public_key_hex()
    }

    // ---- subscriptions ----

    pub fn create_subscription(&self, owner: Address) -> SubscriptionId {
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.insert(
            id,
            Subscription {
                id,
                owner,
                balance: 0,
                consumers: Vec::new(),
            },
        );
        info!("📇 Created subscription {} for {}", id, owner);
        id
    }

    /// Register a subscription under a known id (e.g. one configured for a deployment)
    pub fn create_subscription_with_id(
        &self,
        id: SubscriptionId,
        owner: Address,
    ) -> Result<SubscriptionId, OracleError> {
        if id == 0 || self.subscriptions.contains_key(&id) {
            return Err(OracleError::InvalidSubscription(id));
        }
        self.subscriptions.insert(
            id,
            Subscription {
                id,
                owner,
                balance: 0,
                consumers: Vec::new(),
            },
        );
        self.next_subscription_id.fetch_max(id + 1, Ordering::SeqCst);
        info!("📇 Registered subscription {} for {}", id, owner);
        Ok(id)
    }

    pub fn fund_subscription(&self, subscription_id: SubscriptionId, amount: Amount) -> Result<Amount, OracleError> {
        let mut subscription = self
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or(OracleError::InvalidSubscription(subscription_id))?;
        subscription.balance = subscription.balance.saturating_add(amount);
        Ok(subscription.balance)
    }

    /// Register a consumer; adding twice is a no-op
    pub fn add_consumer(&self, subscription_id: SubscriptionId, consumer: Address) -> Result<(), OracleError> {
        let mut subscription = self
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or(OracleError::InvalidSubscription(subscription_id))?;
        if !subscription.consumers.contains(&consumer) {
            subscription.consumers.push(consumer);
            debug!("Added consumer {} to subscription {}", consumer, subscription_id);
        }
        Ok(())
    }

    pub fn remove_consumer(&self, subscription_id: SubscriptionId, consumer: Address) -> Result<(), OracleError> {
        let mut subscription = self
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or(OracleError::InvalidSubscription(subscription_id))?;
        let before = subscription.consumers.len();
        subscription.consumers.retain(|c| *c != consumer);
        if subscription.consumers.len() == before {
            return Err(OracleError::InvalidConsumer {
                subscription_id,
                consumer,
            });
        }
        Ok(())
    }

    pub fn subscription(&self, subscription_id: SubscriptionId) -> Option<Subscription> {
        self.subscriptions.get(&subscription_id).map(|s| s.clone())
    }

    // ---- requests ----

    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }

    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.requests.contains_key(&request_id)
    }

    /// Price of fulfilling a request with the given callback gas
    pub fn fulfillment_cost(&self, callback_gas_limit: u32) -> Amount {
        self.base_fee
            .saturating_add(self.gas_price_link.saturating_mul(callback_gas_limit as Amount))
    }

    /// Fulfil with VRF-derived words
    pub async fn fulfill_random_words(
        &self,
        request_id: RequestId,
        consumer: &dyn RandomnessConsumer,
    ) -> Result<FulfillmentReceipt, OracleError> {
        let request = self.pending_request(request_id)?;
        let proof = self.vrf.generate(&VrfEngine::input_message(
            request_id,
            &request.key_hash,
            &request.consumer,
            request.subscription_id,
        ));
        let words = VrfEngine::words_from_proof(&proof, request.num_words).map_err(OracleError::Unavailable)?;

        self.deliver(request_id, &request, words, Some(proof), consumer).await
    }

    /// Fulfil with caller-chosen words. An empty list falls back to VRF words.
    pub async fn fulfill_random_words_with_override(
        &self,
        request_id: RequestId,
        consumer: &dyn RandomnessConsumer,
        words: Vec<RandomWord>,
    ) -> Result<FulfillmentReceipt, OracleError> {
        if words.is_empty() {
            return self.fulfill_random_words(request_id, consumer).await;
        }

        let request = self.pending_request(request_id)?;
        if words.len() != request.num_words as usize {
            return Err(OracleError::InvalidRandomWords {
                expected: request.num_words,
                actual: words.len(),
            });
        }

        self.deliver(request_id, &request, words, None, consumer).await
    }

    fn pending_request(&self, request_id: RequestId) -> Result<RandomWordsRequest, OracleError> {
        self.requests
            .get(&request_id)
            .map(|r| r.clone())
            .ok_or(OracleError::NonexistentRequest(request_id))
    }

    /// Bill the subscription, retire the id, then call the consumer.
    ///
    /// The request is consumed even if the consumer rejects the callback;
    /// the rejection is reported in the receipt.
    async fn deliver(
        &self,
        request_id: RequestId,
        request: &RandomWordsRequest,
        words: Vec<RandomWord>,
        proof: Option<RandomnessProof>,
        consumer: &dyn RandomnessConsumer,
    ) -> Result<FulfillmentReceipt, OracleError> {
        let payment = self.fulfillment_cost(request.callback_gas_limit);
        {
            let mut subscription = self
                .subscriptions
                .get_mut(&request.subscription_id)
                .ok_or(OracleError::InvalidSubscription(request.subscription_id))?;
            if subscription.balance < payment {
                return Err(OracleError::InsufficientBalance {
                    subscription_id: request.subscription_id,
                    balance: subscription.balance,
                    payment,
                });
            }
            if self.requests.remove(&request_id).is_none() {
                return Err(OracleError::NonexistentRequest(request_id));
            }
            subscription.balance -= payment;
        }

        let outcome = consumer
            .raw_fulfill_random_words(self.id, request_id, words.clone())
            .await;

        let (success, error) = match outcome {
            Ok(()) => {
                info!("🎲 Fulfilled request {} ({} words)", request_id, words.len());
                (true, None)
            }
            Err(e) => {
                warn!("⚠️ Consumer rejected fulfilment of request {}: {}", request_id, e);
                (false, Some(e.to_string()))
            }
        };

        Ok(FulfillmentReceipt {
            request_id,
            payment,
            success,
            random_words: words,
            error,
            proof,
        })
    }

    pub fn has_fulfiller(&self) -> bool {
        self.queue.lock().map(|queue| queue.is_some()).unwrap_or(false)
    }

    /// Fulfil requests in the background after `delay`, starting with any
    /// already pending.
    ///
    /// Returns `None` if a fulfiller was already started.
    pub fn spawn_fulfiller(
        self: &Arc<Self>,
        consumer: Arc<dyn RandomnessConsumer>,
        delay: Duration,
    ) -> Option<JoinHandle<()>> {
        let mut queue = {
            let mut slot = self.queue.lock().ok()?;
            if slot.is_some() {
                return None;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            let mut backlog: Vec<RequestId> = self.requests.iter().map(|entry| *entry.key()).collect();
            backlog.sort();
            for request_id in backlog {
                let _ = tx.send(request_id);
            }
            *slot = Some(tx);
            rx
        };
        let coordinator = Arc::clone(self);

        Some(tokio::spawn(async move {
            info!("🔮 Randomness fulfiller started (delay {:?})", delay);
            while let Some(request_id) = queue.recv().await {
                tokio::time::sleep(delay).await;
                match coordinator.fulfill_random_words(request_id, consumer.as_ref()).await {
                    Ok(receipt) if !receipt.success => {
                        warn!("Request {} delivered but not accepted", request_id);
                    }
                    Ok(_) => {}
                    Err(OracleError::NonexistentRequest(_)) => {
                        debug!("Request {} already fulfilled", request_id);
                    }
                    Err(e) => warn!("Failed to fulfil request {}: {}", request_id, e),
                }
            }
            debug!("Randomness fulfiller stopped");
        }))
    }
}

#[async_trait]
impl RandomnessCoordinator for LocalCoordinator {
    fn id(&self) -> CoordinatorId {
        self.id
    }

    async fn request_random_words(&self, request: RandomWordsRequest) -> Result<RequestId, OracleError> {
        {
            let subscription = self
                .subscriptions
                .get(&request.subscription_id)
                .ok_or(OracleError::InvalidSubscription(request.subscription_id))?;
            if !subscription.consumers.contains(&request.consumer) {
                return Err(OracleError::InvalidConsumer {
                    subscription_id: request.subscription_id,
                    consumer: request.consumer,
                });
            }
        }
        if request.request_confirmations > MAX_REQUEST_CONFIRMATIONS {
            return Err(OracleError::InvalidRequestConfirmations {
                requested: request.request_confirmations,
                max: MAX_REQUEST_CONFIRMATIONS,
            });
        }
        if request.num_words > MAX_NUM_WORDS {
            return Err(OracleError::NumWordsTooBig {
                requested: request.num_words,
                max: MAX_NUM_WORDS,
            });
        }

        let request_id = RequestId(self.next_request_id.fetch_add(1, Ordering::SeqCst));
        debug!(
            "Randomness requested: id={} consumer={} sub={} words={}",
            request_id, request.consumer, request.subscription_id, request.num_words
        );
        self.requests.insert(request_id, request);
        if let Ok(mut slot) = self.queue.lock() {
            let stopped = slot.as_ref().is_some_and(|tx| tx.send(request_id).is_err());
            if stopped {
                debug!("Fulfiller stopped, request {} left for manual fulfilment", request_id);
                *slot = None;
            }
        }

        Ok(request_id)
    }
}
