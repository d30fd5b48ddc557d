//! Error types for the raffle service
//!
//! Every failure is local and synchronous: it is returned to the caller that
//! triggered it and never retried or swallowed inside the core.

use crate::common::types::{Address, Amount, RaffleState, RequestId, SubscriptionId};
use crate::lottery::round::UpkeepDiagnostics;

/// Business errors surfaced by the raffle state machine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RaffleError {
    /// Payment below the entrance fee
    #[error("Not enough funds entered: paid {paid} wei, required {required} wei")]
    InsufficientPayment { paid: Amount, required: Amount },

    /// Entry attempted while the round is not accepting entries
    #[error("Raffle is not open (state: {state})")]
    NotOpen { state: RaffleState },

    /// Entry ledger reached its configured capacity
    #[error("Round is full ({max} entries)")]
    RoundFull { max: usize },

    /// Finalization attempted while the upkeep predicate is false
    #[error(
        "Upkeep not needed (balance: {} wei, players: {}, state: {})",
        .diagnostics.pot, .diagnostics.players, .diagnostics.state
    )]
    UpkeepNotNeeded { diagnostics: UpkeepDiagnostics },

    /// Callback for an id that is not the single outstanding request
    #[error("Unknown randomness request {request_id}")]
    UnknownRequest { request_id: RequestId },

    /// Callback from a transport other than the configured coordinator
    #[error("Only the coordinator can fulfill randomness (caller: {caller})")]
    UnauthorizedCaller { caller: Address },

    /// Callback carried no random words
    #[error("Randomness callback carried no random words")]
    MissingRandomness,

    /// Resolution reached with an empty ledger
    #[error("No players in the current round")]
    NoPlayers,

    /// Prize transfer failed; the resolution was not applied
    #[error("Payout of {amount} wei to {winner} failed: {reason}")]
    PayoutFailed {
        winner: Address,
        amount: Amount,
        reason: PaymentError,
    },

    /// Entry payment could not be collected
    #[error("Payment of {amount} wei from {player} rejected: {reason}")]
    PaymentRejected {
        player: Address,
        amount: Amount,
        reason: PaymentError,
    },

    /// Randomness request failed; the round stays open
    #[error("Randomness request failed: {0}")]
    Oracle(#[from] OracleError),

    /// The engine task is gone
    #[error("Raffle engine unavailable")]
    EngineUnavailable,
}

/// Fund movement errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("insufficient balance: available {available}, needed {needed}")]
    InsufficientBalance { available: Amount, needed: Amount },

    #[error("recipient {0} cannot accept funds")]
    RecipientRejected(Address),

    #[error("escrow holds {held}, owes {owed}")]
    EscrowUnderfunded { held: Amount, owed: Amount },

    #[error("balance {balance} plus {requested} would exceed the cap of {cap}")]
    CapExceeded {
        balance: Amount,
        requested: Amount,
        cap: Amount,
    },
}

/// Randomness oracle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("invalid subscription {0}")]
    InvalidSubscription(SubscriptionId),

    #[error("consumer {consumer} is not registered on subscription {subscription_id}")]
    InvalidConsumer {
        subscription_id: SubscriptionId,
        consumer: Address,
    },

    #[error("too many words requested: {requested} (max {max})")]
    NumWordsTooBig { requested: u32, max: u32 },

    #[error("invalid request confirmations: {requested} (max {max})")]
    InvalidRequestConfirmations { requested: u16, max: u16 },

    #[error("nonexistent request {0}")]
    NonexistentRequest(RequestId),

    #[error("subscription {subscription_id} balance {balance} cannot cover payment {payment}")]
    InsufficientBalance {
        subscription_id: SubscriptionId,
        balance: Amount,
        payment: Amount,
    },

    #[error("expected {expected} random words, got {actual}")]
    InvalidRandomWords { expected: u32, actual: usize },

    #[error("coordinator returned invalid request id {0}")]
    InvalidRequestId(RequestId),

    #[error("coordinator unavailable: {0}")]
    Unavailable(String),
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Unknown network preset '{0}'")]
    UnknownNetwork(String),
}

/// Convenience type alias for raffle operations
pub type RaffleResult<T> = Result<T, RaffleError>;
