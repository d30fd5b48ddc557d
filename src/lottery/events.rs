use crate::common::types::{Address, Amount, RequestId};
use serde::{Deserialize, Serialize};

/// Notifications emitted by the raffle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RaffleEvent {
    /// A participant entered the current round
    #[serde(rename = "entered")]
    Entered {
        player: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },

    /// Finalization started and randomness was requested
    #[serde(rename = "randomness_requested")]
    RandomnessRequested { request_id: RequestId },

    /// The round resolved and the pot was paid
    #[serde(rename = "winner_picked")]
    WinnerPicked {
        winner: Address,
        #[serde(with = "amount_string")]
        prize: Amount,
        request_id: RequestId,
        round: u64,
    },
}

impl RaffleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RaffleEvent::Entered { .. } => "Entered",
            RaffleEvent::RandomnessRequested { .. } => "RandomnessRequested",
            RaffleEvent::WinnerPicked { .. } => "WinnerPicked",
        }
    }
}

/// Amounts travel as decimal strings; JSON numbers cannot hold 128 bits
pub mod amount_string {
    use crate::common::types::Amount;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
