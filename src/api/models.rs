//! API Request/Response Models

use crate::common::types::{format_ether, Address, Amount, RaffleState, RequestId};
use crate::lottery::events::amount_string;
use crate::lottery::raffle::RaffleSnapshot;
use crate::lottery::round::UpkeepDiagnostics;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub network: String,
    pub version: String,
}

/// GET /raffle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaffleStatusResponse {
    pub node_info: NodeInfo,
    pub address: Address,
    pub state: RaffleState,
    /// 0 open, 1 calculating
    pub state_code: u8,
    #[serde(with = "amount_string")]
    pub entrance_fee: Amount,
    pub entrance_fee_ether: String,
    pub interval: u64,
    pub number_of_players: usize,
    #[serde(with = "amount_string")]
    pub pot: Amount,
    pub recent_winner: Option<Address>,
    pub last_timestamp: u64,
    pub last_timestamp_utc: Option<DateTime<Utc>>,
    pub pending_request: Option<RequestId>,
    pub rounds_completed: u64,
}

impl RaffleStatusResponse {
    pub fn new(node_info: NodeInfo, snapshot: &RaffleSnapshot) -> Self {
        Self {
            node_info,
            address: snapshot.address,
            state: snapshot.state,
            state_code: snapshot.state.as_u8(),
            entrance_fee: snapshot.entrance_fee,
            entrance_fee_ether: format_ether(snapshot.entrance_fee),
            interval: snapshot.interval,
            number_of_players: snapshot.number_of_players(),
            pot: snapshot.pot,
            recent_winner: snapshot.recent_winner,
            last_timestamp: snapshot.last_timestamp,
            last_timestamp_utc: i64::try_from(snapshot.last_timestamp)
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            pending_request: snapshot.pending_request,
            rounds_completed: snapshot.rounds_completed,
        }
    }
}

/// GET /raffle/players
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayersResponse {
    pub players: Vec<Address>,
    pub count: usize,
}

/// GET /raffle/players/:index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerResponse {
    pub index: usize,
    pub player: Address,
}

/// GET /raffle/upkeep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpkeepResponse {
    pub upkeep_needed: bool,
    pub diagnostics: UpkeepDiagnostics,
}

/// POST /raffle/enter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterRequest {
    pub player: Address,
    /// Payment in wei, as a decimal string
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterResponse {
    pub player: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
    pub number_of_players: usize,
}

/// POST /raffle/upkeep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformUpkeepResponse {
    pub request_id: RequestId,
    pub state: RaffleState,
}

/// GET /accounts/:address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub balance: Amount,
    pub balance_ether: String,
}

impl AccountResponse {
    pub fn new(address: Address, balance: Amount) -> Self {
        Self {
            address,
            balance,
            balance_ether: format_ether(balance),
        }
    }
}

/// POST /faucet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub address: Address,
    /// Amount in ether, e.g. `"1.5"`
    pub amount_ether: String,
}
