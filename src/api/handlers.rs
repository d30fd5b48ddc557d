//! Request Handlers
//!
//! Reads are served from the latest engine snapshot and never wait on a
//! mutation; writes go through the engine handle.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::common::types::{parse_ether, Address, Amount};
use crate::lottery::engine::RaffleHandle;
use crate::metrics::RaffleMetrics;
use crate::settlement::InMemoryBank;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use tracing::info;

/// Shared application state
pub struct AppState {
    pub handle: RaffleHandle,
    pub bank: Arc<InMemoryBank>,
    pub metrics: Option<Arc<RaffleMetrics>>,
    pub node_info: NodeInfo,
    pub enable_faucet: bool,
    /// Faucet refuses to lift a balance above this many wei
    pub faucet_cap: Option<Amount>,
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// GET /raffle
pub async fn raffle_status_handler(State(state): State<Arc<AppState>>) -> Json<RaffleStatusResponse> {
    let snapshot = state.handle.snapshot();
    Json(RaffleStatusResponse::new(state.node_info.clone(), &snapshot))
}

/// GET /raffle/players
pub async fn players_handler(State(state): State<Arc<AppState>>) -> Json<PlayersResponse> {
    let snapshot = state.handle.snapshot();
    Json(PlayersResponse {
        players: snapshot.players.to_vec(),
        count: snapshot.number_of_players(),
    })
}

/// GET /raffle/players/:index
pub async fn player_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<PlayerResponse>, ApiError> {
    state
        .handle
        .player(index)
        .map(|player| Json(PlayerResponse { index, player }))
        .ok_or_else(|| ApiError::not_found(request_id.0, format!("No player at index {}", index)))
}

/// GET /raffle/upkeep
pub async fn check_upkeep_handler(State(state): State<Arc<AppState>>) -> Json<UpkeepResponse> {
    let check = state.handle.check_upkeep();
    Json(UpkeepResponse {
        upkeep_needed: check.upkeep_needed,
        diagnostics: check.diagnostics,
    })
}

/// POST /raffle/upkeep
pub async fn perform_upkeep_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PerformUpkeepResponse>, ApiError> {
    let id = state
        .handle
        .perform_upkeep()
        .await
        .map_err(|e| ApiError::from_raffle(request_id.0, e))?;

    Ok(Json(PerformUpkeepResponse {
        request_id: id,
        state: state.handle.raffle_state(),
    }))
}

/// POST /raffle/enter
///
/// The request is not signed: `player` is taken on trust and its bank balance
/// pays the fee. Only expose this route to clients that are allowed to act for
/// every funded account, such as a local wallet proxy or a test harness.
pub async fn enter_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnterRequest>,
) -> Result<Json<EnterResponse>, ApiError> {
    state
        .handle
        .enter(request.player, request.amount)
        .await
        .map_err(|e| ApiError::from_raffle(request_id.0, e))?;

    Ok(Json(EnterResponse {
        player: request.player,
        amount: request.amount,
        number_of_players: state.handle.number_of_players(),
    }))
}

/// GET /accounts/:address
pub async fn account_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address: Address = address
        .parse()
        .map_err(|e| ApiError::bad_request(request_id.0, format!("Invalid address: {}", e)))?;

    Ok(Json(AccountResponse::new(address, state.bank.balance_of(&address))))
}

/// POST /faucet
pub async fn faucet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<FaucetRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    if !state.enable_faucet {
        return Err(ApiError::forbidden(request_id.0, "Faucet is disabled".to_string()));
    }

    let amount = parse_ether(&request.amount_ether)
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), e.to_string()))?;
    let balance = match state.faucet_cap {
        Some(cap) => state
            .bank
            .fund_up_to(request.address, amount, cap)
            .map_err(|e| ApiError::bad_request(request_id.0, format!("Faucet refused: {}", e)))?,
        None => state.bank.fund(request.address, amount),
    };
    info!("💧 Faucet credited {} with {} ether", request.address, request.amount_ether);

    Ok(Json(AccountResponse::new(request.address, balance)))
}

/// GET /metrics
pub async fn metrics_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let metrics = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::not_found(request_id.0.clone(), "Metrics are disabled".to_string()))?;

    let body = metrics
        .render()
        .map_err(|e| ApiError::internal_error(request_id.0, format!("Failed to render metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
