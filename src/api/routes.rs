//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{handlers::*, websocket::websocket_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Raffle reads come from the latest snapshot
        .route("/raffle", get(raffle_status_handler))
        .route("/raffle/players", get(players_handler))
        .route("/raffle/players/:index", get(player_handler))
        .route("/raffle/upkeep", get(check_upkeep_handler).post(perform_upkeep_handler))
        .route("/raffle/enter", post(enter_handler))
        // Accounts
        .route("/accounts/:address", get(account_handler))
        .route("/faucet", post(faucet_handler))
        // Real-time events
        .route("/ws", get(websocket_handler))
        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
