//! Raffle HTTP API
//!
//! JSON over HTTP for entering, inspecting and finalizing rounds, plus a
//! WebSocket stream of raffle events.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod websocket;

pub use handlers::AppState;
pub use server::{build_app, ApiServer};
