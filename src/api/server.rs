//! API Server
//!
//! Wires the router, middleware stack and graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::common::types::format_ether;
use crate::config::ApiSettings;
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Initialize the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Calling this twice is harmless.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init();
}

/// Router plus middleware stack, ready to serve or to drive in tests
pub fn build_app(state: Arc<AppState>, settings: &ApiSettings) -> axum::Router {
    create_router(state).layer(
        ServiceBuilder::new()
            // Tracing outermost for complete request tracing
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(settings.request_timeout_secs)))
            // CORS inside the timeout so preflight is answered directly
            .layer(create_cors_layer(settings.allowed_origins.clone()))
            .layer(axum::middleware::from_fn(request_id_middleware)),
    )
}

pub struct ApiServer {
    settings: ApiSettings,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(settings: ApiSettings, state: Arc<AppState>) -> Self {
        Self { settings, state }
    }

    /// Serve until Ctrl+C / SIGTERM
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.socket_addr()?;
        let app = build_app(Arc::clone(&self.state), &self.settings);

        info!("🌐 Starting Raffle API Server (HTTP)");
        info!("   Listen: http://{}", addr);
        self.log_server_info();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("✅ Raffle API Server running");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("🛑 API Server stopped gracefully");
        Ok(())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
        Ok(SocketAddr::from((
            self.settings.host.parse::<std::net::IpAddr>()?,
            self.settings.port,
        )))
    }

    fn log_server_info(&self) {
        let node = &self.state.node_info;
        info!("📋 Server Configuration:");
        info!("   Network: {}", node.network);
        info!("   Version: {}", node.version);
        info!("   Node ID: {}", node.id);
        info!("   CORS: {:?}", self.settings.allowed_origins);
        info!("   Request timeout: {}s", self.settings.request_timeout_secs);
        info!(
            "   Faucet enabled: {} (cap: {})",
            self.state.enable_faucet,
            self.state
                .faucet_cap
                .map(|cap| format!("{} ETH", format_ether(cap)))
                .unwrap_or_else(|| "none".to_string())
        );
        info!("   Metrics enabled: {}", self.state.metrics.is_some());

        info!("📊 Available endpoints:");
        info!("   GET  /health                 - Health check");
        info!("   GET  /raffle                 - Raffle status");
        info!("   GET  /raffle/players         - Current players");
        info!("   GET  /raffle/players/:index  - Player by index");
        info!("   GET  /raffle/upkeep          - Upkeep check");
        info!("   POST /raffle/upkeep          - Close the round");
        info!("   POST /raffle/enter           - Enter the raffle");
        info!("   GET  /accounts/:address      - Account balance");
        info!("   POST /faucet                 - Credit a test account");
        info!("   GET  /ws                     - Event stream");
        info!("   GET  /metrics                - Prometheus metrics");
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
