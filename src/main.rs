//! Raffle node
//!
//! Runs the raffle engine with the in-process randomness coordinator, the
//! upkeep keeper and the HTTP/WebSocket API.

use clap::Parser;
use raffle::api::{handlers::AppState, models::NodeInfo, server, ApiServer};
use raffle::config::{ConfigLoader, LogLevel, RaffleConfig};
use raffle::oracle::RandomnessConsumer;
use raffle::{
    format_ether, Clock, EngineDeps, InMemoryBank, LocalCoordinator, Raffle, RaffleEngine, RaffleMetrics,
    SystemClock, UpkeepKeeper,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "raffle")]
#[command(about = "Autonomous recurring raffle service", long_about = None)]
struct Args {
    /// TOML configuration file (takes precedence over --network)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Network preset: hardhat, localhost or sepolia
    #[arg(long, default_value = "hardhat")]
    network: String,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Disable the upkeep keeper
    #[arg(long)]
    no_keeper: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<LogLevel>,
}

fn load_config(args: &Args) -> Result<RaffleConfig, Box<dyn std::error::Error + Send + Sync>> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new().with_network(args.network.clone()),
    };
    let mut config = loader.load()?;

    if let Some(host) = &args.host {
        config.api.host = host.clone();
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if args.no_keeper {
        config.keeper.enabled = false;
    }
    if let Some(level) = args.log_level {
        config.monitoring.log_level = level;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config = load_config(&args)?;

    server::init_tracing(&config.monitoring.log_level.filter());
    info!("🚀 Starting Raffle node ({})", config.network);

    // Randomness coordinator and its subscription
    let coordinator = Arc::new(LocalCoordinator::with_fees(
        config.oracle.coordinator_id(),
        config.oracle.base_fee_wei()?,
        config.oracle.gas_price_link as u128,
    ));
    let raffle_address = config.raffle.raffle_address();
    let subscription_id = match config.oracle.subscription_id {
        Some(id) => coordinator.create_subscription_with_id(id, raffle_address)?,
        None => coordinator.create_subscription(raffle_address),
    };
    coordinator.fund_subscription(subscription_id, config.oracle.subscription_fund_wei()?)?;
    coordinator.add_consumer(subscription_id, raffle_address)?;

    let params = config.raffle_params(subscription_id)?;
    info!("🎟️ Raffle {} deployed", params.address);
    info!("   Entrance fee: {} ETH", format_ether(params.entrance_fee));
    info!("   Interval: {}s", params.interval);
    info!("   Coordinator: {} (subscription {})", params.coordinator, subscription_id);
    info!("   VRF public key: {}", coordinator.vrf_public_key());

    let bank = Arc::new(InMemoryBank::new(params.address));
    for (account, balance) in config.genesis_balances()? {
        bank.fund(account, balance);
        info!("   Genesis: {} holds {} ETH", account, format_ether(balance));
    }
    let metrics = if config.monitoring.enable_metrics {
        Some(Arc::new(RaffleMetrics::new().map_err(|e| e.to_string())?))
    } else {
        None
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (handle, engine_task) = RaffleEngine::spawn(
        Raffle::new(params, clock.now()),
        EngineDeps {
            coordinator: coordinator.clone(),
            treasury: bank.clone(),
            clock,
            metrics: metrics.clone(),
        },
    );

    let consumer: Arc<dyn RandomnessConsumer> = Arc::new(handle.clone());
    let fulfiller = coordinator.spawn_fulfiller(consumer, config.oracle.fulfillment_delay());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let keeper = if config.keeper.enabled {
        Some(UpkeepKeeper::new(handle.clone(), config.keeper.poll_interval()).spawn(shutdown_rx))
    } else {
        info!("Keeper disabled; rounds close via POST /raffle/upkeep");
        None
    };

    if config.api.enabled {
        let state = Arc::new(AppState {
            handle: handle.clone(),
            bank,
            metrics,
            node_info: NodeInfo {
                id: format!("raffle-{}", raffle_address),
                network: config.network.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            enable_faucet: config.api.enable_faucet,
            faucet_cap: config.api.faucet_cap_wei()?,
        });
        ApiServer::new(config.api.clone(), state).run().await?;
    } else {
        server::shutdown_signal().await;
    }

    // Stop background work
    let _ = shutdown_tx.send(true);
    if let Some(keeper) = keeper {
        if let Err(e) = keeper.await {
            warn!("Keeper task ended abnormally: {}", e);
        }
    }
    if let Some(fulfiller) = fulfiller {
        fulfiller.abort();
    }
    drop(handle);
    engine_task.abort();

    info!("👋 Raffle node stopped");
    Ok(())
}
