//! Raffle round simulator
//!
//! Plays complete rounds against the in-process coordinator on a manual
//! clock: funds players, enters them, closes the round and delivers
//! randomness, then reports the winner and balances.

use clap::Parser;
use raffle::api::server::init_tracing;
use raffle::{
    format_ether, parse_ether, Address, Clock, EngineDeps, InMemoryBank, LocalCoordinator, ManualClock, RaffleEngine,
    RaffleEvent, RaffleMetrics, RaffleParams, RandomWord, RandomnessCoordinator, Raffle, UpkeepKeeper,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(name = "raffle-simulate")]
#[command(about = "Simulate raffle rounds end to end", long_about = None)]
struct Args {
    /// Players per round
    #[arg(long, default_value = "4")]
    players: usize,

    /// Entrance fee in ether
    #[arg(long, default_value = "0.01")]
    fee: String,

    /// Round interval in seconds
    #[arg(long, default_value = "30")]
    interval: u64,

    /// Number of rounds to play
    #[arg(long, default_value = "1")]
    rounds: u64,

    /// Fixed random word instead of VRF output
    #[arg(long)]
    word: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    init_tracing("raffle=warn");

    if args.players == 0 {
        return Err("--players must be at least 1".into());
    }
    let fee = parse_ether(&args.fee)?;
    if fee == 0 {
        return Err("--fee must be greater than 0".into());
    }

    let start = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let clock = Arc::new(ManualClock::new(start));

    let coordinator = Arc::new(LocalCoordinator::new(Address::from_label("local-vrf-coordinator")));
    let raffle_address = Address::from_label("raffle");
    let subscription_id = coordinator.create_subscription(raffle_address);
    coordinator.fund_subscription(subscription_id, parse_ether("100")?)?;
    coordinator.add_consumer(subscription_id, raffle_address)?;

    let mut params = RaffleParams::new(raffle_address, coordinator.id(), fee, args.interval);
    params.subscription_id = subscription_id;

    let bank = Arc::new(InMemoryBank::new(raffle_address));
    let metrics = Arc::new(RaffleMetrics::new().map_err(|e| e.to_string())?);
    let (handle, _engine) = RaffleEngine::spawn(
        Raffle::new(params, clock.now()),
        EngineDeps {
            coordinator: coordinator.clone(),
            treasury: bank.clone(),
            clock: clock.clone(),
            metrics: Some(metrics.clone()),
        },
    );
    let mut events = handle.subscribe();
    let keeper = UpkeepKeeper::new(handle.clone(), Duration::from_secs(1));

    println!("🎲 Raffle Simulation");
    println!("====================");
    println!("Players per round: {}", args.players);
    println!("Entrance fee:      {} ETH", format_ether(fee));
    println!("Interval:          {}s", args.interval);
    println!("VRF public key:    {}\n", coordinator.vrf_public_key());

    for round in 1..=args.rounds {
        let players: Vec<Address> = (0..args.players)
            .map(|i| Address::from_label(&format!("round-{}-player-{}", round, i)))
            .collect();
        for player in &players {
            bank.fund(*player, fee);
            handle.enter(*player, fee).await?;
        }

        println!("Round {}: {} players, pot {} ETH", round, players.len(), format_ether(handle.snapshot().pot));
        let check = handle.check_upkeep();
        println!("   Upkeep before interval: {}", check.upkeep_needed);

        clock.advance(args.interval + 1);
        let request_id = keeper.run_once().await?.ok_or("upkeep was not needed")?;
        println!("   Randomness requested (request {})", request_id);

        let receipt = match args.word {
            Some(word) => {
                coordinator
                    .fulfill_random_words_with_override(request_id, &handle, vec![RandomWord::from(word)])
                    .await?
            }
            None => coordinator.fulfill_random_words(request_id, &handle).await?,
        };
        if !receipt.success {
            return Err(format!("round {} was not resolved: {:?}", round, receipt.error).into());
        }
        println!("   Random word: {}", receipt.random_words[0]);
        println!("   Oracle fee:  {} LINK", format_ether(receipt.payment));

        let winner = handle.recent_winner().ok_or("no winner recorded")?;
        let index = players.iter().position(|p| *p == winner).unwrap_or_default();
        println!("   🏆 Winner: {} (index {})", winner, index);
        println!("   Winner balance: {} ETH\n", format_ether(bank.balance_of(&winner)));
    }

    println!("Events:");
    while let Ok(event) = events.try_recv() {
        match event {
            RaffleEvent::WinnerPicked { winner, prize, round, .. } => {
                println!("   WinnerPicked round={} winner={} prize={} ETH", round, winner, format_ether(prize))
            }
            other => println!("   {}", other.name()),
        }
    }

    println!("\nWinners picked: {}", metrics.winners_picked());
    Ok(())
}
