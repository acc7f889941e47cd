use clap::Parser;
use display_server::config::EngineConfig;
use display_server::engine::DisplayEngine;
use display_server::simulation::{BotChurn, SimulatedServer};
use display_server::sink::{OutboundPacket, PacketSink, Recipient};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Runs the display engine against simulated players
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Refresh interval in milliseconds
    #[clap(short, long, default_value = "1000")]
    refresh_ms: u64,

    /// Attribute lookup timeout in milliseconds
    #[clap(short, long, default_value = "250")]
    lookup_timeout_ms: u64,

    /// Simulated players online at start
    #[clap(short, long, default_value = "8")]
    bots: usize,

    /// Seconds between bot replacements, 0 to disable
    #[clap(short, long, default_value = "5")]
    churn_secs: u64,

    /// Max players shown in the tab footer
    #[clap(short, long, default_value = "100")]
    max_players: usize,

    /// Address shown at the bottom of the sidebar
    #[clap(short = 'a', long)]
    server_address: Option<String>,

    /// Upper bound of the simulated lookup latency in milliseconds
    #[clap(long, default_value = "40")]
    latency_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config = match &args.server_address {
        Some(address) => EngineConfig::with_server_address(address),
        None => EngineConfig::default(),
    }
    .refresh_interval(Duration::from_millis(args.refresh_ms))
    .lookup_timeout(Duration::from_millis(args.lookup_timeout_ms));

    let server = Arc::new(SimulatedServer::new(
        args.max_players,
        Duration::from_millis(args.latency_ms),
    ));

    // Stand-in transport: counts what would go out on the wire
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(drain_transport(outbound_rx));

    let mut engine = DisplayEngine::new(
        config,
        server.clone(),
        Some(server.clone()),
        PacketSink::new(outbound_tx),
    );
    let handle = engine.handle();

    let churn = BotChurn::new(Arc::clone(&server), handle.clone());
    tokio::spawn(churn.run(args.bots, Duration::from_secs(args.churn_secs)));

    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
        }
    });

    engine.run().await;

    Ok(())
}

async fn drain_transport(mut outbound: mpsc::UnboundedReceiver<OutboundPacket>) {
    let mut packets = 0u64;
    let mut bytes = 0usize;

    while let Some(packet) = outbound.recv().await {
        packets += 1;
        bytes += packet.payload.len();

        if let Recipient::Client(client) = &packet.recipient {
            debug!("{} bytes for {}", packet.payload.len(), client);
        }
        if packets % 1000 == 0 {
            info!("Transport sent {} packets ({} bytes)", packets, bytes);
        }
    }
}
