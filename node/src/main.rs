use clap::Parser;
use log::{error, info};
use node::config::SessionConfig;
use node::events::{self, EventReceiver, SimEvent};
use node::input;
use node::network::Node;
use node::transport::GossipTransport;
use shared::RosterEntry;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local UDP endpoint; must match one roster entry
    #[arg(short = 'a', long, default_value = "127.0.0.1:9001")]
    addr: SocketAddr,

    /// Roster entry as ID=HOST:PORT, repeated in leadership order
    #[arg(short = 'p', long = "peer", value_name = "ID=ADDR")]
    peers: Vec<RosterEntry>,

    /// Simulation tick period in milliseconds
    #[arg(long, default_value = "500")]
    tick_ms: u64,

    /// Gossip broadcast period in milliseconds
    #[arg(long, default_value = "500")]
    broadcast_ms: u64,

    /// Silent broadcast periods before a peer is evicted
    #[arg(long, default_value = "3")]
    failure_multiplier: u32,

    /// Board side length in cells
    #[arg(long, default_value = "10")]
    grid_size: usize,

    /// Maximum roster size
    #[arg(long, default_value = "6")]
    room_size: usize,

    /// Probability of dropping each outbound datagram
    #[arg(long, default_value = "0.0")]
    loss_rate: f64,

    /// Do not read steering commands from stdin
    #[arg(long)]
    no_console: bool,

    /// Print simulation events to stdout as JSON lines
    #[arg(long)]
    json_events: bool,
}

fn default_roster() -> Vec<RosterEntry> {
    ["p1=127.0.0.1:9001", "p2=127.0.0.1:9002", "p3=127.0.0.1:9003"]
        .iter()
        .filter_map(|entry| entry.parse().ok())
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let roster = if args.peers.is_empty() {
        default_roster()
    } else {
        args.peers
    };

    let config = SessionConfig {
        tick_interval: Duration::from_millis(args.tick_ms),
        broadcast_interval: Duration::from_millis(args.broadcast_ms),
        failure_multiplier: args.failure_multiplier,
        grid_size: args.grid_size,
        room_size: args.room_size,
        loss_rate: args.loss_rate,
        ..SessionConfig::default()
    };

    info!("Starting node on {}", args.addr);
    info!(
        "Roster: {}",
        roster
            .iter()
            .map(|entry| format!("{}={}", entry.id, entry.endpoint))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let transport = GossipTransport::bind(args.addr, config.loss_rate).await?;
    let (tx, rx) = events::channel();
    let handle = Node::bootstrap(config, &roster, transport, tx)?.start();

    if !args.no_console {
        tokio::spawn(input::run_console(handle.node().clone()));
    }

    let events_task = tokio::spawn(report_events(rx, args.json_events));

    tokio::select! {
        result = events_task => {
            if let Err(e) = result {
                error!("Event task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    handle.shutdown();
    Ok(())
}

/// Drains simulation events until the node goes away
async fn report_events(mut rx: EventReceiver, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to serialize event: {}", e),
            }
            continue;
        }

        match event {
            SimEvent::LocalDeath { id } => info!("{} is out of the race", id),
            SimEvent::BoardUpdated(board) => {
                log::debug!("Board now has {} occupied cells", board.occupied_count())
            }
            SimEvent::Victory => info!("Race over"),
        }
    }
}
