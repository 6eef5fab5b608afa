use clap::Parser;
use log::info;
use server::network::Server;
use server::ServerConfig;
use shared::MAP_SEED;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Main loop ticks per second
    #[arg(short, long, default_value = "100")]
    tick_rate: u32,

    /// Per-connection state delta interval in milliseconds
    #[arg(long, default_value = "50")]
    sync_interval_ms: u64,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Map generation seed
    #[arg(long, default_value_t = MAP_SEED)]
    seed: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick_duration: Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64),
        sync_interval: Duration::from_millis(args.sync_interval_ms.max(1)),
        max_clients: args.max_clients,
        map_seed: args.seed,
        ..ServerConfig::default()
    };

    info!("Starting server on {}", config.bind_addr);
    info!(
        "Tick: {:?}, sync: {:?}, max clients: {}, seed: {:#x}",
        config.tick_duration, config.sync_interval, config.max_clients, config.map_seed
    );

    let mut server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
