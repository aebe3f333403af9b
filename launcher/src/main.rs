use clap::{Parser, Subcommand};
use launcher::network::{next_heartbeat_delay, MasterClient};
use log::{error, info, warn};
use protocol::DEFAULT_MASTER_PORT;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Master server address
    #[arg(short = 's', long, global = true, default_value_t = format!("127.0.0.1:{}", DEFAULT_MASTER_PORT))]
    master: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the servers currently listed by the master
    Query {
        /// Milliseconds to wait for the reply
        #[arg(short, long, default_value_t = 2000)]
        timeout_ms: u64,
    },
    /// Keep a game server listed by announcing it periodically
    Announce {
        /// Game port to register; defaults to the port heartbeats are sent from
        #[arg(short, long)]
        port: Option<u16>,

        /// Local address to send heartbeats from
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: String,

        /// Seconds between heartbeats
        #[arg(short, long, default_value_t = 60)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    match args.command {
        Command::Query { timeout_ms } => {
            let client = MasterClient::connect(&args.master).await?;
            let servers = client.query(Duration::from_millis(timeout_ms)).await?;

            info!("{} servers listed by {}", servers.len(), client.master_addr());
            for server in servers {
                println!("{}", server);
            }
        }
        Command::Announce {
            port,
            bind,
            interval_secs,
        } => {
            let client = MasterClient::connect_from(&args.master, &bind).await?;
            if port.is_none() {
                warn!(
                    "No game port given, the master will list {}",
                    client.local_addr()?
                );
            }

            let interval = Duration::from_secs(interval_secs);
            let mut rng = rand::thread_rng();

            loop {
                match client.announce(port).await {
                    Ok(()) => info!("Announced to {}", client.master_addr()),
                    Err(e) => error!("Failed to announce to {}: {}", client.master_addr(), e),
                }

                tokio::select! {
                    _ = tokio::time::sleep(next_heartbeat_delay(interval, &mut rng)) => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
