use clap::Parser;
use log::info;
use master::config::{
    MasterConfig, OversizePolicy, DEFAULT_HOST, DEFAULT_MAX_SERVERS_PER_ADDRESS,
    DEFAULT_MAX_SERVER_AGE, DEFAULT_PORT,
};
use master::network::Master;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value_t = DEFAULT_HOST)]
    host: IpAddr,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Milliseconds without a heartbeat before a server is dropped
    #[arg(short = 'a', long, default_value_t = DEFAULT_MAX_SERVER_AGE.as_millis() as u64)]
    max_server_age: u64,

    /// Maximum number of servers a single IP address may register
    #[arg(short, long, default_value_t = DEFAULT_MAX_SERVERS_PER_ADDRESS)]
    max_servers_per_address: usize,

    /// What to do when the server list no longer fits in a safe datagram
    #[arg(long, value_enum, default_value_t = OversizePolicy::Warn)]
    oversize_policy: OversizePolicy,
}

impl From<Args> for MasterConfig {
    fn from(args: Args) -> Self {
        MasterConfig {
            host: args.host,
            port: args.port,
            max_server_age: Duration::from_millis(args.max_server_age),
            max_servers_per_address: args.max_servers_per_address,
            oversize_policy: args.oversize_policy,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut master = Master::bind(MasterConfig::from(args)).await?;

    tokio::select! {
        result = master.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
