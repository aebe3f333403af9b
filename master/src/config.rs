//! Master configuration and its defaults.

use clap::ValueEnum;
use protocol::{DEFAULT_MASTER_PORT, MAX_SAFE_ENTRIES};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_PORT: u16 = DEFAULT_MASTER_PORT;
/// How long a server may stay silent before it is dropped from the list.
pub const DEFAULT_MAX_SERVER_AGE: Duration = Duration::from_millis(300_000);
pub const DEFAULT_MAX_SERVERS_PER_ADDRESS: usize = 32;

/// What to do with a list reply that exceeds the safe MTU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OversizePolicy {
    /// Log a warning and send the whole list anyway
    #[default]
    Warn,
    /// Send only as many entries as fit in the safe MTU
    Truncate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterConfig {
    pub host: IpAddr,
    pub port: u16,
    pub max_server_age: Duration,
    pub max_servers_per_address: usize,
    pub oversize_policy: OversizePolicy,
}

impl MasterConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Largest number of entries a single list reply may carry.
    pub fn max_reply_entries(&self) -> usize {
        match self.oversize_policy {
            OversizePolicy::Warn => u16::MAX as usize,
            OversizePolicy::Truncate => MAX_SAFE_ENTRIES,
        }
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            max_server_age: DEFAULT_MAX_SERVER_AGE,
            max_servers_per_address: DEFAULT_MAX_SERVERS_PER_ADDRESS,
            oversize_policy: OversizePolicy::default(),
        }
    }
}
