//! Routes inbound datagrams to the registry and builds replies.
//!
//! Nothing that arrives on the socket is trusted: every datagram that is too
//! short, carries an unknown magic or uses an unsupported extension is logged
//! and dropped without touching the registry.

use crate::config::MasterConfig;
use crate::entry::Expiry;
use crate::registry::Registry;
use log::{debug, error, info, warn};
use protocol::{Packet, ServerAddr, SAFE_MTU};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::sync::mpsc;

pub struct Dispatcher {
    config: MasterConfig,
    registry: Registry,
}

impl Dispatcher {
    pub fn new(config: MasterConfig, expiry_tx: mpsc::UnboundedSender<Expiry>) -> Self {
        let registry = Registry::new(config.max_servers_per_address, expiry_tx);
        Self { config, registry }
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handles one datagram from `source`. Returns the reply to send back, if any.
    pub fn handle_datagram(&mut self, datagram: &[u8], source: SocketAddr) -> Option<Vec<u8>> {
        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping datagram from {}: {}", source, e);
                return None;
            }
        };

        match packet {
            Packet::Heartbeat => {
                self.announce(source, source.port());
                None
            }
            Packet::Announce { port } => {
                self.announce(source, port);
                None
            }
            Packet::ServerInfo(info) => {
                info!(
                    "Full server info from {} not implemented ({} bytes ignored)",
                    source,
                    info.len()
                );
                None
            }
            Packet::Query => self.list_servers(source),
            Packet::Sync(_) => {
                info!("Master syncing server list (ignored), IP = {}", source.ip());
                None
            }
        }
    }

    /// Applies a liveness timeout posted by an entry's timer.
    pub fn handle_expiry(&mut self, expiry: Expiry) -> bool {
        self.registry.expire(expiry)
    }

    fn announce(&mut self, source: SocketAddr, port: u16) {
        let Some(ip) = source_ipv4(source) else {
            debug!("Ignoring announce from non-IPv4 address {}", source);
            return;
        };

        self.registry
            .upsert(ServerAddr::new(ip, port), self.config.max_server_age);
    }

    fn list_servers(&self, source: SocketAddr) -> Option<Vec<u8>> {
        info!("Client request IP = {}", source.ip());

        let max_entries = self.config.max_reply_entries();
        let total = self.registry.len();
        if total > max_entries {
            warn!(
                "Server list truncated to {} of {} servers for {}",
                max_entries, total, source
            );
        }

        match self.registry.encode_limited(max_entries) {
            Ok(reply) => {
                if reply.len() > SAFE_MTU {
                    warn!(
                        "Response to {} is {} bytes, bigger than safe MTU of {}",
                        source,
                        reply.len(),
                        SAFE_MTU
                    );
                }
                Some(reply)
            }
            Err(e) => {
                error!("Failed to encode server list: {}", e);
                None
            }
        }
    }
}

/// The wire format only carries IPv4; mapped addresses are unwrapped.
fn source_ipv4(source: SocketAddr) -> Option<Ipv4Addr> {
    match source.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(ip) => ip.to_ipv4_mapped(),
    }
}
