//! Registry of live game servers, grouped by IP address.
//!
//! Grouping by address serves two purposes: the per-address capacity check
//! on registration, and the compressed list encoding which writes each
//! address once followed by all of its ports. Entries leave the registry
//! only when their liveness timer runs out.

use crate::entry::{Entry, Expiry};
use log::{debug, info};
use protocol::{encode_compressed, encode_list, ProtocolError, ServerAddr};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Outcome of [`Registry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// First announce from this server; a new entry was created
    Added,
    /// Known server; its liveness timer was restarted
    Refreshed,
    /// The address already holds the maximum number of servers
    Rejected,
}

pub struct Registry {
    /// Servers indexed by address, then port
    servers: BTreeMap<Ipv4Addr, BTreeMap<u16, Entry>>,
    /// Maximum number of servers a single address may register
    max_servers_per_address: usize,
    /// Handed to every entry so its timer can report back
    expiry_tx: mpsc::UnboundedSender<Expiry>,
}

impl Registry {
    pub fn new(max_servers_per_address: usize, expiry_tx: mpsc::UnboundedSender<Expiry>) -> Self {
        Self {
            servers: BTreeMap::new(),
            max_servers_per_address,
            expiry_tx,
        }
    }

    /// Adds a server or restarts the timer of a known one.
    ///
    /// A new server whose address is already at capacity is dropped without
    /// any feedback to the sender.
    pub fn upsert(&mut self, addr: ServerAddr, max_age: Duration) -> Upsert {
        let group = self.servers.entry(addr.ip).or_default();

        if let Some(entry) = group.get_mut(&addr.port) {
            entry.heartbeat();
            debug!("Server sent heartbeat: {}", addr);
            return Upsert::Refreshed;
        }

        if group.len() >= self.max_servers_per_address {
            if group.is_empty() {
                self.servers.remove(&addr.ip);
            }
            debug!(
                "Rejected server {}: address already has {} servers",
                addr, self.max_servers_per_address
            );
            return Upsert::Rejected;
        }

        group.insert(addr.port, Entry::new(addr, max_age, self.expiry_tx.clone()));
        info!("Added new server: {}", addr);
        Upsert::Added
    }

    /// Removes a server. Returns false if it was not registered.
    pub fn remove(&mut self, addr: ServerAddr) -> bool {
        let Some(group) = self.servers.get_mut(&addr.ip) else {
            return false;
        };

        let removed = group.remove(&addr.port).is_some();
        if group.is_empty() {
            self.servers.remove(&addr.ip);
        }
        removed
    }

    /// Applies a timer expiry. Expiries from timers that a heartbeat has
    /// since replaced are ignored.
    pub fn expire(&mut self, expiry: Expiry) -> bool {
        let current = self
            .get(expiry.addr)
            .is_some_and(|entry| entry.is_current(&expiry));

        if !current {
            debug!("Ignoring stale timeout for {}", expiry.addr);
            return false;
        }

        self.remove(expiry.addr);
        info!("Remote server timed out: {}", expiry.addr);
        true
    }

    /// Marks a known server as verified. Returns false if it is not registered.
    pub fn verify(&mut self, addr: ServerAddr, info: &[u8]) -> bool {
        match self
            .servers
            .get_mut(&addr.ip)
            .and_then(|group| group.get_mut(&addr.port))
        {
            Some(entry) => {
                entry.mark_verified(info);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, addr: ServerAddr) -> Option<&Entry> {
        self.servers.get(&addr.ip)?.get(&addr.port)
    }

    pub fn contains(&self, addr: ServerAddr) -> bool {
        self.get(addr).is_some()
    }

    /// Number of servers registered from `ip`.
    pub fn servers_at(&self, ip: Ipv4Addr) -> usize {
        self.servers.get(&ip).map_or(0, BTreeMap::len)
    }

    /// Iterates over all registered servers, grouped by address.
    pub fn servers(&self) -> impl Iterator<Item = ServerAddr> + '_ {
        self.servers
            .values()
            .flat_map(|group| group.values().map(Entry::addr))
    }

    /// Number of addresses with at least one server.
    pub fn address_count(&self) -> usize {
        self.servers.values().filter(|group| !group.is_empty()).count()
    }

    /// Returns the total number of registered servers
    pub fn len(&self) -> usize {
        self.servers.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the full list reply with every registered server.
    pub fn encode_full(&self) -> Result<Vec<u8>, ProtocolError> {
        self.encode_limited(u16::MAX as usize)
    }

    /// Encodes the full list reply with at most `max_entries` servers.
    pub fn encode_limited(&self, max_entries: usize) -> Result<Vec<u8>, ProtocolError> {
        let max_entries = max_entries.min(u16::MAX as usize);
        let entries: Vec<ServerAddr> = self.servers().take(max_entries).collect();
        encode_list(entries)
    }

    /// Encodes the compressed list, one segment per address.
    pub fn encode_compressed(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_compressed(
            self.servers
                .iter()
                .map(|(ip, group)| (*ip, group.keys().copied().collect())),
        )
    }
}
