//! A single game server known to the master, along with its liveness timer.
//!
//! Every entry owns one spawned timer task. When the timer runs out it posts
//! an [`Expiry`] into the channel the registry drains; the entry itself never
//! touches the registry. Each arming of the timer carries a fresh generation,
//! so an expiry that was already in flight when a heartbeat re-armed the
//! timer no longer matches the entry and is ignored.

use log::debug;
use protocol::ServerAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Posted by a liveness timer that ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub addr: ServerAddr,
    pub generation: u64,
}

// Unique across all entries, so a re-created entry never matches an expiry
// left over from its predecessor.
fn next_generation() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

fn spawn_timer(
    addr: ServerAddr,
    max_age: Duration,
    generation: u64,
    expiry_tx: mpsc::UnboundedSender<Expiry>,
) -> JoinHandle<()> {
    let deadline = Instant::now() + max_age;
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        // Receiver is gone once the master has shut down
        let _ = expiry_tx.send(Expiry { addr, generation });
    })
}

/// A registered game server.
#[derive(Debug)]
pub struct Entry {
    addr: ServerAddr,
    max_age: Duration,
    verified: bool,
    generation: u64,
    timer: JoinHandle<()>,
    expiry_tx: mpsc::UnboundedSender<Expiry>,
}

impl Entry {
    /// Creates an entry and arms its timer. Must be called within a tokio runtime.
    pub fn new(
        addr: ServerAddr,
        max_age: Duration,
        expiry_tx: mpsc::UnboundedSender<Expiry>,
    ) -> Self {
        let generation = next_generation();
        let timer = spawn_timer(addr, max_age, generation, expiry_tx.clone());

        Self {
            addr,
            max_age,
            verified: false,
            generation,
            timer,
            expiry_tx,
        }
    }

    /// Restarts the liveness window from now.
    pub fn heartbeat(&mut self) {
        self.timer.abort();
        self.generation = next_generation();
        self.timer = spawn_timer(
            self.addr,
            self.max_age,
            self.generation,
            self.expiry_tx.clone(),
        );
    }

    /// Refreshes the entry from a server info payload and marks it verified.
    ///
    /// The payload (server name, player count and so on) is not decoded yet.
    pub fn mark_verified(&mut self, info: &[u8]) {
        self.heartbeat();
        self.verified = true;
        debug!(
            "Server info from {} not implemented, ignoring {} bytes",
            self.addr,
            info.len()
        );
    }

    /// True if `expiry` was posted by the timer currently armed for this entry.
    pub fn is_current(&self, expiry: &Expiry) -> bool {
        expiry.addr == self.addr && expiry.generation == self.generation
    }

    pub fn addr(&self) -> ServerAddr {
        self.addr
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::time::advance;

    const MAX_AGE: Duration = Duration::from_millis(100);

    fn test_addr() -> ServerAddr {
        ServerAddr::new(Ipv4Addr::LOCALHOST, 10666)
    }

    // Lets spawned timer tasks observe the clock after an advance
    async fn settle() {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_creation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let entry = Entry::new(test_addr(), MAX_AGE, tx);

        assert_eq!(entry.addr(), test_addr());
        assert_eq!(entry.max_age(), MAX_AGE);
        assert!(!entry.is_verified());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_max_age() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let entry = Entry::new(test_addr(), MAX_AGE, tx);

        let expiry = rx.recv().await.unwrap();

        assert!(start.elapsed() >= MAX_AGE);
        assert_eq!(expiry.addr, test_addr());
        assert!(entry.is_current(&expiry));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_rearms_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let mut entry = Entry::new(test_addr(), MAX_AGE, tx);
        let first_generation = entry.generation();

        advance(Duration::from_millis(90)).await;
        entry.heartbeat();
        assert_ne!(entry.generation(), first_generation);

        // Past the original deadline, nothing has fired
        advance(Duration::from_millis(20)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        let expiry = rx.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(190));
        assert!(entry.is_current(&expiry));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_expiry_is_not_current() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut entry = Entry::new(test_addr(), MAX_AGE, tx);
        let stale = Expiry {
            addr: test_addr(),
            generation: entry.generation(),
        };

        entry.heartbeat();

        assert!(!entry.is_current(&stale));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_for_other_addr_is_not_current() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let entry = Entry::new(test_addr(), MAX_AGE, tx);
        let other = Expiry {
            addr: ServerAddr::new(Ipv4Addr::LOCALHOST, 10667),
            generation: entry.generation(),
        };

        assert!(!entry.is_current(&other));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_verified() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut entry = Entry::new(test_addr(), MAX_AGE, tx);
        let generation = entry.generation();

        entry.mark_verified(&[0xff, 0x00, 0x13]);

        assert!(entry.is_verified());
        assert_ne!(entry.generation(), generation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_verified_empty_payload() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut entry = Entry::new(test_addr(), MAX_AGE, tx);

        entry.mark_verified(&[]);

        assert!(entry.is_verified());
        assert_eq!(entry.addr(), test_addr());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let entry = Entry::new(test_addr(), MAX_AGE, tx.clone());
        drop(entry);

        advance(MAX_AGE * 2).await;
        settle().await;

        assert!(rx.try_recv().is_err());
    }
}
