//! # Launcher Library
//!
//! Client side of the master server protocol. A launcher asks the master
//! for the current list of game servers; a game server (or a helper running
//! next to it) keeps itself listed by announcing at regular intervals.
//!
//! ## Network Module (`network`)
//! - `MasterClient` wraps one UDP socket aimed at a master
//! - `query` sends a list request and decodes the reply
//! - `announce` sends a heartbeat, optionally naming the game port
//! - `next_heartbeat_delay` spreads heartbeats out with random jitter
//!
//! Both directions are fire-and-forget UDP. A lost query reply shows up as
//! a timeout and the caller simply asks again; a lost heartbeat is covered
//! by the next one as long as the interval is well below the master's
//! maximum server age.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use launcher::network::MasterClient;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MasterClient::connect("127.0.0.1:15000").await?;
//!     for server in client.query(Duration::from_secs(2)).await? {
//!         println!("{}", server);
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;
