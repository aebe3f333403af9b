//! # Master Server Library
//!
//! The master is the directory game servers and launchers meet at. Game
//! servers announce themselves with small UDP heartbeats; launchers send a
//! query and receive the list of every server that is currently alive.
//!
//! ## Architecture Design
//!
//! ### Volatile Registry
//! Nothing is persisted. Each known server has a liveness timer that is
//! restarted on every heartbeat; a server that stays silent for longer than
//! the configured age is dropped. Restarting the master simply starts from
//! an empty list that fills up again within one heartbeat interval.
//!
//! ### Single-Threaded Event Loop
//! Datagrams and timer expiries are funnelled through channels into one
//! loop, which is the only code that touches the registry. Timers never hold
//! a reference to the registry; they post the key of the expired server and
//! the loop decides whether it is still current.
//!
//! ### Hostile Input
//! The socket is open to the internet. Every datagram is length checked
//! before it is interpreted and anything malformed is dropped silently, so
//! no single packet can stop the master or corrupt its state. The number of
//! servers per IP address is capped to bound memory.
//!
//! ## Module Organization
//!
//! - `config`: listen address, server age, per-address cap, oversize policy
//! - `entry`: one registered server and its liveness timer
//! - `registry`: servers grouped by address, list encoders
//! - `dispatcher`: classifies datagrams and drives the registry
//! - `network`: socket ownership and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use master::config::MasterConfig;
//! use master::network::Master;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut master = Master::bind(MasterConfig::default()).await?;
//!     master.run().await
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod entry;
pub mod network;
pub mod registry;
