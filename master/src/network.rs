//! Master network layer: owns the UDP socket and the event loop.
//!
//! A receiver task drains the socket into a channel. The main loop is the
//! only consumer of that channel and of the liveness timer channel, so every
//! registry mutation happens on one task and no lock is needed.

use crate::config::MasterConfig;
use crate::dispatcher::Dispatcher;
use crate::entry::Expiry;
use log::{error, info};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Large enough for any announce or query; longer datagrams are truncated,
/// which does not change how they are classified.
const RECV_BUFFER_SIZE: usize = 2048;

/// Messages sent from the receiver task to the main loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived { payload: Vec<u8>, addr: SocketAddr },
}

/// The master server: a bound socket plus the dispatcher that owns the registry.
pub struct Master {
    socket: Arc<UdpSocket>,
    dispatcher: Dispatcher,
    expiry_rx: mpsc::UnboundedReceiver<Expiry>,
}

impl Master {
    pub async fn bind(config: MasterConfig) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(config.bind_addr()).await?);
        info!("Master listening on {}", socket.local_addr()?);

        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();

        Ok(Master {
            socket,
            dispatcher: Dispatcher::new(config, expiry_tx),
            expiry_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) -> mpsc::UnboundedReceiver<ServerMessage> {
        let socket = Arc::clone(&self.socket);
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut buffer = [0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let message = ServerMessage::DatagramReceived {
                            payload: buffer[..len].to_vec(),
                            addr,
                        };
                        if let Err(e) = server_tx.send(message) {
                            error!("Failed to send datagram to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        // ICMP errors from earlier sends surface here on some platforms
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });

        server_rx
    }

    /// Main loop: handles datagrams and liveness timeouts one at a time.
    pub async fn run(&mut self) -> io::Result<()> {
        let mut server_rx = self.spawn_network_receiver();

        info!(
            "Master started (max server age {:?}, {} servers per address)",
            self.dispatcher.config().max_server_age,
            self.dispatcher.config().max_servers_per_address
        );

        loop {
            tokio::select! {
                message = server_rx.recv() => {
                    match message {
                        Some(ServerMessage::DatagramReceived { payload, addr }) => {
                            if let Some(reply) = self.dispatcher.handle_datagram(&payload, addr) {
                                send_reply(&self.socket, &reply, addr).await;
                            }
                        }
                        None => {
                            info!("Master shutting down");
                            break;
                        }
                    }
                },

                Some(expiry) = self.expiry_rx.recv() => {
                    self.dispatcher.handle_expiry(expiry);
                },
            }
        }

        Ok(())
    }
}

async fn send_reply(socket: &UdpSocket, reply: &[u8], addr: SocketAddr) {
    if let Err(e) = socket.send_to(reply, addr).await {
        error!("Failed to send reply to {}: {}", addr, e);
    }
}
