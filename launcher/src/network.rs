use log::{debug, warn};
use protocol::{decode_list, Packet, ServerAddr};
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Largest fraction of the heartbeat interval shaved off by jitter.
pub const HEARTBEAT_JITTER: f64 = 0.1;

/// A UDP endpoint talking to one master server.
#[derive(Debug)]
pub struct MasterClient {
    socket: UdpSocket,
    master_addr: SocketAddr,
}

impl MasterClient {
    /// Binds an ephemeral local port.
    pub async fn connect(master_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let master_addr: SocketAddr = master_addr.parse()?;
        let local = if master_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        Self::connect_from(&master_addr.to_string(), local).await
    }

    /// Binds `local_addr`, which matters for heartbeats: without an explicit
    /// port the master registers the port they were sent from.
    pub async fn connect_from(
        master_addr: &str,
        local_addr: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let master_addr: SocketAddr = master_addr.parse()?;
        let socket = UdpSocket::bind(local_addr).await?;
        debug!("Bound {} for master {}", socket.local_addr()?, master_addr);

        Ok(MasterClient {
            socket,
            master_addr,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn master_addr(&self) -> SocketAddr {
        self.master_addr
    }

    async fn send_packet(&self, packet: Packet<'_>) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        self.socket.send_to(&data, self.master_addr).await?;
        Ok(())
    }

    /// Asks the master for its server list and waits up to `wait` for each reply datagram.
    pub async fn query(&self, wait: Duration) -> Result<Vec<ServerAddr>, Box<dyn std::error::Error>> {
        self.send_packet(Packet::Query).await?;

        let mut buf = vec![0u8; u16::MAX as usize];
        loop {
            let (len, from) = timeout(wait, self.socket.recv_from(&mut buf)).await??;
            if from != self.master_addr {
                warn!("Ignoring datagram from unexpected peer {}", from);
                continue;
            }
            return Ok(decode_list(&buf[..len])?);
        }
    }

    /// Announces a game server. With `None` the master uses this socket's port.
    pub async fn announce(&self, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
        let packet = match port {
            Some(port) => Packet::Announce { port },
            None => Packet::Heartbeat,
        };
        self.send_packet(packet).await
    }
}

/// Delay until the next heartbeat, shortened by a random share of up to
/// `HEARTBEAT_JITTER` so that servers started together drift apart.
pub fn next_heartbeat_delay<R: Rng>(interval: Duration, rng: &mut R) -> Duration {
    let jitter = interval.mul_f64(rng.gen_range(0.0..HEARTBEAT_JITTER));
    interval.saturating_sub(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::encode_list;
    use rand::{rngs::StdRng, SeedableRng};
    use std::net::Ipv4Addr;
    use tokio_test::{assert_err, assert_ok};

    async fn fake_master() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_address() {
        assert_err!(MasterClient::connect("not an address").await);
        assert_err!(MasterClient::connect("256.0.0.1:15000").await);
    }

    #[tokio::test]
    async fn test_announce_sends_heartbeat() {
        let (master, master_addr) = fake_master().await;
        let client = assert_ok!(MasterClient::connect(&master_addr).await);

        assert_ok!(client.announce(None).await);

        let mut buf = [0u8; 64];
        let (len, _) = master.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0xd4, 0xd6, 0x54, 0x00]);
    }

    #[tokio::test]
    async fn test_announce_sends_explicit_port() {
        let (master, master_addr) = fake_master().await;
        let client = assert_ok!(MasterClient::connect(&master_addr).await);

        assert_ok!(client.announce(Some(10666)).await);

        let mut buf = [0u8; 64];
        let (len, _) = master.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0xd4, 0xd6, 0x54, 0x00, 0xaa, 0x29]);
    }

    #[tokio::test]
    async fn test_query_decodes_reply() {
        let (master, master_addr) = fake_master().await;
        let client = assert_ok!(MasterClient::connect(&master_addr).await);
        let servers = vec![ServerAddr::new(Ipv4Addr::new(10, 0, 0, 1), 10666)];
        let reply = encode_list(servers.clone()).unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, from) = master.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], &[0xa3, 0xdb, 0x0b, 0x00]);
            master.send_to(&reply, from).await.unwrap();
        });

        let listed = assert_ok!(client.query(Duration::from_secs(1)).await);
        assert_eq!(listed, servers);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_query_times_out() {
        let (_master, master_addr) = fake_master().await;
        let client = assert_ok!(MasterClient::connect(&master_addr).await);

        assert_err!(client.query(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_query_rejects_garbage_reply() {
        let (master, master_addr) = fake_master().await;
        let client = assert_ok!(MasterClient::connect(&master_addr).await);

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, from) = master.recv_from(&mut buf).await.unwrap();
            master.send_to(&[0xff, 0xff, 0xff], from).await.unwrap();
        });

        assert_err!(client.query(Duration::from_secs(1)).await);
        responder.await.unwrap();
    }

    #[test]
    fn test_heartbeat_delay_stays_within_jitter() {
        let mut rng = StdRng::seed_from_u64(42);
        let interval = Duration::from_secs(60);

        for _ in 0..1000 {
            let delay = next_heartbeat_delay(interval, &mut rng);
            assert!(delay <= interval);
            assert!(delay >= interval.mul_f64(1.0 - HEARTBEAT_JITTER));
        }
    }

    #[test]
    fn test_heartbeat_delay_zero_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(next_heartbeat_delay(Duration::ZERO, &mut rng), Duration::ZERO);
    }
}
