//! Wire protocol spoken between game servers, launchers and the master.
//!
//! Every message starts with a 32-bit little-endian magic number. Records
//! with a fixed layout are serialized with bincode's legacy configuration,
//! which writes integers as fixed-width little-endian values and an
//! `Ipv4Addr` as its four raw octets, so the structs below map byte for
//! byte onto the datagrams.

use bincode::{deserialize, serialize, serialize_into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

/// Magic sent by game servers announcing themselves.
pub const SERVER_CHALLENGE: i32 = 5560020;
/// Magic sent by launchers asking for the server list. Also heads the reply.
pub const LAUNCHER_CHALLENGE: i32 = 777123;

/// Largest datagram considered safe to send without fragmentation.
pub const SAFE_MTU: usize = 576;
pub const MAGIC_SIZE: usize = 4;
pub const HEADER_SIZE: usize = 6;
pub const ENTRY_SIZE: usize = 6;
/// Size of an announce that carries an explicit game port.
pub const ANNOUNCE_SIZE: usize = 6;
/// Number of entries that fit in a list reply of at most `SAFE_MTU` bytes.
pub const MAX_SAFE_ENTRIES: usize = (SAFE_MTU - HEADER_SIZE) / ENTRY_SIZE;

pub const DEFAULT_MASTER_PORT: u16 = 15000;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("datagram too short: {0} bytes")]
    TooShort(usize),
    #[error("unknown magic number {0}")]
    UnknownMagic(i32),
    #[error("unexpected magic number {found} (expected {expected})")]
    BadMagic { expected: i32, found: i32 },
    #[error("truncated message: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("too many entries for one message: {0}")]
    TooManyEntries(usize),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// A game server as it appears on the wire: four address octets followed
/// by the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerAddr {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl ServerAddr {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serialize(self)?)
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
        serialize_into(&mut *buf, self)?;
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < ENTRY_SIZE {
            return Err(ProtocolError::Truncated {
                expected: ENTRY_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(deserialize(&bytes[..ENTRY_SIZE])?)
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddrV4> for ServerAddr {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

/// Header of a full server list reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListHeader {
    pub magic: i32,
    pub count: u16,
}

/// Header of one address group in the compressed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct GroupHeader {
    count: u16,
    ip: Ipv4Addr,
}

/// A classified inbound datagram.
///
/// The classification only depends on the magic number and the total
/// length, so a server announce of 4 or 5 bytes is a plain heartbeat (a
/// lone trailing byte cannot form a port) and anything longer than an
/// announce is the reserved server info extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Announce without a port; the UDP source port is the game port.
    Heartbeat,
    /// Announce naming the game port explicitly.
    Announce { port: u16 },
    /// Announce with extended server information (not interpreted).
    ServerInfo(&'a [u8]),
    /// Launcher asking for the server list.
    Query,
    /// Launcher query with trailing bytes (master sync, not supported).
    Sync(&'a [u8]),
}

impl<'a> Packet<'a> {
    pub fn decode(datagram: &'a [u8]) -> Result<Self, ProtocolError> {
        if datagram.len() < MAGIC_SIZE {
            return Err(ProtocolError::TooShort(datagram.len()));
        }

        let magic: i32 = deserialize(&datagram[..MAGIC_SIZE])?;
        let payload = &datagram[MAGIC_SIZE..];

        match magic {
            SERVER_CHALLENGE => match datagram.len() {
                len if len > ANNOUNCE_SIZE => Ok(Packet::ServerInfo(payload)),
                ANNOUNCE_SIZE => Ok(Packet::Announce {
                    port: deserialize(payload)?,
                }),
                _ => Ok(Packet::Heartbeat),
            },
            LAUNCHER_CHALLENGE if payload.is_empty() => Ok(Packet::Query),
            LAUNCHER_CHALLENGE => Ok(Packet::Sync(payload)),
            other => Err(ProtocolError::UnknownMagic(other)),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(ANNOUNCE_SIZE);
        match self {
            Packet::Heartbeat => serialize_into(&mut buf, &SERVER_CHALLENGE)?,
            Packet::Announce { port } => serialize_into(&mut buf, &(SERVER_CHALLENGE, *port))?,
            Packet::ServerInfo(payload) => {
                serialize_into(&mut buf, &SERVER_CHALLENGE)?;
                buf.extend_from_slice(payload);
            }
            Packet::Query => serialize_into(&mut buf, &LAUNCHER_CHALLENGE)?,
            Packet::Sync(payload) => {
                serialize_into(&mut buf, &LAUNCHER_CHALLENGE)?;
                buf.extend_from_slice(payload);
            }
        }
        Ok(buf)
    }
}

/// Encodes a full list reply: header, then one 6-byte record per server.
pub fn encode_list<I>(entries: I) -> Result<Vec<u8>, ProtocolError>
where
    I: IntoIterator<Item = ServerAddr>,
    I::IntoIter: ExactSizeIterator,
{
    let entries = entries.into_iter();
    let len = entries.len();
    let count = u16::try_from(len).map_err(|_| ProtocolError::TooManyEntries(len))?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + len * ENTRY_SIZE);
    serialize_into(
        &mut buf,
        &ListHeader {
            magic: LAUNCHER_CHALLENGE,
            count,
        },
    )?;
    for entry in entries {
        entry.encode_into(&mut buf)?;
    }
    Ok(buf)
}

/// Decodes a full list reply. Bytes past the last announced entry are ignored.
pub fn decode_list(bytes: &[u8]) -> Result<Vec<ServerAddr>, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::Truncated {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }

    let header: ListHeader = deserialize(&bytes[..HEADER_SIZE])?;
    if header.magic != LAUNCHER_CHALLENGE {
        return Err(ProtocolError::BadMagic {
            expected: LAUNCHER_CHALLENGE,
            found: header.magic,
        });
    }

    let expected = HEADER_SIZE + header.count as usize * ENTRY_SIZE;
    if bytes.len() < expected {
        return Err(ProtocolError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }

    bytes[HEADER_SIZE..expected]
        .chunks_exact(ENTRY_SIZE)
        .map(ServerAddr::decode)
        .collect()
}

/// Encodes the compressed list: per address, a port count, the address and
/// its ports. Groups without ports are skipped. There is no leading header.
pub fn encode_compressed<I>(groups: I) -> Result<Vec<u8>, ProtocolError>
where
    I: IntoIterator<Item = (Ipv4Addr, Vec<u16>)>,
{
    let mut buf = Vec::new();
    for (ip, ports) in groups {
        if ports.is_empty() {
            continue;
        }
        let count =
            u16::try_from(ports.len()).map_err(|_| ProtocolError::TooManyEntries(ports.len()))?;
        serialize_into(&mut buf, &GroupHeader { count, ip })?;
        for port in ports {
            serialize_into(&mut buf, &port)?;
        }
    }
    Ok(buf)
}

pub fn decode_compressed(mut bytes: &[u8]) -> Result<Vec<(Ipv4Addr, Vec<u16>)>, ProtocolError> {
    let mut groups = Vec::new();

    while !bytes.is_empty() {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let header: GroupHeader = deserialize(&bytes[..HEADER_SIZE])?;

        let end = HEADER_SIZE + header.count as usize * 2;
        if bytes.len() < end {
            return Err(ProtocolError::Truncated {
                expected: end,
                actual: bytes.len(),
            });
        }

        let ports = bytes[HEADER_SIZE..end]
            .chunks_exact(2)
            .map(|chunk| deserialize::<u16>(chunk))
            .collect::<Result<Vec<_>, _>>()?;

        groups.push((header.ip, ports));
        bytes = &bytes[end..];
    }

    Ok(groups)
}
