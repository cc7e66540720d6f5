//! Network peer descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A network peer: IP address plus listening port.
///
/// On the wire a peer is a 16-byte big-endian IP field (IPv4 addresses
/// occupy the low 32 bits) followed by a 4-byte big-endian port.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// IP address.
    pub ip: IpAddr,
    /// Listening port.
    pub port: u16,
}

impl Peer {
    /// Wire size in bytes (16-byte IP + 4-byte port).
    pub const SIZE: usize = 20;

    /// Create a new peer descriptor.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Append the wire encoding to `out`.
    pub fn encode_to(&self, out: &mut Vec<u8>) {
        let ip_value: u128 = match self.ip {
            IpAddr::V4(v4) => u32::from(v4) as u128,
            IpAddr::V6(v6) => u128::from(v6),
        };
        out.extend_from_slice(&ip_value.to_be_bytes());
        out.extend_from_slice(&(self.port as u32).to_be_bytes());
    }

    /// Decode a peer from `bytes` starting at `offset`.
    ///
    /// Returns the peer and the offset past the consumed field.
    pub fn decode(bytes: &[u8], offset: usize) -> Option<(Self, usize)> {
        let end = offset.checked_add(Self::SIZE)?;
        if bytes.len() < end {
            return None;
        }
        let mut ip_bytes = [0u8; 16];
        ip_bytes.copy_from_slice(&bytes[offset..offset + 16]);
        let ip_value = u128::from_be_bytes(ip_bytes);
        let ip = if ip_value <= u32::MAX as u128 {
            IpAddr::V4(Ipv4Addr::from(ip_value as u32))
        } else {
            IpAddr::V6(Ipv6Addr::from(ip_value))
        };
        let mut port_bytes = [0u8; 4];
        port_bytes.copy_from_slice(&bytes[offset + 16..end]);
        let port = u32::from_be_bytes(port_bytes) as u16;
        Some((Self::new(ip, port), end))
    }

    /// Whether the source address is usable for admission purposes.
    ///
    /// Rejects unspecified, broadcast, multicast and (for IPv4) private
    /// subnet addresses.
    pub fn has_routable_ip(&self) -> bool {
        match self.ip {
            IpAddr::V4(v4) => {
                !v4.is_unspecified() && !v4.is_broadcast() && !v4.is_multicast() && !v4.is_private()
            }
            IpAddr::V6(v6) => !v6.is_unspecified() && !v6.is_multicast(),
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({}:{})", self.ip, self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}
