//! IP address to packet-filter pattern conversion.
//!
//! The adapter matches patterns against the start of the received 802.3
//! frame. A pattern here is a zero-filled Ethernet header followed by a
//! zero-filled IP header, cut off right after the source address, with the
//! address written in. The mask has one bit per pattern byte (LSB first), and
//! only the bits covering the source address are set.

use std::mem::offset_of;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use zerocopy::{Immutable, IntoBytes};

#[repr(C)]
#[derive(Debug, Default, IntoBytes, Immutable)]
struct EthHdr {
    dest: [u8; 6],
    source: [u8; 6],
    proto: [u8; 2],
}

#[repr(C)]
#[derive(Debug, Default, IntoBytes, Immutable)]
struct Ipv4Hdr {
    version_ihl: u8,
    tos: u8,
    tot_len: [u8; 2],
    id: [u8; 2],
    frag_off: [u8; 2],
    ttl: u8,
    protocol: u8,
    check: [u8; 2],
    saddr: [u8; 4],
    daddr: [u8; 4],
}

#[repr(C)]
#[derive(Debug, Default, IntoBytes, Immutable)]
struct Ipv6Hdr {
    flow: [u8; 4],
    payload_len: [u8; 2],
    next_hdr: u8,
    hop_limit: u8,
    saddr: [u8; 16],
    daddr: [u8; 16],
}

#[repr(C)]
#[derive(Debug, Default, IntoBytes, Immutable)]
struct Ipv4Frame {
    eth: EthHdr,
    ip: Ipv4Hdr,
}

#[repr(C)]
#[derive(Debug, Default, IntoBytes, Immutable)]
struct Ipv6Frame {
    eth: EthHdr,
    ip: Ipv6Hdr,
}

/// Offset of the IPv4 source address within the frame.
pub const IPV4_SADDR_OFFSET: usize = offset_of!(Ipv4Frame, ip) + offset_of!(Ipv4Hdr, saddr);

/// Offset of the IPv6 source address within the frame.
pub const IPV6_SADDR_OFFSET: usize = offset_of!(Ipv6Frame, ip) + offset_of!(Ipv6Hdr, saddr);

/// Length of an IPv4 pattern.
pub const IPV4_PATTERN_LEN: usize = IPV4_SADDR_OFFSET + 4;

/// Length of an IPv6 pattern.
pub const IPV6_PATTERN_LEN: usize = IPV6_SADDR_OFFSET + 16;

/// A packet-filter pattern and its mask.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WakePattern {
    /// Bytes to match from the start of the frame.
    pub pattern: Vec<u8>,
    /// One bit per pattern byte; set bits are compared.
    pub mask: Vec<u8>,
}

impl WakePattern {
    /// Build the pattern that matches packets sent from `addr`.
    pub fn for_address(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self::for_ipv4(v4),
            IpAddr::V6(v6) => Self::for_ipv6(v6),
        }
    }

    fn for_ipv4(addr: Ipv4Addr) -> Self {
        let mut frame = Ipv4Frame::default();
        frame.ip.saddr = addr.octets();
        Self::from_frame(frame.as_bytes(), IPV4_SADDR_OFFSET, IPV4_PATTERN_LEN)
    }

    fn for_ipv6(addr: Ipv6Addr) -> Self {
        let mut frame = Ipv6Frame::default();
        frame.ip.saddr = addr.octets();
        Self::from_frame(frame.as_bytes(), IPV6_SADDR_OFFSET, IPV6_PATTERN_LEN)
    }

    fn from_frame(frame: &[u8], offset: usize, len: usize) -> Self {
        Self {
            pattern: frame[..len].to_vec(),
            mask: mask_from(offset, len),
        }
    }

    /// Pattern length used for addresses of the same family as `addr`.
    pub fn pattern_len(addr: &IpAddr) -> usize {
        match addr {
            IpAddr::V4(_) => IPV4_PATTERN_LEN,
            IpAddr::V6(_) => IPV6_PATTERN_LEN,
        }
    }

    /// Recover the source address this pattern matches on.
    ///
    /// Reads the masked bytes back out of the pattern; returns `None` for
    /// patterns not produced by [`for_address`](Self::for_address).
    pub fn source_address(&self) -> Option<IpAddr> {
        let masked: Vec<usize> = (0..self.pattern.len())
            .filter(|&i| self.mask.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0))
            .collect();
        let start = *masked.first()?;
        let bytes = self.pattern.get(start..)?;

        match (start, bytes.len()) {
            (IPV4_SADDR_OFFSET, 4) => {
                let octets: [u8; 4] = bytes.try_into().ok()?;
                Some(IpAddr::from(octets))
            }
            (IPV6_SADDR_OFFSET, 16) => {
                let octets: [u8; 16] = bytes.try_into().ok()?;
                Some(IpAddr::from(octets))
            }
            _ => None,
        }
    }
}

/// Mask selecting pattern bytes `offset..len`.
fn mask_from(offset: usize, len: usize) -> Vec<u8> {
    let mut mask = vec![0u8; len.div_ceil(8)];
    for bit in offset..len {
        mask[bit / 8] |= 1 << (bit % 8);
    }
    mask
}
