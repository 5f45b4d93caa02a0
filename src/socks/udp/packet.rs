//! UDP packet encoding/decoding for SOCKS5
//!
//! Handles the encapsulation format for UDP packets in SOCKS5.

use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use anyhow::{bail, Context, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// UDP packet structure for SOCKS5
///
/// # UDP Request/Response Format
///
/// ```text
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpPacket {
    /// Fragment number (0 for standalone packets)
    pub frag: u8,
    /// Destination on the way out, source on the way back
    pub addr: TargetAddr,
    /// Packet data
    pub data: Bytes,
}

impl UdpPacket {
    /// Create a new unfragmented UDP packet
    pub fn new(addr: TargetAddr, data: Bytes) -> Self {
        UdpPacket {
            frag: SOCKS5_UDP_FRAG_NONE,
            addr,
            data,
        }
    }

    /// Check if this is part of a fragment sequence
    pub fn is_fragmented(&self) -> bool {
        self.frag != SOCKS5_UDP_FRAG_NONE
    }
}

/// Parse a UDP packet from bytes
///
/// The RSV field is not checked. Everything after the port is payload.
pub fn parse_udp_packet(data: &[u8]) -> Result<UdpPacket> {
    if data.len() < 4 {
        bail!("UDP packet too short: {} bytes", data.len());
    }

    let mut buf = data;

    // RSV (2 bytes)
    buf.advance(2);

    let frag = buf.get_u8();
    let atyp = buf.get_u8();

    let addr = parse_address_from_buf(atyp, &mut buf)?;

    Ok(UdpPacket {
        frag,
        addr,
        data: Bytes::copy_from_slice(buf),
    })
}

/// Parse address from buffer, advancing it past the port
fn parse_address_from_buf(atyp: u8, buf: &mut &[u8]) -> Result<TargetAddr> {
    match atyp {
        SOCKS5_ADDR_TYPE_IPV4 => {
            if buf.remaining() < 6 {
                bail!("Buffer too short for IPv4 address");
            }
            let ip = Ipv4Addr::from(buf.get_u32());
            let port = buf.get_u16();
            Ok(TargetAddr::ipv4(ip, port))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            if !buf.has_remaining() {
                bail!("Buffer too short for domain length");
            }
            let len = buf.get_u8() as usize;

            if buf.remaining() < len + 2 {
                bail!("Buffer too short for domain name");
            }
            let domain = String::from_utf8(buf[..len].to_vec())
                .with_context(|| "Invalid UTF-8 in domain")?;
            buf.advance(len);
            let port = buf.get_u16();
            Ok(TargetAddr::domain(domain, port))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            if buf.remaining() < 18 {
                bail!("Buffer too short for IPv6 address");
            }
            let ip = Ipv6Addr::from(buf.get_u128());
            let port = buf.get_u16();
            Ok(TargetAddr::ipv6(ip, port))
        }

        _ => bail!("Unknown address type: {}", atyp),
    }
}

/// Encode a UDP packet to bytes
pub fn encode_udp_packet(packet: &UdpPacket) -> Bytes {
    let addr = packet.addr.to_bytes();
    let mut buf = BytesMut::with_capacity(3 + addr.len() + packet.data.len());

    buf.put_u16(0);
    buf.put_u8(packet.frag);
    buf.put_slice(&addr);
    buf.put_slice(&packet.data);

    buf.freeze()
}
