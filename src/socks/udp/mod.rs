//! UDP ASSOCIATE module for SOCKS5
//!
//! Handles UDP ASSOCIATE requests and the datagram envelope they use.

mod associate;
mod packet;

pub use associate::handle_udp_associate;
pub use packet::{encode_udp_packet, parse_udp_packet, UdpPacket};
