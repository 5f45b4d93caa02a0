//! Outbound transport module for Honks
//!
//! This module provides the capability seam the relays use to reach
//! destinations: dialing TCP connections and opening UDP sockets.

mod direct;

pub use direct::{DirectDatagram, DirectOutbound};

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};

/// Socket options for configuring connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Socket options that leave the kernel defaults untouched
    pub fn none() -> Self {
        SocketOpts {
            nodelay: false,
            keepalive_secs: None,
            keepalive_interval: None,
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// A connectionless socket used by the UDP relay
///
/// Releasing the socket is dropping it.
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    /// Receive one datagram, returning its length and sender
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Send one datagram to `target`
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
}

#[async_trait]
impl DatagramSocket for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }
}

/// Outbound capability provider
///
/// Every destination-facing socket the server opens goes through this
/// trait, so the relays can be driven against something other than the
/// host network stack.
#[async_trait]
pub trait Outbound: Send + Sync + 'static {
    /// Stream type produced by [`Outbound::connect_tcp`]
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Datagram socket type produced by [`Outbound::open_udp`]
    type Datagram: DatagramSocket;

    /// Dial a TCP connection to `addr`
    async fn connect_tcp(&self, addr: SocketAddr) -> io::Result<Self::Stream>;

    /// Open an unconnected UDP socket usable for any destination
    async fn open_udp(&self) -> io::Result<Self::Datagram>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_opts_default() {
        let opts = SocketOpts::default();
        assert!(opts.nodelay);
        assert_eq!(opts.keepalive_secs, Some(20));
        assert_eq!(opts.keepalive_interval, Some(8));
    }

    #[test]
    fn test_socket_opts_none() {
        let opts = SocketOpts::none();
        assert!(!opts.nodelay);
        assert!(opts.keepalive_secs.is_none());
    }

    #[tokio::test]
    async fn test_socket_opts_apply() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();

        SocketOpts::default().apply(&stream).unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_udp_socket_as_datagram() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = b.local_addr().unwrap();

        DatagramSocket::send_to(&a, b"ping", b_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = DatagramSocket::recv_from(&b, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, a.local_addr().unwrap());
    }
}
