//! Direct outbound transport
//!
//! Dials destinations straight from the host network stack.

use super::{DatagramSocket, Outbound, SocketOpts};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};

/// Outbound provider backed by the host network stack
#[derive(Debug, Clone)]
pub struct DirectOutbound {
    /// Socket options to apply to outbound connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl DirectOutbound {
    /// Create a new direct outbound provider with default options
    pub fn with_defaults() -> Self {
        DirectOutbound {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for DirectOutbound {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl Outbound for DirectOutbound {
    type Stream = TcpStream;
    type Datagram = DirectDatagram;

    async fn connect_tcp(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Connection timeout to {}", addr),
                )
            })??;

        if let Err(e) = self.socket_opts.apply(&stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }

        tracing::debug!("TCP connection established to {}", addr);

        Ok(stream)
    }

    async fn open_udp(&self) -> io::Result<DirectDatagram> {
        match bind_dual_stack() {
            Ok(socket) => Ok(DirectDatagram {
                socket,
                dual_stack: true,
            }),
            Err(e) => {
                tracing::debug!("Dual-stack UDP socket unavailable, using IPv4: {}", e);
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                Ok(DirectDatagram {
                    socket,
                    dual_stack: false,
                })
            }
        }
    }
}

/// Bind an IPv6 UDP socket on `[::]:0` that also carries IPv4 traffic
fn bind_dual_stack() -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_only_v6(false)?;
    socket.set_nonblocking(true)?;

    let addr = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0));
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// UDP socket returned by [`DirectOutbound::open_udp`]
///
/// On a dual-stack socket IPv4 destinations are sent as IPv4-mapped IPv6
/// addresses and mapped senders are reported as plain IPv4.
#[derive(Debug)]
pub struct DirectDatagram {
    socket: UdpSocket,
    dual_stack: bool,
}

impl DirectDatagram {
    /// Local address of the underlying socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn map_outgoing(&self, target: SocketAddr) -> SocketAddr {
        match target {
            SocketAddr::V4(v4) if self.dual_stack => {
                SocketAddr::new(v4.ip().to_ipv6_mapped().into(), v4.port())
            }
            other => other,
        }
    }
}

/// Turn an IPv4-mapped IPv6 address back into plain IPv4
fn unmap(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(v4.into(), v6.port()),
            None => addr,
        },
        v4 => v4,
    }
}

#[async_trait]
impl DatagramSocket for DirectDatagram {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (n, from) = self.socket.recv_from(buf).await?;
        Ok((n, unmap(from)))
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, self.map_outgoing(target)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_outbound_with_defaults() {
        let outbound = DirectOutbound::with_defaults();
        assert!(outbound.socket_opts.nodelay);
        assert_eq!(outbound.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_direct_outbound_builders() {
        let outbound = DirectOutbound::with_defaults()
            .with_socket_opts(SocketOpts::none())
            .with_connect_timeout(Duration::from_secs(3));
        assert!(!outbound.socket_opts.nodelay);
        assert_eq!(outbound.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_unmap() {
        let mapped: SocketAddr = "[::ffff:10.1.2.3]:53".parse().unwrap();
        assert_eq!(unmap(mapped), "10.1.2.3:53".parse::<SocketAddr>().unwrap());

        let v6: SocketAddr = "[2001:db8::1]:53".parse().unwrap();
        assert_eq!(unmap(v6), v6);
    }

    #[tokio::test]
    async fn test_connect_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let outbound = DirectOutbound::with_defaults();
        let stream = outbound.connect_tcp(addr).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn test_connect_tcp_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outbound = DirectOutbound::with_defaults();
        assert!(outbound.connect_tcp(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_open_udp_reaches_ipv4_peer() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let outbound = DirectOutbound::with_defaults();
        let datagram = outbound.open_udp().await.unwrap();
        datagram.send_to(b"hello", peer_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");

        peer.send_to(b"back", from).await.unwrap();
        let (n, reply_from) = datagram.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"back");
        assert_eq!(reply_from, peer_addr);
    }
}
