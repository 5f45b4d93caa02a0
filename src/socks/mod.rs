//! SOCKS5 server module for Honks
//!
//! This module implements the SOCKS5 protocol (RFC 1928 and RFC 1929):
//! method negotiation, request dispatch, the CONNECT relay and the
//! UDP ASSOCIATE relay.

mod auth;
mod command;
mod consts;
mod handler;
mod observer;
mod tcp_relay;
mod types;
mod udp;

pub use auth::{negotiate, AuthMethod, Authenticator, PasswordAuth};
pub use command::{build_reply, parse_request};
pub use consts::*;
pub use observer::{EventObserver, NoopObserver, TracingObserver};
pub use tcp_relay::{handle_tcp_connect, relay_tcp, IdleDeadline};
pub use types::{Request, SocksCommand, TargetAddr};
pub use udp::{encode_udp_packet, handle_udp_associate, parse_udp_packet, UdpPacket};

use crate::error::HonksError;
use crate::listener::MultiListener;
use crate::transport::Outbound;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Immutable server settings
///
/// Built once from the configuration and shared by every connection.
#[derive(Clone, Default)]
pub struct ServerOptions {
    /// Credential check; `None` means no authentication
    pub authenticator: Option<Arc<dyn Authenticator>>,
    /// Idle timeout for client connections; `None` disables it
    pub idle_timeout: Option<Duration>,
    /// Answer UDP ASSOCIATE with "command not supported"
    pub disable_udp: bool,
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("auth_required", &self.authenticator.is_some())
            .field("idle_timeout", &self.idle_timeout)
            .field("disable_udp", &self.disable_udp)
            .finish()
    }
}

/// Addresses of an accepted client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// The client's address
    pub peer_addr: SocketAddr,
    /// Our address the client connected to
    pub local_addr: SocketAddr,
}

impl ConnectionInfo {
    /// Read both addresses off an accepted TCP stream
    pub fn from_tcp(stream: &TcpStream) -> io::Result<Self> {
        Ok(ConnectionInfo {
            peer_addr: stream.peer_addr()?,
            local_addr: stream.local_addr()?,
        })
    }
}

/// SOCKS5 server
///
/// Owns the options, the outbound provider used for every destination
/// socket and the lifecycle observer.
pub struct Socks5Server<O: Outbound> {
    options: ServerOptions,
    outbound: O,
    observer: Arc<dyn EventObserver>,
}

impl<O: Outbound> Socks5Server<O> {
    /// Create a server that reports events through [`TracingObserver`]
    pub fn new(options: ServerOptions, outbound: O) -> Self {
        Socks5Server {
            options,
            outbound,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the event observer
    pub fn with_observer<E: EventObserver>(mut self, observer: E) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Get a reference to the server options
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Serve connections from `listener` until it is closed
    ///
    /// Each connection runs on its own task and its errors never stop the
    /// loop. An accept error is returned; closing the listener returns `Ok`.
    pub async fn serve(self: Arc<Self>, listener: &MultiListener) -> Result<(), HonksError> {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(HonksError::ListenerClosed) => return Ok(()),
                Err(e) => return Err(e),
            };

            let server = self.clone();
            tokio::spawn(async move {
                let conn = match ConnectionInfo::from_tcp(&stream) {
                    Ok(conn) => conn,
                    Err(e) => {
                        debug!("Dropping connection from {}: {}", peer_addr, e);
                        return;
                    }
                };

                if let Err(e) = server.handle_connection(stream, conn).await {
                    debug!("Connection from {} closed: {:#}", peer_addr, e);
                }
            });
        }
    }
}
