//! TCP relay for SOCKS5 CONNECT command
//!
//! Handles TCP CONNECT requests by establishing a connection to the target
//! and relaying data bidirectionally.

use super::command::{send_failure, send_success};
use super::consts::RELAY_BUFFER_SIZE;
use super::observer::EventObserver;
use super::types::TargetAddr;
use crate::error::Socks5ReplyCode;
use crate::transport::Outbound;
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

/// Shared idle deadline for one client connection
///
/// Both relay directions push the deadline forward; the relay fails with
/// [`io::ErrorKind::TimedOut`] once it passes without being renewed.
#[derive(Debug, Clone)]
pub struct IdleDeadline {
    timeout: Duration,
    deadline: Arc<Mutex<Instant>>,
}

impl IdleDeadline {
    /// Create a deadline that expires `timeout` from now
    pub fn new(timeout: Duration) -> Self {
        IdleDeadline {
            timeout,
            deadline: Arc::new(Mutex::new(Instant::now() + timeout)),
        }
    }

    /// Push the deadline to `timeout` from now
    pub fn renew(&self) {
        *self.lock() = Instant::now() + self.timeout;
    }

    /// Current deadline
    pub fn deadline(&self) -> Instant {
        *self.lock()
    }

    /// Resolve once the deadline passes without having been renewed
    pub async fn expired(&self) {
        loop {
            let deadline = self.deadline();
            tokio::time::sleep_until(deadline).await;
            if Instant::now() >= self.deadline() {
                return;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.deadline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle TCP CONNECT command
///
/// This function:
/// 1. Resolves the target address
/// 2. Establishes a TCP connection to the target
/// 3. Sends a success reply
/// 4. Relays data bidirectionally between client and target
///
/// Resolution and dial failures are both answered with "host unreachable".
/// The observer sees `tcp_request` before anything else and exactly one
/// `tcp_closed` when the session ends.
pub async fn handle_tcp_connect<S, O>(
    client_stream: S,
    target_addr: TargetAddr,
    client_addr: SocketAddr,
    outbound: &O,
    idle_timeout: Option<Duration>,
    observer: &dyn EventObserver,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    O: Outbound,
{
    observer.tcp_request(client_addr, &target_addr);

    let result = connect_and_relay(client_stream, &target_addr, outbound, idle_timeout).await;

    observer.tcp_closed(client_addr, &target_addr, result.as_ref().err());
    result
}

async fn connect_and_relay<S, O>(
    mut client_stream: S,
    target_addr: &TargetAddr,
    outbound: &O,
    idle_timeout: Option<Duration>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    O: Outbound,
{
    // Resolve address
    let socket_addr = match target_addr.resolve().await {
        Ok(addr) => addr,
        Err(e) => {
            debug!("Failed to resolve {}: {}", target_addr, e);
            send_failure(&mut client_stream, Socks5ReplyCode::HostUnreachable).await?;
            return Err(e.into());
        }
    };

    debug!("Connecting to target: {}", socket_addr);

    let target_stream = match outbound.connect_tcp(socket_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Failed to connect to {}: {}", socket_addr, e);
            send_failure(&mut client_stream, Socks5ReplyCode::HostUnreachable).await?;
            return Err(e).with_context(|| format!("Failed to connect to {}", socket_addr));
        }
    };

    // Bind address is left zero-filled
    send_success(&mut client_stream, None).await?;

    debug!("SOCKS5 tunnel established to {}", socket_addr);

    relay_tcp(client_stream, target_stream, idle_timeout)
        .await
        .with_context(|| format!("Relay to {} failed", socket_addr))
}

/// Relay data bidirectionally between the client and the target
///
/// Both directions run concurrently and the first one to finish wins:
/// end-of-stream on either side is a clean close (`Ok`), any I/O error is
/// returned. Both streams are dropped on return.
///
/// With an idle timeout, the deadline is renewed before every read from the
/// client and after every write to the client.
pub async fn relay_tcp<A, B>(client: A, target: B, idle_timeout: Option<Duration>) -> io::Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);

    let idle = idle_timeout.map(IdleDeadline::new);
    let renew = || {
        if let Some(idle) = &idle {
            idle.renew();
        }
    };

    let upstream = pump(&mut client_read, &mut target_write, &renew, &|| {});
    let downstream = pump(&mut target_read, &mut client_write, &|| {}, &renew);
    let expired = async {
        match &idle {
            Some(idle) => idle.expired().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = upstream => {
            match &result {
                Ok(bytes) => debug!("client->target finished: {} bytes", bytes),
                Err(e) => debug!("client->target error: {}", e),
            }
            result.map(|_| ())
        }
        result = downstream => {
            match &result {
                Ok(bytes) => debug!("target->client finished: {} bytes", bytes),
                Err(e) => debug!("target->client error: {}", e),
            }
            result.map(|_| ())
        }
        _ = expired => {
            debug!("client connection idle, closing relay");
            Err(io::Error::new(io::ErrorKind::TimedOut, "idle timeout"))
        }
    }
}

/// Copy until end-of-stream, calling the hooks around every chunk
async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    before_read: &(dyn Fn() + Sync),
    after_write: &(dyn Fn() + Sync),
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        before_read();
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }

        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        after_write();

        total += n as u64;
    }
}
