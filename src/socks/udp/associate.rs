//! UDP ASSOCIATE command handler
//!
//! Binds a client-facing UDP socket and relays datagrams between the client
//! and arbitrary destinations for as long as the control connection lives.

use super::packet::{encode_udp_packet, parse_udp_packet, UdpPacket};
use crate::error::Socks5ReplyCode;
use crate::socks::command::{send_failure, send_success};
use crate::socks::consts::UDP_BUFFER_SIZE;
use crate::socks::observer::EventObserver;
use crate::socks::ConnectionInfo;
use crate::transport::{DatagramSocket, Outbound};
use anyhow::{Context, Result};
use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Handle UDP ASSOCIATE command
///
/// The client-facing socket is bound on the IP the client reached us on,
/// and that IP plus the socket's port is returned in the success reply.
/// The association ends when the control connection is closed or fails;
/// both relay tasks are stopped and joined before the sockets are released.
///
/// The client endpoint is learned from the first well-formed datagram.
/// Datagrams from any other source are dropped, as are fragments.
pub async fn handle_udp_associate<S, O>(
    control: S,
    conn: &ConnectionInfo,
    outbound: &O,
    observer: &dyn EventObserver,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    O: Outbound,
{
    observer.udp_associate(conn.peer_addr);

    let result = run_association(control, conn, outbound).await;

    observer.udp_closed(conn.peer_addr, result.as_ref().err());
    result
}

async fn run_association<S, O>(mut control: S, conn: &ConnectionInfo, outbound: &O) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    O: Outbound,
{
    let local_ip = match conn.local_addr.ip() {
        IpAddr::V6(ip) => ip.to_ipv4_mapped().map_or(IpAddr::V6(ip), IpAddr::V4),
        ip => ip,
    };

    let client_socket = match UdpSocket::bind(SocketAddr::new(local_ip, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            send_failure(&mut control, Socks5ReplyCode::GeneralFailure).await?;
            return Err(e).with_context(|| format!("Failed to bind UDP socket on {}", local_ip));
        }
    };

    let remote_socket = match outbound.open_udp().await {
        Ok(socket) => socket,
        Err(e) => {
            send_failure(&mut control, Socks5ReplyCode::GeneralFailure).await?;
            return Err(e).context("Failed to open outbound UDP socket");
        }
    };

    let relay_port = client_socket.local_addr()?.port();
    send_success(&mut control, Some(SocketAddr::new(local_ip, relay_port))).await?;

    debug!(
        "UDP association for {} relaying on {}:{}",
        conn.peer_addr, local_ip, relay_port
    );

    let cancel = CancellationToken::new();
    let client_task = tokio::spawn(client_to_remote(
        Arc::new(client_socket),
        Arc::new(remote_socket),
        cancel.clone(),
    ));

    // The control connection carries no more data; it only marks the
    // lifetime of the association.
    let mut discard = [0u8; 512];
    let closed = loop {
        match control.read(&mut discard).await {
            Ok(0) => break Ok(()),
            Ok(_) => continue,
            Err(e) => break Err(e),
        }
    };

    cancel.cancel();
    if let Err(e) = client_task.await {
        debug!("UDP relay task failed: {}", e);
    }

    closed.context("UDP control connection failed")
}

/// Client to destination direction
///
/// Owns the reverse task once the client endpoint is known and joins it
/// before returning.
async fn client_to_remote<D: DatagramSocket>(
    client_socket: Arc<UdpSocket>,
    remote_socket: Arc<D>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; UDP_BUFFER_SIZE];
    let mut client_endpoint: Option<SocketAddr> = None;
    let mut reverse_task: Option<JoinHandle<()>> = None;

    loop {
        let (n, from) = tokio::select! {
            _ = cancel.cancelled() => break,
            result = client_socket.recv_from(&mut buf) => match result {
                Ok(received) => received,
                Err(e) => {
                    debug!("UDP receive from client failed: {}", e);
                    break;
                }
            },
        };

        let packet = match parse_udp_packet(&buf[..n]) {
            Ok(packet) => packet,
            Err(e) => {
                trace!("Dropping malformed datagram from {}: {}", from, e);
                continue;
            }
        };

        if packet.is_fragmented() {
            trace!("Dropping fragmented datagram from {}", from);
            continue;
        }

        match client_endpoint {
            Some(endpoint) if endpoint != from => {
                trace!("Dropping datagram from unknown source {}", from);
                continue;
            }
            Some(_) => {}
            None => {
                debug!("UDP client endpoint learned: {}", from);
                client_endpoint = Some(from);
                reverse_task = Some(tokio::spawn(remote_to_client(
                    remote_socket.clone(),
                    client_socket.clone(),
                    from,
                    cancel.clone(),
                )));
            }
        }

        let target = match packet.addr.resolve().await {
            Ok(addr) => addr,
            Err(e) => {
                debug!("Dropping datagram: {}", e);
                continue;
            }
        };

        if let Err(e) = remote_socket.send_to(&packet.data, target).await {
            debug!("UDP send to {} failed: {}", target, e);
        }
    }

    if let Some(task) = reverse_task {
        if let Err(e) = task.await {
            debug!("UDP reverse task failed: {}", e);
        }
    }
}

/// Destination to client direction
async fn remote_to_client<D: DatagramSocket>(
    remote_socket: Arc<D>,
    client_socket: Arc<UdpSocket>,
    client: SocketAddr,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; UDP_BUFFER_SIZE];

    loop {
        let (n, from) = tokio::select! {
            _ = cancel.cancelled() => break,
            result = remote_socket.recv_from(&mut buf) => match result {
                Ok(received) => received,
                Err(e) => {
                    debug!("UDP receive from remote failed: {}", e);
                    break;
                }
            },
        };

        let packet = UdpPacket::new(from.into(), Bytes::copy_from_slice(&buf[..n]));
        if let Err(e) = client_socket
            .send_to(&encode_udp_packet(&packet), client)
            .await
        {
            debug!("UDP send to client {} failed: {}", client, e);
        }
    }
}
