//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.

use crate::error::Socks5ReplyCode;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use anyhow::Result;
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Build and send a SOCKS5 reply
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// # Arguments
///
/// * `stream` - The stream to write to
/// * `reply_code` - The reply status code
/// * `bind_addr` - The bound address (optional, defaults to 0.0.0.0:0)
pub async fn build_reply<S>(
    stream: &mut S,
    reply_code: Socks5ReplyCode,
    bind_addr: Option<SocketAddr>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&reply_bytes(reply_code, bind_addr))
        .await?;
    stream.flush().await?;

    Ok(())
}

/// Build a success reply
pub async fn send_success<S>(stream: &mut S, bind_addr: Option<SocketAddr>) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    build_reply(stream, Socks5ReplyCode::Succeeded, bind_addr).await
}

/// Build a failure reply with a zero-filled bind address
pub async fn send_failure<S>(stream: &mut S, reply_code: Socks5ReplyCode) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    build_reply(stream, reply_code, None).await
}

/// Serialize a reply without sending it
fn reply_bytes(reply_code: Socks5ReplyCode, bind_addr: Option<SocketAddr>) -> Vec<u8> {
    let bind_addr = bind_addr.map(TargetAddr::from).unwrap_or_default();

    let mut reply = vec![SOCKS5_VERSION, reply_code.into(), SOCKS5_RESERVED];
    reply.extend_from_slice(&bind_addr.to_bytes());
    reply
}
