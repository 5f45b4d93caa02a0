//! SOCKS5 request parser
//!
//! Parses SOCKS5 requests from the client after negotiation.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::{Request, SocksCommand, TargetAddr};
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Parse a SOCKS5 request from the stream
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The command byte is not validated here: BIND and unknown commands are
/// parsed in full so the dispatcher can answer them with a reply.
pub async fn parse_request<S>(stream: &mut S) -> Result<Request>
where
    S: AsyncRead + Unpin,
{
    // Read: VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .with_context(|| "Failed to read request header")?;

    let version = header[0];
    let command = SocksCommand::from_byte(header[1]);
    let addr_type = header[3];

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    let target = parse_address(stream, addr_type).await?;

    tracing::trace!("Parsed SOCKS5 request: {} to {}", command, target);

    Ok(Request { command, target })
}

/// Parse the address portion of a SOCKS5 request
async fn parse_address<S>(stream: &mut S, addr_type: u8) -> Result<TargetAddr>
where
    S: AsyncRead + Unpin,
{
    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = stream.read_u16().await?;

            Ok(TargetAddr::ipv4(Ipv4Addr::from(addr), port))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let domain_len = stream.read_u8().await? as usize;

            if domain_len == 0 {
                return Err(Socks5Error::InvalidDomain("empty domain".to_string()).into());
            }

            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await?;
            let domain = String::from_utf8(domain_buf)
                .map_err(|e| Socks5Error::InvalidDomain(e.to_string()))?;

            let port = stream.read_u16().await?;

            Ok(TargetAddr::domain(domain, port))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let port = stream.read_u16().await?;

            Ok(TargetAddr::ipv6(Ipv6Addr::from(addr), port))
        }

        _ => Err(Socks5Error::AddressTypeNotSupported(addr_type).into()),
    }
}
