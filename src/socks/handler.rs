//! Main SOCKS5 handler
//!
//! This module provides the per-connection entry point. It orchestrates
//! negotiation, request parsing and command dispatch.

use super::auth::negotiate;
use super::command::{parse_request, send_failure};
use super::tcp_relay::handle_tcp_connect;
use super::types::{Request, SocksCommand};
use super::udp::handle_udp_associate;
use super::{ConnectionInfo, Socks5Server};
use crate::error::{Socks5Error, Socks5ReplyCode};
use crate::transport::Outbound;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

impl<O: Outbound> Socks5Server<O> {
    /// Handle SOCKS5 protocol on an accepted connection
    ///
    /// # Protocol Flow
    ///
    /// 1. Method negotiation
    /// 2. Username/password authentication (if configured)
    /// 3. Request parsing
    /// 4. Command execution (CONNECT or UDP ASSOCIATE)
    ///
    /// Steps 1 to 3 must finish within the idle timeout. BIND and unknown
    /// commands are answered with "command not supported", as is
    /// UDP ASSOCIATE when UDP is disabled.
    pub async fn handle_connection<S>(&self, mut stream: S, conn: ConnectionInfo) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let request = match self.options.idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.handshake(&mut stream))
                .await
                .map_err(|_| Socks5Error::NegotiationTimeout)??,
            None => self.handshake(&mut stream).await?,
        };

        debug!(
            "SOCKS5 {} request to {} from {}",
            request.command, request.target, conn.peer_addr
        );

        match request.command {
            SocksCommand::Connect => {
                handle_tcp_connect(
                    stream,
                    request.target,
                    conn.peer_addr,
                    &self.outbound,
                    self.options.idle_timeout,
                    self.observer.as_ref(),
                )
                .await
            }
            SocksCommand::UdpAssociate if self.options.disable_udp => {
                debug!("UDP ASSOCIATE refused, UDP is disabled");
                send_failure(&mut stream, Socks5ReplyCode::CommandNotSupported).await?;
                Err(Socks5Error::UdpDisabled.into())
            }
            SocksCommand::UdpAssociate => {
                handle_udp_associate(stream, &conn, &self.outbound, self.observer.as_ref()).await
            }
            command @ (SocksCommand::Bind | SocksCommand::Other(_)) => {
                debug!("{} command not supported", command);
                send_failure(&mut stream, Socks5ReplyCode::CommandNotSupported).await?;
                Err(Socks5Error::CommandNotSupported(command.to_byte()).into())
            }
        }
    }

    /// Negotiate a method and read the request
    async fn handshake<S>(&self, stream: &mut S) -> Result<Request>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let auth_method = negotiate(stream, self.options.authenticator.as_deref())
            .await
            .context("Method negotiation failed")?;

        debug!("Negotiation completed with method: {:?}", auth_method);

        match parse_request(stream).await {
            Ok(request) => Ok(request),
            Err(e) => {
                if let Some(Socks5Error::AddressTypeNotSupported(_)) = e.downcast_ref::<Socks5Error>()
                {
                    send_failure(stream, Socks5ReplyCode::AddressTypeNotSupported).await?;
                }
                Err(e.context("Failed to parse SOCKS5 request"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::consts::*;
    use crate::socks::ServerOptions;
    use crate::transport::DirectOutbound;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn conn() -> ConnectionInfo {
        ConnectionInfo {
            peer_addr: "127.0.0.1:40000".parse().unwrap(),
            local_addr: "127.0.0.1:1080".parse().unwrap(),
        }
    }

    fn server(options: ServerOptions) -> Socks5Server<DirectOutbound> {
        Socks5Server::new(options, DirectOutbound::with_defaults())
    }

    // Mock SOCKS5 handshake: no-auth negotiation followed by a request
    fn create_socks5_handshake(command: u8, addr: &[u8]) -> Vec<u8> {
        let mut data = vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE];
        data.extend_from_slice(&[SOCKS5_VERSION, command, SOCKS5_RESERVED]);
        data.extend_from_slice(addr);
        data
    }

    const LOCALHOST_80: [u8; 7] = [SOCKS5_ADDR_TYPE_IPV4, 127, 0, 0, 1, 0, 80];

    async fn run_and_read_reply(
        server: Socks5Server<DirectOutbound>,
        input: Vec<u8>,
    ) -> (Result<()>, Vec<u8>) {
        let (mut client, stream) = duplex(1024);
        client.write_all(&input).await.unwrap();

        let result = server.handle_connection(stream, conn()).await;

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        (result, output)
    }

    #[tokio::test]
    async fn test_bind_is_not_supported() {
        let input = create_socks5_handshake(SOCKS5_CMD_TCP_BIND, &LOCALHOST_80);
        let (result, output) = run_and_read_reply(server(ServerOptions::default()), input).await;

        assert!(matches!(
            result.unwrap_err().downcast_ref::<Socks5Error>(),
            Some(Socks5Error::CommandNotSupported(SOCKS5_CMD_TCP_BIND))
        ));
        assert_eq!(&output[..2], &[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]);
        assert_eq!(&output[2..], &[5, 7, 0, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_unknown_command_is_not_supported() {
        let input = create_socks5_handshake(0x42, &LOCALHOST_80);
        let (result, output) = run_and_read_reply(server(ServerOptions::default()), input).await;

        assert!(result.is_err());
        assert_eq!(output[3], u8::from(Socks5ReplyCode::CommandNotSupported));
    }

    #[tokio::test]
    async fn test_udp_associate_disabled() {
        let options = ServerOptions {
            disable_udp: true,
            ..Default::default()
        };
        let input = create_socks5_handshake(SOCKS5_CMD_UDP_ASSOCIATE, &LOCALHOST_80);
        let (result, output) = run_and_read_reply(server(options), input).await;

        assert!(matches!(
            result.unwrap_err().downcast_ref::<Socks5Error>(),
            Some(Socks5Error::UdpDisabled)
        ));
        assert_eq!(output[3], u8::from(Socks5ReplyCode::CommandNotSupported));
    }

    #[tokio::test]
    async fn test_unknown_address_type_is_answered() {
        let input = create_socks5_handshake(SOCKS5_CMD_TCP_CONNECT, &[0x05, 1, 2, 3, 4, 0, 80]);
        let (result, output) = run_and_read_reply(server(ServerOptions::default()), input).await;

        assert!(matches!(
            result.unwrap_err().downcast_ref::<Socks5Error>(),
            Some(Socks5Error::AddressTypeNotSupported(0x05))
        ));
        assert_eq!(output[3], u8::from(Socks5ReplyCode::AddressTypeNotSupported));
    }

    #[tokio::test]
    async fn test_handle_socks5_requires_valid_version() {
        let (result, output) =
            run_and_read_reply(server(ServerOptions::default()), vec![0x04, 1, 0x00]).await;

        assert!(result.is_err());
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_stops_before_request() {
        let options = ServerOptions {
            authenticator: Some(Arc::new(|u: &str, p: &str| u == "alice" && p == "secret")),
            ..Default::default()
        };
        let mut input = vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD];
        input.extend_from_slice(&[SOCKS5_AUTH_VERSION, 5]);
        input.extend_from_slice(b"alice");
        input.push(3);
        input.extend_from_slice(b"bad");

        let (result, output) = run_and_read_reply(server(options), input).await;

        assert!(matches!(
            result.unwrap_err().downcast_ref::<Socks5Error>(),
            Some(Socks5Error::AuthFailed(_))
        ));
        assert_eq!(
            output,
            vec![
                SOCKS5_VERSION,
                SOCKS5_AUTH_METHOD_PASSWORD,
                SOCKS5_AUTH_VERSION,
                SOCKS5_AUTH_STATUS_FAILURE
            ]
        );
    }

    #[tokio::test]
    async fn test_negotiation_timeout() {
        let options = ServerOptions {
            idle_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let (_client, stream) = duplex(1024);

        let err = server(options)
            .handle_connection(stream, conn())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Socks5Error>(),
            Some(Socks5Error::NegotiationTimeout)
        ));
    }
}
