//! Username/password authentication handler
//!
//! Implements RFC 1929 username/password authentication for SOCKS5.

use super::Authenticator;
use crate::error::Socks5Error;
use crate::socks::consts::{
    SOCKS5_AUTH_STATUS_FAILURE, SOCKS5_AUTH_STATUS_SUCCESS, SOCKS5_AUTH_VERSION,
};
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Username/password authentication handler
pub struct PasswordAuth;

impl PasswordAuth {
    /// Perform username/password authentication
    ///
    /// # Protocol
    ///
    /// Client sends:
    /// ```text
    /// +----+------+----------+------+----------+
    /// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
    /// +----+------+----------+------+----------+
    /// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
    /// +----+------+----------+------+----------+
    /// ```
    ///
    /// Server responds:
    /// ```text
    /// +----+--------+
    /// |VER | STATUS |
    /// +----+--------+
    /// | 1  |   1    |
    /// +----+--------+
    /// ```
    pub async fn authenticate<S>(stream: &mut S, authenticator: &dyn Authenticator) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Read version and username length
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await?;

        let version = buf[0];
        let username_len = buf[1] as usize;

        if version != SOCKS5_AUTH_VERSION {
            send_auth_result(stream, SOCKS5_AUTH_STATUS_FAILURE).await?;
            return Err(Socks5Error::InvalidAuthVersion(version).into());
        }

        if username_len == 0 {
            send_auth_result(stream, SOCKS5_AUTH_STATUS_FAILURE).await?;
            return Err(Socks5Error::InvalidCredentials("empty username".to_string()).into());
        }

        let mut username = vec![0u8; username_len];
        stream.read_exact(&mut username).await?;

        let password_len = stream.read_u8().await? as usize;

        if password_len == 0 {
            send_auth_result(stream, SOCKS5_AUTH_STATUS_FAILURE).await?;
            return Err(Socks5Error::InvalidCredentials("empty password".to_string()).into());
        }

        let mut password = vec![0u8; password_len];
        stream.read_exact(&mut password).await?;

        let username = String::from_utf8_lossy(&username);
        let password = String::from_utf8_lossy(&password);

        if authenticator.verify(&username, &password) {
            send_auth_result(stream, SOCKS5_AUTH_STATUS_SUCCESS).await?;
            tracing::debug!("Authentication successful for user: {}", username);
            Ok(())
        } else {
            send_auth_result(stream, SOCKS5_AUTH_STATUS_FAILURE).await?;
            Err(Socks5Error::AuthFailed(username.into_owned()).into())
        }
    }
}

/// Send authentication result to client
async fn send_auth_result<S: AsyncWrite + Unpin>(stream: &mut S, status: u8) -> Result<()> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn create_auth_request(username: &str, password: &str) -> Vec<u8> {
        let mut request = Vec::new();
        request.push(SOCKS5_AUTH_VERSION);
        request.push(username.len() as u8);
        request.extend_from_slice(username.as_bytes());
        request.push(password.len() as u8);
        request.extend_from_slice(password.as_bytes());
        request
    }

    fn testuser(username: &str, password: &str) -> bool {
        username == "testuser" && password == "testpass"
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(&create_auth_request("testuser", "testpass"))
            .await
            .unwrap();

        let result = PasswordAuth::authenticate(&mut server, &testuser).await;
        assert!(result.is_ok());

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [SOCKS5_AUTH_VERSION, SOCKS5_AUTH_STATUS_SUCCESS]);
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(&create_auth_request("testuser", "wrongpass"))
            .await
            .unwrap();

        let result = PasswordAuth::authenticate(&mut server, &testuser).await;
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Socks5Error>(),
            Some(Socks5Error::AuthFailed(_))
        ));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [SOCKS5_AUTH_VERSION, SOCKS5_AUTH_STATUS_FAILURE]);
    }

    #[tokio::test]
    async fn test_authenticate_invalid_version() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut request = create_auth_request("user", "pass");
        request[0] = 0xFF;
        client.write_all(&request).await.unwrap();

        let result = PasswordAuth::authenticate(&mut server, &testuser).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid auth version"));
    }

    #[tokio::test]
    async fn test_authenticate_zero_username_length() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(&[SOCKS5_AUTH_VERSION, 0, 4, b'p', b'a', b's', b's'])
            .await
            .unwrap();

        let result = PasswordAuth::authenticate(&mut server, &testuser).await;
        assert!(result.unwrap_err().to_string().contains("empty username"));
    }

    #[tokio::test]
    async fn test_authenticate_zero_password_length() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(&[SOCKS5_AUTH_VERSION, 4, b'u', b's', b'e', b'r', 0])
            .await
            .unwrap();

        let result = PasswordAuth::authenticate(&mut server, &testuser).await;
        assert!(result.unwrap_err().to_string().contains("empty password"));
    }

    #[tokio::test]
    async fn test_authenticate_truncated_request() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(&[SOCKS5_AUTH_VERSION, 8, b'u'])
            .await
            .unwrap();
        drop(client);

        assert!(PasswordAuth::authenticate(&mut server, &testuser)
            .await
            .is_err());
    }
}
