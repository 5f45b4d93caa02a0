//! SOCKS5 authentication module
//!
//! Handles method negotiation and username/password sub-negotiation.

mod password;

pub use password::PasswordAuth;

use super::consts::*;
use crate::error::Socks5Error;
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Credential check used by username/password authentication.
///
/// The server only offers username/password when an authenticator is
/// configured; without one every connection negotiates "no authentication".
pub trait Authenticator: Send + Sync {
    /// Return `true` if the credential pair is accepted
    fn verify(&self, username: &str, password: &str) -> bool;
}

impl<F> Authenticator for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn verify(&self, username: &str, password: &str) -> bool {
        self(username, password)
    }
}

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }

    /// Parse from SOCKS5 method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::None),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::Password),
            _ => None,
        }
    }

    /// The single method a server offers for the given authenticator
    pub fn for_authenticator(authenticator: Option<&dyn Authenticator>) -> Self {
        match authenticator {
            Some(_) => AuthMethod::Password,
            None => AuthMethod::None,
        }
    }
}

/// Perform method negotiation and, if required, username/password authentication
///
/// # Protocol
///
/// ```text
/// +----+----------+----------+        +----+--------+
/// |VER | NMETHODS | METHODS  |   =>   |VER | METHOD |
/// +----+----------+----------+        +----+--------+
/// | 1  |    1     | 1 to 255 |        | 1  |   1    |
/// +----+----------+----------+        +----+--------+
/// ```
///
/// Exactly one selection reply is written. If the server's method is not
/// among the offered ones the reply is `X'FF'` and negotiation fails with
/// [`Socks5Error::NoAcceptableMethod`].
///
/// A rejected credential pair fails with [`Socks5Error::AuthFailed`] after
/// the failure sub-reply has been sent.
pub async fn negotiate<S>(
    stream: &mut S,
    authenticator: Option<&dyn Authenticator>,
) -> Result<AuthMethod>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Step 1: Read version and number of methods
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1] as usize;

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    // Step 2: Read offered methods
    let mut methods = vec![0u8; num_methods];
    stream.read_exact(&mut methods).await?;

    // Step 3: Select the configured method if the client offers it
    let method = AuthMethod::for_authenticator(authenticator);
    if !methods.contains(&method.to_byte()) {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
            .await?;
        stream.flush().await?;
        return Err(Socks5Error::NoAcceptableMethod.into());
    }

    stream.write_all(&[SOCKS5_VERSION, method.to_byte()]).await?;
    stream.flush().await?;

    // Step 4: Sub-negotiation
    if let Some(authenticator) = authenticator {
        PasswordAuth::authenticate(stream, authenticator).await?;
    }

    Ok(method)
}
