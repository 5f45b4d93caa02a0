//! Server configuration types
//!
//! Defines the root configuration structure for the Honks server.

use super::UsersConfig;
use crate::socks::{Authenticator, ServerOptions};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Addresses to listen on
    #[serde(default)]
    pub listen: ListenConfig,

    /// Idle timeout in seconds, 0 disables it
    #[serde(default)]
    pub timeout: u64,

    /// Answer UDP ASSOCIATE with "command not supported"
    #[serde(default)]
    pub disable_udp: bool,

    /// Accepted credentials; empty disables authentication
    #[serde(default)]
    pub users: UsersConfig,

    /// Minimum level of log messages
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listen.is_empty() {
            return Err("No listen address configured".to_string());
        }
        if let Some(addr) = self.listen.iter().find(|addr| addr.trim().is_empty()) {
            return Err(format!("Invalid listen address: {:?}", addr));
        }
        // RFC 1929 credentials are 1 to 255 bytes long
        for (username, password) in self.users.0.iter() {
            if username.is_empty() || username.len() > 255 {
                return Err(format!("Invalid username: {:?}", username));
            }
            if password.is_empty() || password.len() > 255 {
                return Err(format!("Invalid password for user {:?}", username));
            }
        }
        Ok(())
    }

    /// Idle timeout, `None` when disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Build the immutable options the SOCKS5 server runs with
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            authenticator: self
                .users
                .user_table()
                .map(|table| Arc::new(table) as Arc<dyn Authenticator>),
            idle_timeout: self.idle_timeout(),
            disable_udp: self.disable_udp,
        }
    }
}

/// One or more listen addresses
///
/// Accepts a single string or an array of strings; `null` is empty.
/// Serializes back to `null`, a string or an array depending on length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenConfig(pub Vec<String>);

impl ListenConfig {
    /// Check if no address is configured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the configured addresses as written
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Addresses ready to bind
    ///
    /// An address with an empty host, such as `":1080"`, listens on all
    /// IPv4 interfaces.
    pub fn bind_addrs(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|addr| match addr.strip_prefix(':') {
                Some(port) => format!("0.0.0.0:{}", port),
                None => addr.clone(),
            })
            .collect()
    }
}

impl fmt::Display for ListenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for ListenConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
            None => ListenConfig::default(),
            Some(OneOrMany::One(addr)) => ListenConfig(vec![addr]),
            Some(OneOrMany::Many(addrs)) => ListenConfig(addrs),
        })
    }
}

impl Serialize for ListenConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [] => serializer.serialize_none(),
            [addr] => serializer.serialize_str(addr),
            addrs => addrs.serialize(serializer),
        }
    }
}

/// Log level names accepted in the configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Everything, including per-connection events
    #[default]
    Verbose,
    /// Lifecycle messages
    Info,
    /// Failures only
    Error,
    /// Fatal failures only
    Fatal,
}

impl LogLevel {
    /// Maximum `tracing` level to emit
    pub fn tracing_level(self) -> Level {
        match self {
            LogLevel::Verbose => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Error | LogLevel::Fatal => Level::ERROR,
        }
    }

    /// Name used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Verbose => "verbose",
            LogLevel::Info => "info",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "verbose" => Ok(LogLevel::Verbose),
            "info" => Ok(LogLevel::Info),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(format!("invalid log level: {}", other)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
