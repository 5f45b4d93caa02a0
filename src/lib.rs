//! # Honks - SOCKS5 Proxy Server
//!
//! Honks is a SOCKS5 server (RFC 1928, RFC 1929). It listens on one or more
//! TCP addresses and serves CONNECT and UDP ASSOCIATE requests, optionally
//! behind username/password authentication.
//!
//! ## Features
//!
//! - **Multiple Listeners**: Any number of listen addresses behind one accept loop
//! - **Username/Password Authentication**: Constant-time checks against a user table
//! - **UDP ASSOCIATE**: Per-association UDP relay bound to the learned client endpoint
//! - **Idle Timeout**: Connections without traffic are closed
//! - **Pluggable Outbound**: Destination sockets come from an [`transport::Outbound`] provider
//!
//! ## Usage
//!
//! ```rust,ignore
//! use honks::config::load_config;
//! use honks::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.json")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! TCP listeners -> MultiListener -> Socks5Server -> Outbound -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod listener;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{HonksError, Socks5Error};
pub use server::run_server;

/// Version of the Honks library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
