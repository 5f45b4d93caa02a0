//! Server runner
//!
//! Binds every configured listen address and serves SOCKS5 on all of them
//! until shutdown.

use crate::config::Config;
use crate::listener::MultiListener;
use crate::socks::Socks5Server;
use crate::transport::DirectOutbound;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Bind every listen address of `config` into one aggregator
///
/// Any bind failure is fatal.
pub async fn bind_listeners(config: &Config) -> Result<MultiListener> {
    let listener = MultiListener::new();

    for addr in config.listen.bind_addrs() {
        let tcp = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Cannot listen on {}", addr))?;
        listener.add(tcp)?;
    }

    Ok(listener)
}

/// Run the server until shutdown
///
/// Returns `Ok` after a shutdown signal, or the first fatal error: a bind
/// failure or an accept error.
pub async fn run_server(config: Config, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let listener = bind_listeners(&config).await?;
    let server = Arc::new(Socks5Server::new(
        config.server_options(),
        DirectOutbound::with_defaults(),
    ));

    info!("Listen on {}", config.listen);
    debug!("Server options: {:?}", server.options());

    let result = tokio::select! {
        result = server.clone().serve(&listener) => {
            result.context("Server exited")
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received, stopping server");
            Ok(())
        }
    };

    listener.close();
    listener.wait_closed().await;

    info!("Server stopped");
    result
}
