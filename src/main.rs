//! Honks - SOCKS5 Proxy Server
//!
//! This is the main entry point for the Honks application.

use anyhow::Result;
use clap::Parser;
use honks::config::load_config;
use honks::server::run_server;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Honks - SOCKS5 proxy server
#[derive(Parser, Debug)]
#[command(name = "honks")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON, or TOML with a .toml extension)
    config: PathBuf,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet
            let _ = setup_logging(Level::ERROR, args.json_log);
            error!("Cannot parse config from {:?}: {:#}", args.config, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_logging(config.log_level.tracing_level(), args.json_log) {
        eprintln!("Failed to set up logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("Honks v{}", honks::VERSION);
    info!("Configuration loaded from: {:?}", args.config);

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    match run_server(config, shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server exit: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Wait for Ctrl+C, or SIGTERM on unix
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
            }
            Err(e) => {
                error!("Failed to setup SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On Windows, only handle Ctrl+C
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }
}

/// Setup logging with the given maximum level
fn setup_logging(level: Level, json: bool) -> Result<()> {
    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
