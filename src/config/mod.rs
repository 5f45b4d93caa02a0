//! Configuration module for Honks
//!
//! This module provides configuration types and parsing for the server.
//! Files ending in `.toml` are read as TOML, everything else as JSON5, so
//! plain JSON, comments and trailing commas are all accepted.

mod server;
mod users;

pub use server::{Config, ListenConfig, LogLevel};
pub use users::{UserTable, UsersConfig};

use crate::error::HonksError;
use anyhow::{Context, Result};
use std::path::Path;

/// Configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON5, the default
    Json,
    /// TOML, chosen by a `.toml` extension
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a file name
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Load and validate configuration from a file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content, ConfigFormat::from_path(path))
        .with_context(|| format!("Cannot parse config from {:?}", path))?;
    config.validate().map_err(HonksError::Config)?;

    Ok(config)
}

/// Parse configuration from a string
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<Config> {
    match format {
        ConfigFormat::Json => {
            json5::from_str(content).with_context(|| "Failed to parse JSON configuration")
        }
        ConfigFormat::Toml => {
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")
        }
    }
}
