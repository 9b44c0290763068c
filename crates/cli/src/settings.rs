//! Configuration loading: TOML file first, then command-line and environment
//! overrides.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use client::ClientConfig;
use protocol::SessionId;
use tracing::debug;
use uuid::Uuid;

use crate::args::Cli;

/// Read when `--config` is not given; a missing file is not an error.
pub const DEFAULT_CONFIG: &str = "schema.toml";

pub fn load(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let (path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let mut config = read(&path, required)?;
    apply(&mut config, cli);
    Ok(config)
}

pub fn parse(text: &str) -> anyhow::Result<ClientConfig> {
    Ok(toml::from_str(text)?)
}

fn read(path: &Path, required: bool) -> anyhow::Result<ClientConfig> {
    match fs::read_to_string(path) {
        Ok(text) => parse(&text)
            .with_context(|| format!("invalid configuration in {}", path.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound && !required => {
            debug!(path = %path.display(), "no configuration file; using defaults");
            Ok(ClientConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("unable to read {}", path.display())),
    }
}

fn apply(config: &mut ClientConfig, cli: &Cli) {
    if let Some(client_id) = &cli.client_id {
        config.client_id = client_id.clone();
    }
    if let Some(client_key) = &cli.client_key {
        config.client_key = client_key.clone();
    }
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.clear {
        config.clear = true;
    }
    if config.session.is_none() {
        config.session = SessionId::new(Uuid::new_v4().to_string());
    }
}
