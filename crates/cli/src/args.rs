//! Command-line arguments.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use protocol::Method;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "schema", version, about = "Issue requests against a Schema API")]
pub struct Cli {
    /// TOML configuration file. Optional unless given explicitly.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "SCHEMA_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    #[arg(long, env = "SCHEMA_CLIENT_KEY", global = true, hide_env_values = true)]
    pub client_key: Option<String>,

    #[arg(long, env = "SCHEMA_HOST", global = true)]
    pub host: Option<String>,

    #[arg(long, env = "SCHEMA_PORT", global = true)]
    pub port: Option<u16>,

    /// Connect over plaintext TCP.
    #[arg(long, global = true)]
    pub clear: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read a resource (served from the cache when possible).
    Get(RequestArgs),
    /// Replace a resource.
    Put(RequestArgs),
    /// Create a resource.
    Post(RequestArgs),
    /// Delete a resource.
    Delete(RequestArgs),
    /// Authenticate and print the server's reply.
    Auth,
}

impl Command {
    /// The request method and its arguments; `None` for `auth`.
    pub fn request(&self) -> Option<(Method, &RequestArgs)> {
        match self {
            Command::Get(args) => Some((Method::Get, args)),
            Command::Put(args) => Some((Method::Put, args)),
            Command::Post(args) => Some((Method::Post, args)),
            Command::Delete(args) => Some((Method::Delete, args)),
            Command::Auth => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Resource url, e.g. `/products/1`.
    pub url: String,

    /// Request data as JSON.
    #[arg(long, short)]
    pub data: Option<String>,

    /// How many levels of links to expand in the output.
    #[arg(long, default_value_t = 0)]
    pub depth: usize,
}

impl RequestArgs {
    pub fn data(&self) -> anyhow::Result<Value> {
        match &self.data {
            Some(raw) => serde_json::from_str(raw).context("--data is not valid JSON"),
            None => Ok(Value::Null),
        }
    }
}
