//! Schema CLI entry point.
//!
//! Composition root: loads configuration (file, then flags and environment),
//! installs the tracing subscriber, builds a [`client::Client`] and runs one
//! request, printing the result as pretty JSON on stdout.

mod args;
mod logging;
mod settings;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing::error;

use args::Cli;
use client::Client;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.log_json) {
        eprintln!("warning: {e:#}");
    }
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "request failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = settings::load(cli)?;
    let client = Client::new(config).context("unable to create client")?;

    let output = match cli.command.request() {
        Some((method, request)) => {
            let data = request.data()?;
            client
                .request(method, &request.url, data)
                .with_context(|| format!("{method} {} failed", request.url))?
                .dump(request.depth)
        }
        None => Value::Object(client.auth(None).context("authentication failed")?),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
