//! Tracing subscriber wiring. Logs go to stderr so stdout stays clean JSON.

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the filter directive, e.g. `client=debug`.
pub const LOG_ENV: &str = "SCHEMA_LOG";

const DEFAULT_FILTER: &str = "warn";

pub fn init(json: bool) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("unable to install log subscriber: {e}"))
    } else {
        builder
            .compact()
            .try_init()
            .map_err(|e| anyhow::anyhow!("unable to install log subscriber: {e}"))
    }
}
