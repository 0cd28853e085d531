//! `tracing` subscriber setup
//!
//! `RUST_LOG` wins when set; otherwise the directive comes from `-v`/`-q`.
//! Log lines go to stderr so stdout stays free for reports.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, Verbosity};
use crate::error::{CliError, CliResult};

/// Build the filter from `RUST_LOG` or the verbosity default
pub fn env_filter(verbosity: Verbosity) -> CliResult<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)
            .map_err(|e| CliError::config(format!("invalid {}: {e}", EnvFilter::DEFAULT_ENV))),
        _ => EnvFilter::try_new(verbosity.log_directive())
            .map_err(|e| CliError::config(e.to_string())),
    }
}

/// Install the global subscriber
pub fn init(verbosity: Verbosity, format: LogFormat, color: bool) -> CliResult<()> {
    let filter = env_filter(verbosity)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    let installed = match format {
        LogFormat::Text => builder.with_ansi(color).try_init(),
        LogFormat::Json => builder.json().with_ansi(false).try_init(),
    };
    installed.map_err(|e| CliError::config(format!("logging setup failed: {e}")))
}
