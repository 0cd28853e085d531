//! Tenaz CLI library
//!
//! Argument parsing, logging setup and the `run` / `validate` handlers behind
//! the `tenaz` binary.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
pub mod runner;

pub use commands::{Cli, ColorArg, Commands, LogFormatArg, ReportFormatArg, RunArgs, ValidateArgs};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{failure_lines, OutputFormat, ProgressReporter};
