//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tenaz: resilient UI verification from the command line
#[derive(Parser, Debug)]
#[command(name = "tenaz")]
#[command(author, version, about = "Resilient UI verification: run declarative browser scenarios")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except failures
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenario files against a live browser
    Run(RunArgs),

    /// Check scenario files without launching a browser
    Validate(ValidateArgs),
}

/// Arguments for `tenaz run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Scenario files (YAML, one or more documents each)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Engine configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base URL relative navigation targets are joined to
    #[arg(long)]
    pub base_url: Option<String>,

    /// Directory for screenshots and diagnostics
    #[arg(long)]
    pub artifacts: Option<PathBuf>,

    /// Scenarios run concurrently
    #[arg(short, long, default_value = "1")]
    pub jobs: usize,

    /// Console output format
    #[arg(long, default_value = "text")]
    pub format: ReportFormatArg,

    /// Write every scenario report as a JSON array to this file
    #[arg(long)]
    pub json_report: Option<PathBuf>,

    /// Write a JUnit XML report to this file
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}

/// Arguments for `tenaz validate`
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Scenario files to check
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Color argument for CLI
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Console report format
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormatArg {
    /// Per-step console summary
    #[default]
    Text,
    /// Scenario reports as JSON
    Json,
}

impl From<ReportFormatArg> for crate::output::OutputFormat {
    fn from(arg: ReportFormatArg) -> Self {
        match arg {
            ReportFormatArg::Text => Self::Text,
            ReportFormatArg::Json => Self::Json,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_run_defaults() {
            let cli = Cli::try_parse_from(["tenaz", "run", "drawer.yaml"]).unwrap();
            assert_eq!(cli.verbose, 0);
            assert!(!cli.quiet);
            assert_eq!(cli.color, ColorArg::Auto);
            assert_eq!(cli.log_format, LogFormatArg::Text);
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.files, vec![PathBuf::from("drawer.yaml")]);
            assert_eq!(args.jobs, 1);
            assert_eq!(args.format, ReportFormatArg::Text);
            assert!(!args.headed);
        }

        #[test]
        fn test_run_all_flags() {
            let cli = Cli::try_parse_from([
                "tenaz",
                "-vv",
                "--color",
                "never",
                "--log-format",
                "json",
                "run",
                "a.yaml",
                "b.yaml",
                "--config",
                "tenaz.yaml",
                "--base-url",
                "http://localhost:8080",
                "--artifacts",
                "out",
                "--jobs",
                "4",
                "--format",
                "json",
                "--json-report",
                "report.json",
                "--junit",
                "junit.xml",
                "--headed",
            ])
            .unwrap();
            assert_eq!(cli.verbose, 2);
            assert_eq!(cli.color, ColorArg::Never);
            assert_eq!(cli.log_format, LogFormatArg::Json);
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.files.len(), 2);
            assert_eq!(args.config, Some(PathBuf::from("tenaz.yaml")));
            assert_eq!(args.base_url.as_deref(), Some("http://localhost:8080"));
            assert_eq!(args.artifacts, Some(PathBuf::from("out")));
            assert_eq!(args.jobs, 4);
            assert_eq!(args.format, ReportFormatArg::Json);
            assert_eq!(args.junit, Some(PathBuf::from("junit.xml")));
            assert!(args.headed);
        }

        #[test]
        fn test_run_requires_files() {
            assert!(Cli::try_parse_from(["tenaz", "run"]).is_err());
        }

        #[test]
        fn test_validate_files() {
            let cli = Cli::try_parse_from(["tenaz", "validate", "a.yaml", "b.yaml"]).unwrap();
            let Commands::Validate(args) = cli.command else {
                panic!("expected validate");
            };
            assert_eq!(args.files.len(), 2);
        }

        #[test]
        fn test_global_flags_after_subcommand() {
            let cli = Cli::try_parse_from(["tenaz", "validate", "a.yaml", "-q"]).unwrap();
            assert!(cli.quiet);
        }
    }

    mod conversion_tests {
        use super::*;
        use crate::config::ColorChoice;
        use crate::output::OutputFormat;

        #[test]
        fn test_color_arg_conversion() {
            assert_eq!(ColorChoice::from(ColorArg::Always), ColorChoice::Always);
            assert_eq!(ColorChoice::from(ColorArg::Never), ColorChoice::Never);
            assert_eq!(ColorChoice::from(ColorArg::Auto), ColorChoice::Auto);
        }

        #[test]
        fn test_report_format_conversion() {
            assert_eq!(OutputFormat::from(ReportFormatArg::Json), OutputFormat::Json);
            assert_eq!(OutputFormat::from(ReportFormatArg::Text), OutputFormat::Text);
        }
    }
}
