//! Tenaz CLI: run declarative UI verification scenarios
//!
//! ## Usage
//!
//! ```bash
//! tenaz validate scenarios/*.yaml            # Parse and check, no browser
//! tenaz run scenarios/drawer.yaml            # Run against a live browser
//! tenaz run s/*.yaml --jobs 4 --junit out.xml
//! ```

use clap::Parser;
use std::process::ExitCode;
use tenaz_cli::{
    logging, runner, Cli, CliConfig, CliResult, ColorChoice, Commands, ProgressReporter, Verbosity,
};

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<bool> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    let use_color = config.color.should_color();
    logging::init(config.verbosity, config.log_format, use_color)?;

    let mut reporter = ProgressReporter::new(use_color, config.verbosity.is_quiet());
    match &cli.command {
        Commands::Run(args) => runner::run(args, &mut reporter),
        Commands::Validate(args) => Ok(runner::validate(args, &reporter)),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.verbose, cli.quiet))
        .with_color(ColorChoice::from(cli.color))
        .with_log_format(cli.log_format.into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tenaz_cli::LogFormat;

    #[test]
    fn test_build_config_from_flags() {
        let cli = Cli::try_parse_from([
            "tenaz",
            "-q",
            "--color",
            "never",
            "--log-format",
            "json",
            "validate",
            "a.yaml",
        ])
        .unwrap();
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Quiet);
        assert_eq!(config.color, ColorChoice::Never);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_build_config_verbose() {
        let cli = Cli::try_parse_from(["tenaz", "-v", "run", "a.yaml"]).unwrap();
        assert_eq!(build_config(&cli).verbosity, Verbosity::Verbose);
    }
}
