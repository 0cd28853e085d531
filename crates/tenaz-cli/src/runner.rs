//! `run` and `validate` command handlers

use std::path::{Path, PathBuf};
use std::time::Instant;

use tenaz::{EngineConfig, Scenario, ScenarioReport};

use crate::commands::{RunArgs, ValidateArgs};
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, ProgressReporter};

/// Engine configuration: file, then environment, then flags
pub fn engine_config(args: &RunArgs) -> CliResult<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides();

    if let Some(url) = &args.base_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(dir) = &args.artifacts {
        config = config.with_artifacts_dir(dir.clone());
    }
    if args.headed {
        config = config.with_headless(false);
    }
    config.validate()?;
    Ok(config)
}

/// Parse every scenario in `files`, in file then document order
pub fn load_scenarios(files: &[PathBuf]) -> CliResult<Vec<Scenario>> {
    let mut scenarios = Vec::new();
    for path in files {
        scenarios.extend(load_file(path)?);
    }
    Ok(scenarios)
}

fn load_file(path: &Path) -> CliResult<Vec<Scenario>> {
    let scenarios = Scenario::load(path).map_err(|e| match e {
        tenaz::TenazError::Io(io) => {
            CliError::invalid_argument(format!("cannot read {}: {io}", path.display()))
        }
        other => other.into(),
    })?;
    if scenarios.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "{} contains no scenarios",
            path.display()
        )));
    }
    Ok(scenarios)
}

/// Check scenario files; returns true when every file is valid
pub fn validate(args: &ValidateArgs, reporter: &ProgressReporter) -> bool {
    let mut all_valid = true;
    for path in &args.files {
        match load_file(path) {
            Ok(scenarios) => {
                let names: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
                reporter.success(&format!("{}: {}", path.display(), names.join(", ")));
            }
            Err(e) => {
                all_valid = false;
                reporter.failure(&format!("{}: {e}", path.display()));
            }
        }
    }
    all_valid
}

/// Run scenarios; returns true when every scenario passed
pub fn run(args: &RunArgs, reporter: &mut ProgressReporter) -> CliResult<bool> {
    if args.jobs == 0 {
        return Err(CliError::invalid_argument("--jobs must be at least 1"));
    }
    let config = engine_config(args)?;
    let scenarios = load_scenarios(&args.files)?;
    tracing::info!(
        scenarios = scenarios.len(),
        jobs = args.jobs,
        base_url = %config.base_url,
        "starting run"
    );

    let started = Instant::now();
    reporter.start_spinner(&format!("running {} scenario(s)", scenarios.len()));
    let reports = execute(config, &scenarios, args.jobs);
    reporter.finish();
    let reports = reports?;

    match OutputFormat::from(args.format) {
        OutputFormat::Text => reports.iter().for_each(|r| reporter.report(r)),
        OutputFormat::Json => reporter.json(&reports_json(&reports)?),
    }
    write_reports(args, &reports)?;
    reporter.summary(&reports, started.elapsed());

    Ok(reports.iter().all(|r| r.outcome.is_pass()))
}

#[cfg(feature = "browser")]
fn execute(config: EngineConfig, scenarios: &[Scenario], jobs: usize) -> CliResult<Vec<ScenarioReport>> {
    use tenaz::driver::ChromiumProvider;
    use tenaz::ScenarioRunner;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let runner = ScenarioRunner::new(ChromiumProvider::from_config(&config), config);
    Ok(runtime.block_on(runner.run_all(scenarios, jobs)))
}

#[cfg(not(feature = "browser"))]
fn execute(_config: EngineConfig, _scenarios: &[Scenario], _jobs: usize) -> CliResult<Vec<ScenarioReport>> {
    Err(CliError::config(
        "browser support is not compiled in; rebuild tenaz-cli with the `browser` feature",
    ))
}

fn reports_json(reports: &[ScenarioReport]) -> CliResult<String> {
    serde_json::to_string_pretty(reports).map_err(|e| CliError::report_generation(e.to_string()))
}

fn write_reports(args: &RunArgs, reports: &[ScenarioReport]) -> CliResult<()> {
    if let Some(path) = &args.json_report {
        write_file(path, &reports_json(reports)?)?;
    }
    if let Some(path) = &args.junit {
        write_file(path, &tenaz::render_junit(reports))?;
    }
    Ok(())
}

fn write_file(path: &Path, content: &str) -> CliResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
        .map_err(|e| CliError::report_generation(format!("{}: {e}", path.display())))
}
