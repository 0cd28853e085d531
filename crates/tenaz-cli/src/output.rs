//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tenaz::{ScenarioOutcome, ScenarioReport, StepOutcome};

/// Console format for scenario reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON array of reports
    Json,
}

/// Progress and result reporter
///
/// Status lines go to stderr; reports go to stdout so JSON output can be piped.
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    out: Term,
    spinner: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            out: Term::stdout(),
            spinner: None,
            use_color,
            quiet,
        }
    }

    /// Show a spinner while scenarios run
    pub fn start_spinner(&mut self, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
    }

    /// Remove the spinner
    pub fn finish(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Failures print even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print one report in the chosen format
    pub fn report(&self, report: &ScenarioReport) {
        if self.quiet && report.outcome.is_pass() {
            return;
        }
        let text = report.render_text();
        let mut lines = text.lines();
        if let Some(first) = lines.next() {
            let _ = self.out.write_line(&self.paint(report.outcome, first));
        }
        for line in lines {
            let _ = self.out.write_line(line);
        }
    }

    /// Print reports as a pretty JSON array
    pub fn json(&self, rendered: &str) {
        let _ = self.out.write_line(rendered);
    }

    /// Print the run summary and the failing step indices per scenario
    pub fn summary(&self, reports: &[ScenarioReport], duration: Duration) {
        for line in failure_lines(reports) {
            self.failure(&line);
        }
        if self.quiet && reports.iter().all(|r| r.outcome.is_pass()) {
            return;
        }

        let passed = reports.iter().filter(|r| r.outcome.is_pass()).count();
        let partial = reports
            .iter()
            .filter(|r| r.outcome == ScenarioOutcome::PartialFail)
            .count();
        let failed = reports.len() - passed - partial;
        let duration_secs = duration.as_secs_f64();
        let status = if passed == reports.len() { "PASSED" } else { "FAILED" };

        let _ = self.term.write_line("");
        if self.use_color {
            let status_style = if passed == reports.len() {
                Style::new().green().bold()
            } else {
                Style::new().red().bold()
            };
            let _ = self.term.write_line(&format!(
                "{} {} scenarios in {:.2}s ({} passed, {} partial, {} failed)",
                status_style.apply_to(status),
                reports.len(),
                duration_secs,
                style(passed).green().bold(),
                style(partial).yellow(),
                style(failed).red().bold(),
            ));
        } else {
            let _ = self.term.write_line(&format!(
                "{status} {} scenarios in {duration_secs:.2}s ({passed} passed, {partial} partial, {failed} failed)",
                reports.len()
            ));
        }
    }

    fn paint(&self, outcome: ScenarioOutcome, line: &str) -> String {
        if !self.use_color {
            return line.to_string();
        }
        match outcome {
            ScenarioOutcome::Pass => style(line).green().bold().to_string(),
            ScenarioOutcome::PartialFail => style(line).yellow().bold().to_string(),
            ScenarioOutcome::Fail => style(line).red().bold().to_string(),
        }
    }
}

/// One line per non-passing scenario naming its failing step indices
#[must_use]
pub fn failure_lines(reports: &[ScenarioReport]) -> Vec<String> {
    reports
        .iter()
        .filter(|r| !r.outcome.is_pass())
        .map(|r| {
            let indices: Vec<String> = r
                .steps
                .iter()
                .filter(|s| s.outcome == StepOutcome::Fail)
                .map(|s| s.index.to_string())
                .collect();
            let mut line = format!("{} ({}): failing steps [{}]", r.name, r.outcome, indices.join(", "));
            if let Some(reason) = &r.abort_reason {
                line.push_str(&format!(", aborted: {reason}"));
            }
            line
        })
        .collect()
}
