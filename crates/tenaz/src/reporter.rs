//! Scenario reports
//!
//! A [`ScenarioReport`] is built by the runner for every scenario, whatever
//! happened. It serialises to JSON for CI, renders as JUnit XML, and renders
//! as a plain-text console summary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::diagnostics::DiagnosticArtifact;
use crate::locator::StrategyKind;
use crate::resolver::LocatorAttempt;
use crate::result::{FailureKind, StepError, TenazResult};

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Step passed
    Pass,
    /// Step failed
    Fail,
    /// Step never ran
    Skipped,
}

impl StepOutcome {
    /// Label used in console output
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skipped => "SKIP",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate outcome of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// Every step passed
    Pass,
    /// A required step failed or the run was aborted
    Fail,
    /// Only soft steps failed
    PartialFail,
}

impl ScenarioOutcome {
    /// Label used in console output
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::PartialFail => "PARTIAL",
        }
    }

    /// True only for `Pass`
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Zero-based position in the scenario
    pub index: usize,
    /// Step label
    pub label: String,
    /// Outcome
    pub outcome: StepOutcome,
    /// Soft step
    pub soft: bool,
    /// Time spent, milliseconds
    pub elapsed_ms: u64,
    /// Strategy of the element the step acted on or asserted against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
    /// Click was forced
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forced: bool,
    /// Observed value for assertions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Failure classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Locator attempts behind the outcome
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<LocatorAttempt>,
    /// Screenshot written by a checkpoint action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// Evidence captured on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticArtifact>,
}

impl StepResult {
    /// Passing step
    #[must_use]
    pub fn passed(index: usize, label: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            index,
            label: label.into(),
            outcome: StepOutcome::Pass,
            soft: false,
            elapsed_ms: millis(elapsed),
            strategy: None,
            forced: false,
            actual: None,
            failure: None,
            error: None,
            attempts: Vec::new(),
            artifact: None,
            diagnostics: None,
        }
    }

    /// Failing step
    #[must_use]
    pub fn failed(
        index: usize,
        label: impl Into<String>,
        elapsed: Duration,
        error: &StepError,
    ) -> Self {
        Self {
            outcome: StepOutcome::Fail,
            failure: Some(error.kind()),
            error: Some(error.to_string()),
            ..Self::passed(index, label, elapsed)
        }
    }

    /// Step that never ran
    #[must_use]
    pub fn skipped(index: usize, label: impl Into<String>) -> Self {
        Self {
            outcome: StepOutcome::Skipped,
            ..Self::passed(index, label, Duration::ZERO)
        }
    }

    /// Mark as soft
    #[must_use]
    pub const fn with_soft(mut self, soft: bool) -> Self {
        self.soft = soft;
        self
    }

    /// Elapsed time
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Outcome is `Fail`
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.outcome, StepOutcome::Fail)
    }
}

/// Report for one scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Run id
    pub id: Uuid,
    /// Scenario name
    pub name: String,
    /// Aggregate outcome
    pub outcome: ScenarioOutcome,
    /// Start time, RFC 3339
    pub started_at: String,
    /// Wall time, milliseconds
    pub elapsed_ms: u64,
    /// One result per step, in order
    pub steps: Vec<StepResult>,
    /// Why the run stopped early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl ScenarioReport {
    /// Assemble a report and derive its outcome
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        started_at: String,
        elapsed: Duration,
        steps: Vec<StepResult>,
        abort_reason: Option<String>,
    ) -> Self {
        let outcome = Self::derive_outcome(&steps, abort_reason.is_some());
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            outcome,
            started_at,
            elapsed_ms: millis(elapsed),
            steps,
            abort_reason,
        }
    }

    /// `Fail` if a required step failed or the run aborted, `PartialFail` if
    /// only soft steps failed, else `Pass`
    #[must_use]
    pub fn derive_outcome(steps: &[StepResult], aborted: bool) -> ScenarioOutcome {
        let mut soft_failure = false;
        for step in steps.iter().filter(|s| s.is_failed()) {
            if !step.soft {
                return ScenarioOutcome::Fail;
            }
            soft_failure = true;
        }
        if aborted {
            ScenarioOutcome::Fail
        } else if soft_failure {
            ScenarioOutcome::PartialFail
        } else {
            ScenarioOutcome::Pass
        }
    }

    /// Wall time
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Failed steps
    #[must_use]
    pub fn failing_steps(&self) -> Vec<&StepResult> {
        self.steps.iter().filter(|s| s.is_failed()).collect()
    }

    /// Count steps with `outcome`
    #[must_use]
    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} {}: {} passed, {} failed, {} skipped ({:.2}s)",
            self.outcome,
            self.name,
            self.count(StepOutcome::Pass),
            self.count(StepOutcome::Fail),
            self.count(StepOutcome::Skipped),
            self.elapsed().as_secs_f64()
        )
    }

    /// Console summary: one line per step, evidence under failures
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.summary());
        for step in &self.steps {
            let strategy = step
                .strategy
                .map(|s| format!(" via {s}"))
                .unwrap_or_default();
            let forced = if step.forced { " (forced)" } else { "" };
            let soft = if step.soft && step.is_failed() {
                " (soft)"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "  [{}] {:>2} {}{strategy}{forced}{soft} {}ms",
                step.outcome, step.index, step.label, step.elapsed_ms
            );
            if let Some(error) = &step.error {
                let _ = writeln!(out, "         {error}");
            }
            if let Some(actual) = &step.actual {
                if step.is_failed() {
                    let _ = writeln!(out, "         actual: {actual:?}");
                }
            }
            if step.is_failed() {
                for attempt in &step.attempts {
                    let _ = writeln!(out, "         tried {attempt}");
                }
            }
            if let Some(shot) = step.diagnostics.as_ref().and_then(|d| d.screenshot.as_ref()) {
                let _ = writeln!(out, "         screenshot: {}", shot.display());
            }
        }
        if let Some(reason) = &self.abort_reason {
            let _ = writeln!(out, "  aborted: {reason}");
        }
        out
    }

    /// Pretty JSON
    pub fn to_json(&self) -> TenazResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JUnit XML with one testcase per step
    #[must_use]
    pub fn render_junit(&self) -> String {
        render_junit(std::slice::from_ref(self))
    }

    /// Write pretty JSON to `path`
    pub fn write_json(&self, path: &Path) -> TenazResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Write JUnit XML to `path`
    pub fn write_junit(&self, path: &Path) -> TenazResult<()> {
        std::fs::write(path, self.render_junit())?;
        Ok(())
    }
}

/// JUnit XML for several reports, one testsuite each
#[must_use]
pub fn render_junit(reports: &[ScenarioReport]) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    let tests: usize = reports.iter().map(|r| r.steps.len()).sum();
    let failures: usize = reports.iter().map(|r| r.count(StepOutcome::Fail)).sum();
    let _ = writeln!(
        xml,
        r#"<testsuites name="tenaz" tests="{tests}" failures="{failures}">"#
    );

    for report in reports {
        let _ = writeln!(
            xml,
            r#"  <testsuite name="{}" tests="{}" failures="{}" skipped="{}" time="{:.3}" timestamp="{}">"#,
            escape_xml(&report.name),
            report.steps.len(),
            report.count(StepOutcome::Fail),
            report.count(StepOutcome::Skipped),
            report.elapsed().as_secs_f64(),
            escape_xml(&report.started_at)
        );
        for step in &report.steps {
            let _ = writeln!(
                xml,
                r#"    <testcase name="{:02} {}" classname="{}" time="{:.3}">"#,
                step.index,
                escape_xml(&step.label),
                escape_xml(&report.name),
                step.elapsed().as_secs_f64()
            );
            match step.outcome {
                StepOutcome::Fail => {
                    let message = step.error.as_deref().unwrap_or("failed");
                    let kind = step.failure.map_or("Failure", |k| k.as_str());
                    let mut body = message.to_string();
                    for attempt in &step.attempts {
                        let _ = write!(body, "\ntried {attempt}");
                    }
                    let _ = writeln!(
                        xml,
                        r#"      <failure type="{kind}" message="{}">{}</failure>"#,
                        escape_xml(message),
                        escape_xml(&body)
                    );
                }
                StepOutcome::Skipped => xml.push_str("      <skipped/>\n"),
                StepOutcome::Pass => {}
            }
            if let Some(shot) = step.diagnostics.as_ref().and_then(|d| d.screenshot.as_ref()) {
                let _ = writeln!(
                    xml,
                    "      <system-out>[[ATTACHMENT|{}]]</system-out>",
                    escape_xml(&shot.display().to_string())
                );
            }
            xml.push_str("    </testcase>\n");
        }
        xml.push_str("  </testsuite>\n");
    }
    xml.push_str("</testsuites>\n");
    xml
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn report(steps: Vec<StepResult>, abort: Option<&str>) -> ScenarioReport {
        ScenarioReport::new(
            "drawer <layout>",
            "2026-01-01T00:00:00+00:00".into(),
            Duration::from_millis(1500),
            steps,
            abort.map(String::from),
        )
    }

    mod outcome_tests {
        use super::*;

        #[test]
        fn test_all_pass() {
            let r = report(vec![StepResult::passed(0, "a", Duration::ZERO)], None);
            assert_eq!(r.outcome, ScenarioOutcome::Pass);
            assert!(r.outcome.is_pass());
        }

        #[test]
        fn test_soft_failure_is_partial() {
            let err = StepError::assertion("Unknown");
            let r = report(
                vec![
                    StepResult::passed(0, "a", Duration::ZERO),
                    StepResult::failed(1, "risk", Duration::ZERO, &err).with_soft(true),
                ],
                None,
            );
            assert_eq!(r.outcome, ScenarioOutcome::PartialFail);
            assert_eq!(r.failing_steps().len(), 1);
        }

        #[test]
        fn test_required_failure_is_fail() {
            let err = StepError::NotFound {
                message: "x".into(),
            };
            let r = report(
                vec![
                    StepResult::failed(0, "a", Duration::ZERO, &err).with_soft(true),
                    StepResult::failed(1, "b", Duration::ZERO, &err),
                    StepResult::skipped(2, "c"),
                ],
                None,
            );
            assert_eq!(r.outcome, ScenarioOutcome::Fail);
        }

        #[test]
        fn test_abort_is_fail() {
            let r = report(vec![StepResult::skipped(0, "a")], Some("launch failed"));
            assert_eq!(r.outcome, ScenarioOutcome::Fail);
        }
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_render_text_lists_steps() {
            let err = StepError::timeout("scenario exceeded 1000ms");
            let r = report(
                vec![
                    StepResult::passed(0, "navigate /", Duration::from_millis(12)),
                    StepResult::failed(1, "load more", Duration::ZERO, &err),
                    StepResult::skipped(2, "assert rows"),
                ],
                None,
            );
            let text = r.render_text();
            assert!(text.starts_with("FAIL drawer <layout>: 1 passed, 1 failed, 1 skipped"));
            assert!(text.contains("[PASS]  0 navigate / 12ms"));
            assert!(text.contains("timed out: scenario exceeded 1000ms"));
            assert!(text.contains("[SKIP]  2 assert rows"));
        }

        #[test]
        fn test_render_junit_escapes() {
            let err = StepError::assertion("expected \"Low\" & got <none>");
            let r = report(
                vec![
                    StepResult::failed(0, "risk", Duration::ZERO, &err),
                    StepResult::skipped(1, "after"),
                ],
                None,
            );
            let xml = r.render_junit();
            assert!(xml.contains(r#"<testsuite name="drawer &lt;layout&gt;" tests="2" failures="1" skipped="1""#));
            assert!(xml.contains(r#"type="AssertionFailure""#));
            assert!(xml.contains("&quot;Low&quot; &amp; got &lt;none&gt;"));
            assert!(xml.contains("<skipped/>"));
        }

        #[test]
        fn test_json_and_files() {
            let dir = tempfile::tempdir().unwrap();
            let r = report(vec![StepResult::passed(0, "a", Duration::from_millis(3))], None);
            let json_path = dir.path().join("report.json");
            r.write_json(&json_path).unwrap();
            let parsed: ScenarioReport =
                serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
            assert_eq!(parsed, r);

            let junit_path = dir.path().join("junit.xml");
            r.write_junit(&junit_path).unwrap();
            assert!(std::fs::read_to_string(junit_path)
                .unwrap()
                .starts_with("<?xml"));
        }

        #[test]
        fn test_outcome_serializes_snake_case() {
            let json = serde_json::to_string(&ScenarioOutcome::PartialFail).unwrap();
            assert_eq!(json, "\"partial_fail\"");
        }
    }
}
