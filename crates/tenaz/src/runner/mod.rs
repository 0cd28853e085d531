//! Scenario Runner
//!
//! Executes a scenario's steps strictly in order against one driver acquired
//! for the run, and turns whatever happens into a [`ScenarioReport`].
//!
//! ```text
//! acquire ──► step 0 ──► step 1 ──► ... ──► release (exactly once)
//!               │ fail
//!               ├── diagnostics ── soft? ──► next step
//!               └── required or fatal ──► remaining steps Skipped
//! ```
//!
//! The whole step loop runs under the scenario timeout. Results are kept
//! outside the timed future so a timeout keeps everything recorded so far.

mod step;

use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

use crate::action::{ActionContext, ActionExecutor};
use crate::assertion::AssertionEngine;
use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticsCapture, FailureContext};
use crate::driver::{DriverProvider, VerifyDriver};
use crate::reporter::{ScenarioReport, StepResult};
use crate::resolver::LocatorResolver;
use crate::result::StepError;
use crate::scenario::{Scenario, Step};

pub use step::{StepFailure, StepSuccess};

/// Runs scenarios, one fresh driver per scenario
#[derive(Debug)]
pub struct ScenarioRunner<P: DriverProvider> {
    provider: P,
    config: EngineConfig,
}

/// Mutable state shared between the timed step loop and the timeout path
#[derive(Debug, Default)]
struct Progress {
    results: Vec<StepResult>,
    in_flight: Option<Instant>,
    /// Failed step whose diagnostics are still being captured
    capturing: Option<(StepResult, StepFailure)>,
}

/// Everything a step needs for one scenario run
struct StepEnv<'a, D: ?Sized> {
    driver: &'a D,
    base_url: &'a str,
    config: &'a EngineConfig,
    resolver: LocatorResolver,
    executor: ActionExecutor,
    assertions: AssertionEngine,
    actions: ActionContext,
}

impl<P: DriverProvider> ScenarioRunner<P> {
    /// Runner acquiring drivers from `provider`
    pub fn new(provider: P, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    /// Driver provider
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every scenario with at most `jobs` in flight; reports keep input order
    pub async fn run_all(&self, scenarios: &[Scenario], jobs: usize) -> Vec<ScenarioReport> {
        stream::iter(scenarios.iter().map(|scenario| self.run(scenario)))
            .buffered(jobs.max(1))
            .collect()
            .await
    }

    /// Run one scenario to completion. Never fails; every problem ends up in
    /// the report.
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let span = tracing::info_span!("scenario", name = %scenario.name);
        self.run_scenario(scenario).instrument(span).await
    }

    async fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        let started_at = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();
        tracing::info!(steps = scenario.steps.len(), "scenario started");

        if let Err(e) = scenario.validate() {
            tracing::error!(error = %e, "scenario rejected");
            return aborted_before_start(scenario, started_at, start, format!("{e}"));
        }

        let driver = match self.provider.acquire(&scenario.name).await {
            Ok(driver) => driver,
            Err(e) => {
                tracing::error!(error = %e, "driver acquisition failed");
                return aborted_before_start(
                    scenario,
                    started_at,
                    start,
                    format!("driver acquisition failed: {e}"),
                );
            }
        };

        let timeout = scenario
            .timeout_ms
            .map_or_else(|| self.config.scenario_timeout(), Duration::from_millis);
        let mut progress = Progress::default();
        let timed = tokio::time::timeout(
            timeout,
            self.execute_steps(&driver, scenario, &mut progress),
        )
        .await;

        let abort_reason = match timed {
            Ok(abort) => abort,
            Err(_) => {
                let error = StepError::timeout(format!(
                    "scenario exceeded {}ms",
                    timeout.as_millis()
                ));
                tracing::error!(timeout_ms = timeout.as_millis() as u64, "scenario timed out");
                self.record_timeout(&driver, scenario, &mut progress, &error)
                    .await;
                Some(error.to_string())
            }
        };

        let Progress { mut results, .. } = progress;
        for (index, step) in scenario.steps.iter().enumerate().skip(results.len()) {
            results.push(
                StepResult::skipped(index, step.display_label()).with_soft(step.continue_on_failure()),
            );
        }

        self.release(driver).await;

        let report = ScenarioReport::new(
            scenario.name.clone(),
            started_at,
            start.elapsed(),
            results,
            abort_reason,
        );
        tracing::info!(
            outcome = %report.outcome,
            elapsed_ms = report.elapsed_ms,
            "scenario finished"
        );
        report
    }

    /// Step loop. Returns the abort reason when the run stopped early.
    async fn execute_steps<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        scenario: &Scenario,
        progress: &mut Progress,
    ) -> Option<String> {
        let env = StepEnv {
            driver,
            base_url: scenario.base_url.as_deref().unwrap_or(&self.config.base_url),
            config: &self.config,
            resolver: LocatorResolver::new(self.config.structural()),
            executor: ActionExecutor::new(self.config.action_timeout()),
            assertions: AssertionEngine::new(self.config.structural()),
            actions: ActionContext::new(&self.config.artifacts_dir),
        };

        if let Some(viewport) = scenario.viewport {
            if let Err(e) = driver.set_viewport(viewport).await {
                tracing::error!(error = %e, "initial viewport failed");
                return Some(format!("initial viewport failed: {e}"));
            }
        }

        for (index, step) in scenario.steps.iter().enumerate() {
            let label = step.display_label();
            let soft = step.continue_on_failure();
            let started = Instant::now();
            progress.in_flight = Some(started);

            let executed = step::execute(&env, step)
                .instrument(tracing::info_span!("step", index, label = %label))
                .await;
            progress.in_flight = None;

            match executed {
                Ok(success) => {
                    tracing::debug!(index, label = %label, "step passed");
                    progress
                        .results
                        .push(success.into_result(index, label, started.elapsed(), soft));
                }
                Err(failure) => {
                    tracing::warn!(index, label = %label, error = %failure.error, soft, "step failed");
                    let fatal = failure.error.is_fatal();
                    let reason = format!("step {index} ({label}) failed: {}", failure.error);
                    let result = failure.to_result(index, label.clone(), started.elapsed(), soft);
                    let capturing = progress.capturing.insert((result, failure));

                    let artifact = self
                        .diagnostics()
                        .capture(
                            driver,
                            FailureContext {
                                scenario: &scenario.name,
                                step_index: index,
                                step_label: &label,
                                error: &capturing.1.error,
                                attempts: &capturing.1.attempts,
                            },
                        )
                        .await;
                    if let Some((mut result, _)) = progress.capturing.take() {
                        result.diagnostics = Some(artifact);
                        progress.results.push(result);
                    }

                    if fatal {
                        tracing::error!(index, "fatal driver error, aborting scenario");
                        return Some(reason);
                    }
                    if !soft {
                        return Some(reason);
                    }
                }
            }
        }
        None
    }

    /// Record the in-flight step as timed out and capture its diagnostics.
    /// A step that had already failed keeps its own error.
    async fn record_timeout<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        scenario: &Scenario,
        progress: &mut Progress,
        error: &StepError,
    ) {
        if let Some((mut result, failure)) = progress.capturing.take() {
            let artifact = self
                .diagnostics()
                .capture(
                    driver,
                    FailureContext {
                        scenario: &scenario.name,
                        step_index: result.index,
                        step_label: &result.label,
                        error: &failure.error,
                        attempts: &failure.attempts,
                    },
                )
                .await;
            result.diagnostics = Some(artifact);
            progress.results.push(result);
            return;
        }

        let index = progress.results.len();
        let Some(step) = scenario.steps.get(index) else {
            return;
        };
        let label = step.display_label();
        let elapsed = progress
            .in_flight
            .take()
            .map_or(Duration::ZERO, |started| started.elapsed());
        let mut result = StepResult::failed(index, label.clone(), elapsed, error)
            .with_soft(step.continue_on_failure());
        result.diagnostics = Some(
            self.diagnostics()
                .capture(
                    driver,
                    FailureContext {
                        scenario: &scenario.name,
                        step_index: index,
                        step_label: &label,
                        error,
                        attempts: &[],
                    },
                )
                .await,
        );
        progress.results.push(result);
    }

    /// Release within the configured bound; a stuck release is abandoned
    async fn release(&self, driver: P::Driver) {
        let bound = self.config.release_timeout();
        match tokio::time::timeout(bound, self.provider.release(driver)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "driver release failed"),
            Err(_) => tracing::warn!(
                timeout_ms = bound.as_millis() as u64,
                "driver release timed out, abandoning it"
            ),
        }
    }

    fn diagnostics(&self) -> DiagnosticsCapture {
        DiagnosticsCapture::new(&self.config.artifacts_dir)
            .with_timeout(self.config.diagnostics_timeout())
            .with_dom_excerpt_chars(self.config.dom_excerpt_chars)
    }
}

fn aborted_before_start(
    scenario: &Scenario,
    started_at: String,
    start: Instant,
    reason: String,
) -> ScenarioReport {
    let steps = scenario
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            StepResult::skipped(index, step.display_label()).with_soft(step.continue_on_failure())
        })
        .collect();
    ScenarioReport::new(
        scenario.name.clone(),
        started_at,
        start.elapsed(),
        steps,
        Some(reason),
    )
}

/// Labels of every step, for callers that print plans
#[must_use]
pub fn step_labels(scenario: &Scenario) -> Vec<String> {
    scenario.steps.iter().map(Step::display_label).collect()
}
