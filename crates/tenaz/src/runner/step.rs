//! Single-step execution: locate, act, assert.

use std::path::PathBuf;
use std::time::Duration;

use super::StepEnv;
use crate::action::ActionError;
use crate::assertion::{AssertionResult, Condition};
use crate::driver::{DriverError, DriverErrorKind, VerifyDriver};
use crate::locator::{StrategyKind, TargetDescriptor};
use crate::reporter::StepResult;
use crate::resolver::{LocatorAttempt, ResolutionError, ResolvedElement};
use crate::result::StepError;
use crate::scenario::{resolve_url, ActStep, NavigateStep, Step, StepKind, WaitStep};
use crate::wait::WaitPolicy;

/// What a passing step observed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSuccess {
    /// Strategy that located the element
    pub strategy: Option<StrategyKind>,
    /// Click was forced
    pub forced: bool,
    /// Observed value
    pub actual: Option<String>,
    /// Locator attempts
    pub attempts: Vec<LocatorAttempt>,
    /// Screenshot written by the step
    pub artifact: Option<PathBuf>,
}

impl StepSuccess {
    pub(super) fn into_result(
        self,
        index: usize,
        label: String,
        elapsed: Duration,
        soft: bool,
    ) -> StepResult {
        let mut result = StepResult::passed(index, label, elapsed).with_soft(soft);
        result.strategy = self.strategy;
        result.forced = self.forced;
        result.actual = self.actual;
        result.artifact = self.artifact;
        result.attempts = self.attempts;
        result
    }

    fn located(element: &ResolvedElement) -> Self {
        Self {
            strategy: Some(element.strategy),
            attempts: element.attempts.clone(),
            ..Self::default()
        }
    }
}

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Classified failure
    pub error: StepError,
    /// Locator attempts behind the failure
    pub attempts: Vec<LocatorAttempt>,
    /// Strategy of an element that was located before the failure
    pub strategy: Option<StrategyKind>,
    /// Observed value
    pub actual: Option<String>,
}

impl StepFailure {
    fn new(error: StepError) -> Self {
        Self {
            error,
            attempts: Vec::new(),
            strategy: None,
            actual: None,
        }
    }

    pub(super) fn to_result(
        &self,
        index: usize,
        label: String,
        elapsed: Duration,
        soft: bool,
    ) -> StepResult {
        let mut result = StepResult::failed(index, label, elapsed, &self.error).with_soft(soft);
        result.strategy = self.strategy;
        result.actual.clone_from(&self.actual);
        result.attempts.clone_from(&self.attempts);
        result
    }
}

impl From<ResolutionError> for StepFailure {
    fn from(error: ResolutionError) -> Self {
        let attempts = error.attempts().to_vec();
        Self {
            attempts,
            ..Self::new(error.into())
        }
    }
}

impl From<AssertionResult> for StepFailure {
    fn from(result: AssertionResult) -> Self {
        let error = result
            .error
            .unwrap_or_else(|| StepError::assertion(result.description.clone()));
        Self {
            error,
            attempts: result.attempts,
            strategy: result.strategy,
            actual: result.actual,
        }
    }
}

type StepOutput = Result<StepSuccess, StepFailure>;

pub(super) async fn execute<D: VerifyDriver + ?Sized>(env: &StepEnv<'_, D>, step: &Step) -> StepOutput {
    let mut success = match &step.kind {
        StepKind::Navigate(nav) => navigate(env, nav).await?,
        StepKind::Act(act) => act_on(env, act).await?,
        StepKind::Assert(condition) => assert(env, condition).await?,
        StepKind::Wait(wait) => wait_for(env, wait).await?,
    };
    if let Some(condition) = &step.expect {
        let checked = assert(env, condition).await?;
        if success.actual.is_none() {
            success.actual = checked.actual;
        }
    }
    Ok(success)
}

async fn navigate<D: VerifyDriver + ?Sized>(env: &StepEnv<'_, D>, nav: &NavigateStep) -> StepOutput {
    let url = resolve_url(env.base_url, &nav.url)
        .map_err(|e| StepFailure::new(StepError::DriverError(DriverError::navigation(e.to_string()))))?;
    env.driver.navigate(&url).await.map_err(driver_failure)?;

    if let Some(state) = nav.wait_until {
        let bound = env.config.data().timeout;
        env.driver
            .wait_for_load_state(state, bound)
            .await
            .map_err(driver_failure)?;
    }

    match &nav.ready {
        Some(target) => wait_for_element(env, target, &env.config.structural()).await,
        None => Ok(StepSuccess::default()),
    }
}

async fn act_on<D: VerifyDriver + ?Sized>(env: &StepEnv<'_, D>, act: &ActStep) -> StepOutput {
    let element = match &act.target {
        Some(target) => Some(env.resolver.resolve(env.driver, target).await?),
        None => None,
    };
    let outcome = env
        .executor
        .act(env.driver, element.as_ref(), &act.action, &env.actions)
        .await
        .map_err(|error| {
            let mut failure = StepFailure::new(action_failure(error));
            if let Some(element) = &element {
                failure.strategy = Some(element.strategy);
                failure.attempts.clone_from(&element.attempts);
            }
            failure
        })?;

    let mut success = element.as_ref().map(StepSuccess::located).unwrap_or_default();
    success.forced = outcome.forced;
    success.artifact = outcome.artifact;
    Ok(success)
}

async fn assert<D: VerifyDriver + ?Sized>(env: &StepEnv<'_, D>, condition: &Condition) -> StepOutput {
    let result = env.assertions.assert_condition(env.driver, condition).await;
    if result.passed {
        Ok(StepSuccess {
            strategy: result.strategy,
            actual: result.actual,
            attempts: result.attempts,
            ..StepSuccess::default()
        })
    } else {
        Err(result.into())
    }
}

async fn wait_for<D: VerifyDriver + ?Sized>(env: &StepEnv<'_, D>, wait: &WaitStep) -> StepOutput {
    match wait {
        WaitStep::LoadState(state) => {
            env.driver
                .wait_for_load_state(*state, env.config.data().timeout)
                .await
                .map_err(driver_failure)?;
        }
        WaitStep::Element(element) => {
            let mut policy = env.config.policy(element.class);
            if let Some(ms) = element.timeout_ms {
                policy = policy.with_timeout(Duration::from_millis(ms));
            }
            return wait_for_element(env, &element.target, &policy).await;
        }
        WaitStep::Selector(selector) => {
            env.driver
                .wait_for_selector(selector, env.config.structural().timeout)
                .await
                .map_err(driver_failure)?;
        }
        WaitStep::SettleMs(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
    }
    Ok(StepSuccess::default())
}

/// Explicit waits report a target that never showed up as a timeout
async fn wait_for_element<D: VerifyDriver + ?Sized>(
    env: &StepEnv<'_, D>,
    target: &TargetDescriptor,
    policy: &WaitPolicy,
) -> StepOutput {
    match env.resolver.resolve_with(env.driver, target, policy).await {
        Ok((element, _)) => Ok(StepSuccess::located(&element)),
        Err((error @ ResolutionError::NotFound { .. }, stats)) => {
            let attempts = error.attempts().to_vec();
            Err(StepFailure {
                attempts,
                ..StepFailure::new(StepError::timeout(format!(
                    "{target} not ready after {}ms ({} attempts)",
                    stats.elapsed.as_millis(),
                    stats.attempts
                )))
            })
        }
        Err((error, _)) => Err(error.into()),
    }
}

fn driver_failure(error: DriverError) -> StepFailure {
    let step_error = if error.is_fatal() {
        StepError::DriverError(error)
    } else if error.kind == DriverErrorKind::Timeout {
        StepError::timeout(error.message)
    } else {
        StepError::ActionError {
            message: error.to_string(),
        }
    };
    StepFailure::new(step_error)
}

fn action_failure(error: ActionError) -> StepError {
    match error.fatal_driver_error() {
        Some(fatal) => StepError::DriverError(fatal.clone()),
        None => StepError::ActionError {
            message: error.to_string(),
        },
    }
}
