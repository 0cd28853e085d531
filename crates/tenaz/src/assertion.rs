//! Assertions for verification steps.
//!
//! An assertion never aborts anything by itself: it returns an
//! [`AssertionResult`] and the runner decides what a failure means for the
//! scenario. Conditions are re-evaluated until they pass or the policy times
//! out, since the DOM is eventually consistent.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::driver::VerifyDriver;
use crate::locator::{Pattern, StrategyKind, TargetDescriptor, TextMatch};
use crate::resolver::{LocatorAttempt, LocatorResolver};
use crate::result::{StepError, TenazResult};
use crate::wait::{retry_until, PollOutcome, WaitPolicy};

/// Expected rendered text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedText {
    /// Whole text, exact
    Equals(String),
    /// Case-insensitive substring
    Contains(String),
    /// Regular expression
    Matches(Pattern),
    /// One label of a closed vocabulary, e.g. `Low Risk` / `High Risk`
    OneOf {
        /// Acceptable labels
        labels: Vec<String>,
        /// Text following the label
        #[serde(default)]
        suffix: String,
    },
}

impl ExpectedText {
    /// Matcher for this expectation
    pub fn matcher(&self) -> TenazResult<TextMatch> {
        match self {
            Self::Equals(text) => Ok(TextMatch::exact(text.clone())),
            Self::Contains(text) => Ok(TextMatch::contains(text.clone())),
            Self::Matches(pattern) => Ok(TextMatch::Pattern(pattern.clone())),
            Self::OneOf { labels, suffix } => TextMatch::one_of(labels, suffix),
        }
    }
}

impl fmt::Display for ExpectedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(text) => write!(f, "equals {text:?}"),
            Self::Contains(text) => write!(f, "contains {text:?}"),
            Self::Matches(pattern) => write!(f, "matches /{}/", pattern.as_str()),
            Self::OneOf { labels, suffix } => {
                write!(f, "one of [{}]", labels.join(", "))?;
                if !suffix.is_empty() {
                    write!(f, " + {suffix:?}")?;
                }
                Ok(())
            }
        }
    }
}

/// Expected DOM condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Target exists and its text meets the expectation
    Text {
        /// Element to read
        target: TargetDescriptor,
        /// Expected text
        expect: ExpectedText,
    },
    /// Attribute value contains a substring (e.g. a utility class)
    Attribute {
        /// Element to read
        target: TargetDescriptor,
        /// Attribute name
        name: String,
        /// Required substring
        contains: String,
    },
    /// At least `min` usable elements match
    CountAtLeast {
        /// Elements to count
        target: TargetDescriptor,
        /// Lower bound
        min: usize,
    },
    /// Target resolves to a visible element
    Visible {
        /// Element to check
        target: TargetDescriptor,
    },
}

impl Condition {
    /// Target descriptor of the condition
    #[must_use]
    pub const fn target(&self) -> &TargetDescriptor {
        match self {
            Self::Text { target, .. }
            | Self::Attribute { target, .. }
            | Self::CountAtLeast { target, .. }
            | Self::Visible { target } => target,
        }
    }

    /// Human-readable description
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Text { target, expect } => format!("text of {target} {expect}"),
            Self::Attribute {
                target,
                name,
                contains,
            } => format!("{name} of {target} contains {contains:?}"),
            Self::CountAtLeast { target, min } => format!("at least {min} of {target}"),
            Self::Visible { target } => format!("{target} is visible"),
        }
    }
}

/// Result of evaluating a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    /// Whether the condition held
    pub passed: bool,
    /// Condition description
    pub description: String,
    /// Observed value (text, attribute value or count)
    pub actual: Option<String>,
    /// Strategy that located the element
    pub strategy: Option<StrategyKind>,
    /// Locator attempts of the last evaluation
    pub attempts: Vec<LocatorAttempt>,
    /// Failure classification when `passed` is false
    pub error: Option<StepError>,
}

impl AssertionResult {
    fn pass(description: String, actual: Option<String>, strategy: Option<StrategyKind>) -> Self {
        Self {
            passed: true,
            description,
            actual,
            strategy,
            attempts: Vec::new(),
            error: None,
        }
    }

    fn fail(description: String, error: StepError) -> Self {
        Self {
            passed: false,
            description,
            actual: None,
            strategy: None,
            attempts: Vec::new(),
            error: Some(error),
        }
    }

    #[must_use]
    fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    #[must_use]
    fn with_attempts(mut self, attempts: Vec<LocatorAttempt>) -> Self {
        self.attempts = attempts;
        self
    }

    /// Still worth re-evaluating: the DOM may not have caught up yet
    fn is_retryable(&self) -> bool {
        matches!(
            self.error,
            Some(StepError::AssertionFailure { .. } | StepError::NotFound { .. })
        )
    }
}

/// Evaluates conditions under a wait policy
#[derive(Debug, Clone, Copy, Default)]
pub struct AssertionEngine {
    policy: WaitPolicy,
}

impl AssertionEngine {
    /// Engine re-evaluating under `policy`
    #[must_use]
    pub const fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    /// Evaluate `condition` until it passes or the policy times out.
    ///
    /// Ambiguity and fatal driver errors are returned without retrying.
    pub async fn assert_condition<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        condition: &Condition,
    ) -> AssertionResult {
        let outcome = retry_until(&self.policy, move || async move {
            let result = self.evaluate_once(driver, condition).await;
            if result.passed {
                PollOutcome::Ready(result)
            } else if result.is_retryable() {
                PollOutcome::Retry(result)
            } else {
                PollOutcome::Abort(result)
            }
        })
        .await;
        match outcome {
            Ok((result, _)) => result,
            Err(wait) => {
                let result = wait.into_inner();
                tracing::debug!(condition = %result.description, actual = ?result.actual, "assertion failed");
                result
            }
        }
    }

    /// Evaluate `condition` once against the current DOM
    pub async fn evaluate_once<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        condition: &Condition,
    ) -> AssertionResult {
        let description = condition.describe();
        let resolver = LocatorResolver::new(self.policy);

        if let Condition::CountAtLeast { target, min } = condition {
            return match resolver.count_once(driver, target).await {
                Ok((count, strategy, attempts)) if count >= *min => {
                    AssertionResult::pass(description, Some(count.to_string()), strategy)
                        .with_attempts(attempts)
                }
                Ok((count, _, attempts)) => AssertionResult::fail(
                    description,
                    StepError::assertion(format!("expected at least {min}, found {count}")),
                )
                .with_actual(count.to_string())
                .with_attempts(attempts),
                Err(e) => {
                    let attempts = e.attempts().to_vec();
                    AssertionResult::fail(description, e.into()).with_attempts(attempts)
                }
            };
        }

        let element = match resolver.resolve_once(driver, condition.target()).await {
            Ok(element) => element,
            Err(e) => {
                let attempts = e.attempts().to_vec();
                return AssertionResult::fail(description, e.into()).with_attempts(attempts);
            }
        };
        let strategy = Some(element.strategy);
        let attempts = element.attempts.clone();

        let checked = match condition {
            Condition::Text { expect, .. } => match expect.matcher() {
                Ok(matcher) => match driver.get_text(&element.handle).await {
                    Ok(text) if matcher.matches(&text) => {
                        AssertionResult::pass(description, Some(text), strategy)
                    }
                    Ok(text) => AssertionResult::fail(
                        description,
                        StepError::assertion(format!("text {text:?} does not satisfy {expect}")),
                    )
                    .with_actual(text),
                    Err(e) => driver_failure(description, e),
                },
                Err(e) => AssertionResult::fail(description, StepError::assertion(e.to_string())),
            },
            Condition::Attribute { name, contains, .. } => {
                match driver.get_attribute(&element.handle, name).await {
                    Ok(Some(value)) if value.contains(contains.as_str()) => {
                        AssertionResult::pass(description, Some(value), strategy)
                    }
                    Ok(Some(value)) => AssertionResult::fail(
                        description,
                        StepError::assertion(format!(
                            "{name}={value:?} does not contain {contains:?}"
                        )),
                    )
                    .with_actual(value),
                    Ok(None) => AssertionResult::fail(
                        description,
                        StepError::assertion(format!("attribute {name} is absent")),
                    ),
                    Err(e) => driver_failure(description, e),
                }
            }
            Condition::Visible { .. } => match driver.is_visible(&element.handle).await {
                Ok(true) => AssertionResult::pass(description, Some("visible".into()), strategy),
                Ok(false) => AssertionResult::fail(
                    description,
                    StepError::assertion("element is attached but not visible"),
                )
                .with_actual("hidden"),
                Err(e) => driver_failure(description, e),
            },
            Condition::CountAtLeast { .. } => {
                AssertionResult::pass(description, None, strategy)
            }
        };
        checked.with_attempts(attempts)
    }
}

fn driver_failure(description: String, error: crate::driver::DriverError) -> AssertionResult {
    let step_error = if error.is_fatal() {
        StepError::DriverError(error)
    } else {
        // element went away between resolution and read; the next poll re-resolves
        StepError::assertion(error.to_string())
    };
    AssertionResult::fail(description, step_error)
}
