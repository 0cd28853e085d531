//! Locator Resolver
//!
//! Turns a [`TargetDescriptor`] into exactly one element handle, or a typed
//! error that carries the full attempt trace.
//!
//! Per candidate, in order:
//!
//! 1. query the DOM with the candidate's strategy (inside the resolved scope,
//!    if any)
//! 2. zero matches: record `NoMatch`, try the next candidate
//! 3. drop invisible elements when visibility is required; if nothing
//!    survives record `Hidden` and continue
//! 4. apply the index constraint, or require exactly one survivor
//! 5. several survivors without an index: record `Ambiguous` and continue;
//!    if no later candidate is unique, the first ambiguity is the result
//!
//! Non-fatal driver errors (e.g. an unsupported selector) are recorded and
//! the next candidate is tried. Fatal errors stop resolution immediately.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::driver::{DriverError, ElementQuery, ElementRef, VerifyDriver};
use crate::locator::{CandidateLocator, StrategyKind, TargetDescriptor};
use crate::wait::{retry_until, PollOutcome, WaitPolicy, WaitStats};

/// Result of trying one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Query returned nothing
    NoMatch,
    /// Elements matched but none were visible
    Hidden {
        /// Raw match count
        matched: usize,
    },
    /// Several usable elements and no index constraint
    Ambiguous {
        /// Usable match count
        count: usize,
    },
    /// Index constraint beyond the usable matches
    IndexOutOfRange {
        /// Usable match count
        count: usize,
        /// Requested position
        index: String,
    },
    /// Exactly one element selected
    Resolved {
        /// Usable match count
        matched: usize,
        /// Selected position among usable matches
        index: usize,
    },
    /// Usable elements counted
    Counted {
        /// Usable match count
        count: usize,
    },
    /// Driver failed for this candidate
    Error {
        /// Driver message
        message: String,
    },
}

/// One entry of the attempt trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorAttempt {
    /// Candidate description, e.g. `role=button[name ~"Start"] (first)`
    pub candidate: String,
    /// Strategy used
    pub strategy: StrategyKind,
    /// Outcome
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl LocatorAttempt {
    fn new(candidate: &CandidateLocator, outcome: AttemptOutcome) -> Self {
        Self {
            candidate: candidate.to_string(),
            strategy: candidate.strategy.kind(),
            outcome,
        }
    }
}

impl fmt::Display for LocatorAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.candidate)?;
        match &self.outcome {
            AttemptOutcome::NoMatch => f.write_str("0 matches"),
            AttemptOutcome::Hidden { matched } => write!(f, "{matched} matched, none visible"),
            AttemptOutcome::Ambiguous { count } => write!(f, "{count} matches (ambiguous)"),
            AttemptOutcome::IndexOutOfRange { count, index } => {
                write!(f, "{count} matches, {index} out of range")
            }
            AttemptOutcome::Resolved { matched, index } => {
                write!(f, "resolved #{index} of {matched}")
            }
            AttemptOutcome::Counted { count } => write!(f, "{count} counted"),
            AttemptOutcome::Error { message } => write!(f, "error: {message}"),
        }
    }
}

/// Element selected by the resolver.
///
/// Owned by the step that requested it; never reused across steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedElement {
    /// Driver handle
    pub handle: ElementRef,
    /// Strategy of the winning candidate
    pub strategy: StrategyKind,
    /// Position of the winning candidate in the descriptor
    pub candidate_index: usize,
    /// Position among the usable matches
    pub match_index: usize,
    /// Visibility at resolution time
    pub visible: bool,
    /// Every candidate tried, scopes included
    pub attempts: Vec<LocatorAttempt>,
}

/// Resolution failure with the attempt trace
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// No candidate produced a usable element
    #[error("no candidate matched {target}")]
    NotFound {
        /// Target description
        target: String,
        /// Attempt trace
        attempts: Vec<LocatorAttempt>,
    },

    /// A candidate matched several usable elements and nothing later was unique
    #[error("{count} elements matched {candidate} with no index constraint")]
    Ambiguous {
        /// Target description
        target: String,
        /// Ambiguous candidate
        candidate: String,
        /// Usable match count
        count: usize,
        /// Attempt trace
        attempts: Vec<LocatorAttempt>,
    },

    /// The driver failed fatally while querying
    #[error("driver failed while resolving {target}: {error}")]
    Driver {
        /// Target description
        target: String,
        /// Driver error
        error: DriverError,
        /// Attempt trace
        attempts: Vec<LocatorAttempt>,
    },
}

impl ResolutionError {
    /// Attempt trace
    #[must_use]
    pub fn attempts(&self) -> &[LocatorAttempt] {
        match self {
            Self::NotFound { attempts, .. }
            | Self::Ambiguous { attempts, .. }
            | Self::Driver { attempts, .. } => attempts,
        }
    }
}

enum CandidateFailure {
    NotFound,
    Ambiguous { candidate: String, count: usize },
    Driver(DriverError),
}

struct Selected {
    handle: ElementRef,
    strategy: StrategyKind,
    candidate_index: usize,
    match_index: usize,
    visible: bool,
}

/// Resolves targets against a driver under a wait policy
#[derive(Debug, Clone, Copy, Default)]
pub struct LocatorResolver {
    policy: WaitPolicy,
}

impl LocatorResolver {
    /// Resolver using `policy` for [`LocatorResolver::resolve`]
    #[must_use]
    pub const fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    /// Default wait policy
    #[must_use]
    pub const fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// One resolution pass, no waiting
    pub async fn resolve_once<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        target: &TargetDescriptor,
    ) -> Result<ResolvedElement, ResolutionError> {
        let mut attempts = Vec::new();
        let mut scope: Option<ElementRef> = None;
        let chain = target.scope_chain();
        let last = chain.len() - 1;

        for (depth, descriptor) in chain.into_iter().enumerate() {
            match select(driver, descriptor, scope.as_ref(), &mut attempts).await {
                Ok(selected) if depth == last => {
                    tracing::debug!(
                        descriptor = %target,
                        strategy = %selected.strategy,
                        candidate = selected.candidate_index,
                        "resolved"
                    );
                    return Ok(ResolvedElement {
                        handle: selected.handle,
                        strategy: selected.strategy,
                        candidate_index: selected.candidate_index,
                        match_index: selected.match_index,
                        visible: selected.visible,
                        attempts,
                    });
                }
                Ok(selected) => scope = Some(selected.handle),
                Err(failure) => return Err(failure_to_error(target, failure, attempts)),
            }
        }
        Err(ResolutionError::NotFound {
            target: target.to_string(),
            attempts,
        })
    }

    /// Count usable matches in one pass.
    ///
    /// The first candidate with at least one usable element decides the
    /// count. A `within` scope must resolve to exactly one element.
    pub async fn count_once<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        target: &TargetDescriptor,
    ) -> Result<(usize, Option<StrategyKind>, Vec<LocatorAttempt>), ResolutionError> {
        let mut attempts = Vec::new();
        let mut scope = None;
        if let Some(within) = target.within.as_deref() {
            let container = self.resolve_once(driver, within).await?;
            attempts.extend(container.attempts);
            scope = Some(container.handle);
        }

        for candidate in &target.candidates {
            let query = ElementQuery::new(candidate.strategy.clone()).within(scope.clone());
            let found = match driver.query_elements(&query).await {
                Ok(found) => found,
                Err(e) => {
                    attempts.push(LocatorAttempt::new(
                        candidate,
                        AttemptOutcome::Error {
                            message: e.to_string(),
                        },
                    ));
                    if e.is_fatal() {
                        return Err(ResolutionError::Driver {
                            target: target.to_string(),
                            error: e,
                            attempts,
                        });
                    }
                    continue;
                }
            };
            let mut count = 0;
            for element in &found {
                if !candidate.constraints.require_visible {
                    count += 1;
                    continue;
                }
                match driver.is_visible(element).await {
                    Ok(true) => count += 1,
                    Ok(false) => {}
                    Err(e) if e.is_fatal() => {
                        return Err(ResolutionError::Driver {
                            target: target.to_string(),
                            error: e,
                            attempts,
                        })
                    }
                    Err(_) => {}
                }
            }
            let outcome = match (found.len(), count) {
                (0, _) => AttemptOutcome::NoMatch,
                (matched, 0) => AttemptOutcome::Hidden { matched },
                (_, count) => AttemptOutcome::Counted { count },
            };
            attempts.push(LocatorAttempt::new(candidate, outcome));
            if count > 0 {
                return Ok((count, Some(candidate.strategy.kind()), attempts));
            }
        }
        Ok((0, None, attempts))
    }

    /// Resolve under the resolver's own policy
    pub async fn resolve<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        target: &TargetDescriptor,
    ) -> Result<ResolvedElement, ResolutionError> {
        self.resolve_with(driver, target, &self.policy)
            .await
            .map(|(element, _)| element)
            .map_err(|(error, _)| error)
    }

    /// Resolve under `policy`, retrying only while the result is `NotFound`.
    ///
    /// Ambiguity and fatal driver errors end the wait immediately.
    pub async fn resolve_with<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        target: &TargetDescriptor,
        policy: &WaitPolicy,
    ) -> Result<(ResolvedElement, WaitStats), (ResolutionError, WaitStats)> {
        retry_until(policy, move || async move {
            match self.resolve_once(driver, target).await {
                Ok(element) => PollOutcome::Ready(element),
                Err(e @ ResolutionError::NotFound { .. }) => PollOutcome::Retry(e),
                Err(e) => PollOutcome::Abort(e),
            }
        })
        .await
        .map_err(|wait| {
            let stats = wait.stats();
            let error = wait.into_inner();
            tracing::debug!(%error, attempts = stats.attempts, "resolution gave up");
            (error, stats)
        })
    }
}

fn failure_to_error(
    target: &TargetDescriptor,
    failure: CandidateFailure,
    attempts: Vec<LocatorAttempt>,
) -> ResolutionError {
    let target = target.to_string();
    match failure {
        CandidateFailure::NotFound => ResolutionError::NotFound { target, attempts },
        CandidateFailure::Ambiguous { candidate, count } => ResolutionError::Ambiguous {
            target,
            candidate,
            count,
            attempts,
        },
        CandidateFailure::Driver(error) => ResolutionError::Driver {
            target,
            error,
            attempts,
        },
    }
}

/// Try the candidates of one descriptor in order
async fn select<D: VerifyDriver + ?Sized>(
    driver: &D,
    descriptor: &TargetDescriptor,
    scope: Option<&ElementRef>,
    attempts: &mut Vec<LocatorAttempt>,
) -> Result<Selected, CandidateFailure> {
    let mut first_ambiguity: Option<(String, usize)> = None;

    for (candidate_index, candidate) in descriptor.candidates.iter().enumerate() {
        let query = ElementQuery::new(candidate.strategy.clone()).within(scope.cloned());
        let found = match driver.query_elements(&query).await {
            Ok(found) => found,
            Err(e) => {
                attempts.push(LocatorAttempt::new(
                    candidate,
                    AttemptOutcome::Error {
                        message: e.to_string(),
                    },
                ));
                if e.is_fatal() {
                    return Err(CandidateFailure::Driver(e));
                }
                continue;
            }
        };
        if found.is_empty() {
            attempts.push(LocatorAttempt::new(candidate, AttemptOutcome::NoMatch));
            continue;
        }

        let matched = found.len();
        let survivors = if candidate.constraints.require_visible {
            let mut visible = Vec::with_capacity(found.len());
            for element in found {
                match driver.is_visible(&element).await {
                    Ok(true) => visible.push(element),
                    Ok(false) => {}
                    Err(e) if e.is_fatal() => {
                        attempts.push(LocatorAttempt::new(
                            candidate,
                            AttemptOutcome::Error {
                                message: e.to_string(),
                            },
                        ));
                        return Err(CandidateFailure::Driver(e));
                    }
                    Err(e) => tracing::debug!(%element, error = %e, "visibility check failed"),
                }
            }
            visible
        } else {
            found
        };

        if survivors.is_empty() {
            attempts.push(LocatorAttempt::new(candidate, AttemptOutcome::Hidden { matched }));
            continue;
        }

        let count = survivors.len();
        let picked = match candidate.constraints.index {
            Some(selector) => match selector.pick(count) {
                Some(index) => index,
                None => {
                    attempts.push(LocatorAttempt::new(
                        candidate,
                        AttemptOutcome::IndexOutOfRange {
                            count,
                            index: selector.to_string(),
                        },
                    ));
                    continue;
                }
            },
            None if count == 1 => 0,
            None => {
                attempts.push(LocatorAttempt::new(candidate, AttemptOutcome::Ambiguous { count }));
                first_ambiguity.get_or_insert_with(|| (candidate.to_string(), count));
                continue;
            }
        };

        attempts.push(LocatorAttempt::new(
            candidate,
            AttemptOutcome::Resolved {
                matched: count,
                index: picked,
            },
        ));
        let handle = survivors[picked].clone();
        let visible = if candidate.constraints.require_visible {
            true
        } else {
            match driver.is_visible(&handle).await {
                Ok(visible) => visible,
                Err(e) if e.is_fatal() => return Err(CandidateFailure::Driver(e)),
                Err(_) => false,
            }
        };
        return Ok(Selected {
            handle,
            strategy: candidate.strategy.kind(),
            candidate_index,
            match_index: picked,
            visible,
        });
    }

    match first_ambiguity {
        Some((candidate, count)) => Err(CandidateFailure::Ambiguous { candidate, count }),
        None => Err(CandidateFailure::NotFound),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockElement, MockPage};
    use std::time::Duration;

    fn quick() -> LocatorResolver {
        LocatorResolver::new(WaitPolicy::new(
            Duration::from_millis(1_000),
            Duration::from_millis(100),
        ))
    }

    fn target(candidates: Vec<CandidateLocator>) -> TargetDescriptor {
        TargetDescriptor::new(candidates)
    }

    mod resolve_once_tests {
        use super::*;

        #[tokio::test]
        async fn test_unique_match_reports_strategy() {
            let driver = MockDriver::new(MockPage::new().with(MockElement::button("Load More")));
            let resolved = quick()
                .resolve_once(&driver, &target(vec![CandidateLocator::role("button", "Load More")]))
                .await
                .unwrap();
            assert_eq!(resolved.strategy, StrategyKind::Role);
            assert_eq!(resolved.candidate_index, 0);
            assert_eq!(resolved.match_index, 0);
            assert!(resolved.visible);
        }

        #[tokio::test]
        async fn test_falls_through_zero_matches() {
            let driver = MockDriver::new(MockPage::new().with(MockElement::button("Start")));
            let t = target(vec![
                CandidateLocator::text("Start Analysis"),
                CandidateLocator::text("Initialize"),
                CandidateLocator::exact_text("Start"),
            ]);
            let resolved = quick().resolve_once(&driver, &t).await.unwrap();
            assert_eq!(resolved.candidate_index, 2);
            assert_eq!(resolved.attempts.len(), 3);
            assert_eq!(resolved.attempts[0].outcome, AttemptOutcome::NoMatch);
        }

        #[tokio::test]
        async fn test_ambiguous_falls_through_to_unique_candidate() {
            let driver = MockDriver::new(
                MockPage::new()
                    .with(MockElement::button("Start"))
                    .with(MockElement::new("span").text("Start")),
            );
            let t = target(vec![
                CandidateLocator::text("Start"),
                CandidateLocator::role("button", "Start"),
            ]);
            let resolved = quick().resolve_once(&driver, &t).await.unwrap();
            assert_eq!(resolved.strategy, StrategyKind::Role);
            assert_eq!(resolved.handle, ElementRef::new("mock-0"));
            assert_eq!(resolved.attempts[0].outcome, AttemptOutcome::Ambiguous { count: 2 });
        }

        #[tokio::test]
        async fn test_ambiguous_without_fallback_is_error() {
            let driver = MockDriver::new(
                MockPage::new()
                    .with(MockElement::button("Remove"))
                    .with(MockElement::button("Remove")),
            );
            let err = quick()
                .resolve_once(&driver, &target(vec![CandidateLocator::text("Remove")]))
                .await
                .unwrap_err();
            assert!(matches!(err, ResolutionError::Ambiguous { count: 2, .. }));
        }

        #[tokio::test]
        async fn test_index_constraints() {
            let page = MockPage::new()
                .with(MockElement::new("tr").text("row a"))
                .with(MockElement::new("tr").text("row b"))
                .with(MockElement::new("tr").text("row c"));
            let driver = MockDriver::new(page);
            let resolver = quick();

            let last = resolver
                .resolve_once(&driver, &target(vec![CandidateLocator::css("tr").last()]))
                .await
                .unwrap();
            assert_eq!(last.handle, ElementRef::new("mock-2"));
            assert_eq!(last.match_index, 2);

            let err = resolver
                .resolve_once(&driver, &target(vec![CandidateLocator::css("tr").nth(5)]))
                .await
                .unwrap_err();
            assert!(matches!(err, ResolutionError::NotFound { .. }));
            assert!(matches!(
                err.attempts()[0].outcome,
                AttemptOutcome::IndexOutOfRange { count: 3, .. }
            ));
        }

        #[tokio::test]
        async fn test_hidden_elements_are_skipped() {
            let page = MockPage::new()
                .with(MockElement::button("Remove").opacity(0.0))
                .with(MockElement::new("a").attr("href", "#").text("Remove link"));
            let driver = MockDriver::new(page);
            let t = target(vec![
                CandidateLocator::role("button", "Remove"),
                CandidateLocator::any_role("link"),
            ]);
            let resolved = quick().resolve_once(&driver, &t).await.unwrap();
            assert_eq!(resolved.candidate_index, 1);
            assert_eq!(resolved.attempts[0].outcome, AttemptOutcome::Hidden { matched: 1 });
        }

        #[tokio::test]
        async fn test_any_visibility_resolves_hidden_element() {
            let driver =
                MockDriver::new(MockPage::new().with(MockElement::button("Remove").opacity(0.0)));
            let resolved = quick()
                .resolve_once(
                    &driver,
                    &target(vec![CandidateLocator::text("Remove").any_visibility()]),
                )
                .await
                .unwrap();
            assert!(!resolved.visible);
        }

        #[tokio::test]
        async fn test_scoped_resolution() {
            let mut page = MockPage::new();
            let first = page.add(MockElement::new("div").class("card"));
            page.add(MockElement::new("div").class("card"));
            page.add(MockElement::button("View Details").child_of(&first));
            page.add(MockElement::button("View Details"));
            let driver = MockDriver::new(page);

            let t = target(vec![CandidateLocator::text("View Details")])
                .within(target(vec![CandidateLocator::css(".card").first()]));
            let resolved = quick().resolve_once(&driver, &t).await.unwrap();
            assert_eq!(resolved.handle, ElementRef::new("mock-2"));
            assert_eq!(resolved.attempts.len(), 2);
        }

        #[tokio::test]
        async fn test_unsupported_selector_falls_through() {
            let driver = MockDriver::new(MockPage::new().with(MockElement::button("Go")));
            let t = target(vec![
                CandidateLocator::css("main > button"),
                CandidateLocator::text("Go"),
            ]);
            let resolved = quick().resolve_once(&driver, &t).await.unwrap();
            assert_eq!(resolved.candidate_index, 1);
            assert!(matches!(resolved.attempts[0].outcome, AttemptOutcome::Error { .. }));
        }

        #[tokio::test]
        async fn test_fatal_driver_error_stops() {
            let driver = MockDriver::new(MockPage::new().crash_after(0));
            let err = quick()
                .resolve_once(&driver, &target(vec![CandidateLocator::text("Go")]))
                .await
                .unwrap_err();
            assert!(matches!(err, ResolutionError::Driver { .. }));
        }
    }

    mod resolve_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_waits_for_late_element() {
            let page = MockPage::new()
                .with(MockElement::new("p").text("Ready").appear_after(Duration::from_millis(500)));
            let driver = MockDriver::new(page);
            driver.navigate("http://localhost:3000/").await.unwrap();

            let start = tokio::time::Instant::now();
            let resolved = quick()
                .resolve(&driver, &target(vec![CandidateLocator::text("Ready")]))
                .await
                .unwrap();
            assert_eq!(resolved.strategy, StrategyKind::Text);
            assert_eq!(start.elapsed(), Duration::from_millis(500));
        }

        #[tokio::test(start_paused = true)]
        async fn test_not_found_is_bounded() {
            let driver = MockDriver::new(MockPage::new());
            let resolver = quick();
            let start = tokio::time::Instant::now();
            let err = resolver
                .resolve(&driver, &target(vec![CandidateLocator::text("Nope")]))
                .await
                .unwrap_err();
            assert!(matches!(err, ResolutionError::NotFound { .. }));
            let waited = start.elapsed();
            assert!(waited <= resolver.policy().timeout + resolver.policy().poll_interval);
        }

        #[tokio::test(start_paused = true)]
        async fn test_ambiguity_is_not_retried() {
            let driver = MockDriver::new(
                MockPage::new()
                    .with(MockElement::button("Add"))
                    .with(MockElement::button("Add")),
            );
            let (err, stats) = quick()
                .resolve_with(
                    &driver,
                    &target(vec![CandidateLocator::text("Add")]),
                    &WaitPolicy::structural(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ResolutionError::Ambiguous { .. }));
            assert_eq!(stats.attempts, 1);
        }

        #[tokio::test]
        async fn test_idempotent_on_unchanged_dom() {
            let driver = MockDriver::new(
                MockPage::new()
                    .with(MockElement::new("span").text("Low Risk"))
                    .with(MockElement::new("span").text("High Risk")),
            );
            let t = target(vec![CandidateLocator::text("Risk").first()]);
            let a = quick().resolve(&driver, &t).await.unwrap();
            let b = quick().resolve(&driver, &t).await.unwrap();
            assert_eq!(
                (a.handle, a.strategy, a.match_index),
                (b.handle, b.strategy, b.match_index)
            );
        }
    }

    mod count_tests {
        use super::*;

        #[tokio::test]
        async fn test_count_first_non_empty_candidate() {
            let mut page = MockPage::new();
            let table = page.add(MockElement::new("table"));
            for i in 0..12 {
                page.add(MockElement::new("tr").text(format!("row {i}")).child_of(&table));
            }
            page.add(MockElement::new("tr").text("hidden").hidden().child_of(&table));
            let driver = MockDriver::new(page);

            let t = target(vec![CandidateLocator::css("tbody tr"), CandidateLocator::css("tr")])
                .within(target(vec![CandidateLocator::css("table")]));
            let (count, strategy, attempts) = quick().count_once(&driver, &t).await.unwrap();
            assert_eq!(count, 12);
            assert_eq!(strategy, Some(StrategyKind::Css));
            assert_eq!(attempts.len(), 3);
        }

        #[tokio::test]
        async fn test_count_zero() {
            let driver = MockDriver::new(MockPage::new());
            let (count, strategy, _) = quick()
                .count_once(&driver, &target(vec![CandidateLocator::css("img")]))
                .await
                .unwrap();
            assert_eq!(count, 0);
            assert!(strategy.is_none());
        }
    }

    #[test]
    fn test_attempt_display() {
        let attempt = LocatorAttempt {
            candidate: "text ~\"Start\"".into(),
            strategy: StrategyKind::Text,
            outcome: AttemptOutcome::Ambiguous { count: 2 },
        };
        assert_eq!(attempt.to_string(), "text ~\"Start\": 2 matches (ambiguous)");
    }
}
