//! Property-based tests for locator resolution.
//!
//! Uses proptest over generated pages: a number of decoy elements, a number
//! of hidden copies, and zero or more visible copies of the target label.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use std::time::Duration;
use tenaz::driver::{MockDriver, MockElement, MockPage};
use tenaz::locator::{CandidateLocator, StrategyKind, TargetDescriptor};
use tenaz::resolver::{LocatorResolver, ResolutionError};
use tenaz::wait::WaitPolicy;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime")
        .block_on(future)
}

fn page(decoys: usize, hidden: usize, visible: usize) -> MockPage {
    let mut page = MockPage::new();
    for i in 0..decoys {
        page.add(MockElement::new("div").text(format!("Decoy {i}")));
    }
    for _ in 0..hidden {
        page.add(MockElement::button("Load More").hidden());
    }
    for _ in 0..visible {
        page.add(MockElement::button("Load More"));
    }
    page
}

fn policy(timeout_ms: u64) -> WaitPolicy {
    WaitPolicy::new(Duration::from_millis(timeout_ms), Duration::from_millis(50))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A unique visible match resolves and reports its strategy
    #[test]
    fn prop_unique_visible_match_resolves(decoys in 0usize..6, hidden in 0usize..4, miss in "[a-z]{3,8}") {
        let driver = MockDriver::new(page(decoys, hidden, 1));
        let target = TargetDescriptor::single(CandidateLocator::text(format!("zz{miss}")))
            .or(CandidateLocator::text("Load More"));
        let resolver = LocatorResolver::new(policy(1_000));

        let resolved = block_on(resolver.resolve(&driver, &target)).unwrap();
        prop_assert_eq!(resolved.strategy, StrategyKind::Text);
        prop_assert_eq!(resolved.candidate_index, 1);
        prop_assert!(resolved.visible);
    }

    /// No match at all gives up within timeout plus one poll interval
    #[test]
    fn prop_no_match_is_bounded(decoys in 0usize..6, timeout_ms in 100u64..3_000) {
        let driver = MockDriver::new(page(decoys, 0, 0));
        let target = TargetDescriptor::single(CandidateLocator::text("Load More"));
        let resolver = LocatorResolver::new(policy(timeout_ms));

        let (result, elapsed) = block_on(async {
            let start = tokio::time::Instant::now();
            let result = resolver.resolve(&driver, &target).await;
            (result, start.elapsed())
        });
        let is_not_found = matches!(result, Err(ResolutionError::NotFound { .. }));
        prop_assert!(is_not_found);
        prop_assert!(elapsed <= Duration::from_millis(timeout_ms + 50));
    }

    /// Several unconstrained visible matches are never silently picked
    #[test]
    fn prop_multi_match_is_ambiguous(decoys in 0usize..4, visible in 2usize..5) {
        let driver = MockDriver::new(page(decoys, 0, visible));
        let target = TargetDescriptor::single(CandidateLocator::text("Load More"));
        let resolver = LocatorResolver::new(policy(1_000));

        match block_on(resolver.resolve(&driver, &target)) {
            Err(ResolutionError::Ambiguous { count, .. }) => prop_assert_eq!(count, visible),
            other => prop_assert!(false, "expected ambiguity, got {:?}", other),
        }

        let last = TargetDescriptor::single(CandidateLocator::text("Load More").last());
        let resolved = block_on(resolver.resolve(&driver, &last)).unwrap();
        prop_assert_eq!(resolved.match_index, visible - 1);
    }

    /// Resolving twice against an unchanged page gives the same metadata
    #[test]
    fn prop_resolution_is_idempotent(decoys in 0usize..6, hidden in 0usize..3, nth in 0usize..3) {
        let driver = MockDriver::new(page(decoys, hidden, 3));
        let target = TargetDescriptor::single(CandidateLocator::role("button", "Load More").nth(nth));
        let resolver = LocatorResolver::new(policy(1_000));

        let first = block_on(resolver.resolve(&driver, &target)).unwrap();
        let second = block_on(resolver.resolve(&driver, &target)).unwrap();
        prop_assert_eq!(&first.handle, &second.handle);
        prop_assert_eq!(first.strategy, second.strategy);
        prop_assert_eq!(first.match_index, second.match_index);
        prop_assert_eq!(first.candidate_index, second.candidate_index);
    }
}
