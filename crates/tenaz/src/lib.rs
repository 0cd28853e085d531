//! Tenaz: Resilient UI Verification Engine
//!
//! Tenaz (Spanish: "tenacious") drives a browser through scripted scenarios
//! against a UI that renders asynchronously, reorders under responsive
//! layouts and carries ambiguous labels. Each step locates its target
//! through an ordered list of fallback strategies, acts, asserts, and
//! captures evidence when something goes wrong.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       TENAZ Architecture                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Scenario ──► ScenarioRunner ──► Step                            │
//! │                  │                │                              │
//! │                  │                ├─► LocatorResolver ─┐         │
//! │                  │                ├─► ActionExecutor   ├─► Wait  │
//! │                  │                └─► AssertionEngine ─┘         │
//! │                  │                                                │
//! │                  ├─► DiagnosticsCapture (on failure)              │
//! │                  └─► ScenarioReport (text / JSON / JUnit)         │
//! │                                                                   │
//! │  VerifyDriver: ChromiumDriver (feature "browser") | MockDriver   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tenaz::prelude::*;
//!
//! # async fn demo() {
//! let page = MockPage::new().with(MockElement::button("Start Analysis"));
//! let runner = ScenarioRunner::new(MockProvider::new(page), EngineConfig::default());
//! let scenario = Scenario::new("enter app")
//!     .step(Step::navigate("/"))
//!     .step(Step::act(
//!         ActionKind::click(),
//!         TargetDescriptor::single(CandidateLocator::role("button", "Start Analysis"))
//!             .or(CandidateLocator::text("Start")),
//!     ));
//! let report = runner.run(&scenario).await;
//! println!("{}", report.render_text());
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod action;
pub mod assertion;
pub mod config;
pub mod diagnostics;
#[allow(clippy::missing_errors_doc)]
pub mod driver;
pub mod locator;
pub mod reporter;
pub mod resolver;
pub mod result;
pub mod runner;
pub mod scenario;
pub mod wait;

pub use action::{ActionContext, ActionError, ActionExecutor, ActionKind, ActionOutcome};
pub use assertion::{AssertionEngine, AssertionResult, Condition, ExpectedText};
pub use config::EngineConfig;
pub use diagnostics::{DiagnosticArtifact, DiagnosticsCapture, FailureContext};
pub use driver::{
    DriverError, DriverErrorKind, DriverProvider, DriverResult, ElementQuery, ElementRef,
    LoadState, VerifyDriver, Viewport,
};
pub use locator::{
    CandidateLocator, IndexSelector, Pattern, Strategy, StrategyKind, TargetDescriptor, TextMatch,
};
pub use reporter::{render_junit, ScenarioOutcome, ScenarioReport, StepOutcome, StepResult};
pub use resolver::{LocatorAttempt, LocatorResolver, ResolutionError, ResolvedElement};
pub use result::{FailureKind, StepError, TenazError, TenazResult};
pub use runner::ScenarioRunner;
pub use scenario::{Scenario, Step, StepKind, WaitStep};
pub use wait::{WaitClass, WaitPolicy};

/// Everything needed to write and run scenarios
pub mod prelude {
    pub use super::action::*;
    pub use super::assertion::*;
    pub use super::config::EngineConfig;
    pub use super::diagnostics::*;
    #[cfg(feature = "browser")]
    pub use super::driver::{ChromiumDriver, ChromiumProvider};
    pub use super::driver::{
        DriverError, DriverErrorKind, DriverProvider, LoadState, MockDriver, MockEffect,
        MockElement, MockPage, MockProvider, VerifyDriver, Viewport,
    };
    pub use super::locator::*;
    pub use super::reporter::*;
    pub use super::resolver::*;
    pub use super::result::*;
    pub use super::runner::ScenarioRunner;
    pub use super::scenario::*;
    pub use super::wait::*;
}
