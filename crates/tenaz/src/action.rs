//! Action Executor
//!
//! Performs one interaction on a resolved element (or on the page) under a
//! hard time bound. The executor does not check outcomes; that is left to a
//! following assertion.
//!
//! Forced clicks skip the visible-and-not-occluded precondition. They are
//! only ever requested explicitly by the step, never applied as a fallback.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::driver::{
    ClickOptions, DriverError, DriverErrorKind, DriverResult, ScrollPosition, VerifyDriver,
    Viewport,
};
use crate::resolver::ResolvedElement;

/// Default bound for a single action (10 seconds)
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 10_000;

const fn default_true() -> bool {
    true
}

/// Interaction requested by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    /// Click, optionally bypassing actionability checks
    Click {
        /// Skip the visibility and occlusion precondition
        #[serde(default)]
        force: bool,
    },
    /// Hover over the element
    Hover,
    /// Scroll the element into view
    ScrollIntoView,
    /// Type into an input
    Fill {
        /// Replacement value
        text: String,
    },
    /// Resize the viewport
    SetViewport {
        /// Width in CSS pixels
        width: u32,
        /// Height in CSS pixels
        height: u32,
    },
    /// Scroll the page to the bottom
    ScrollToBottom,
    /// Scroll the page to the top
    ScrollToTop,
    /// Checkpoint screenshot into the artifacts directory
    Screenshot {
        /// File name, `.png` appended when missing
        name: String,
        /// Capture the full scrollable page
        #[serde(default = "default_true")]
        full_page: bool,
    },
    /// Inject a stylesheet
    InjectStyle {
        /// CSS source
        css: String,
    },
}

impl ActionKind {
    /// Plain click
    #[must_use]
    pub const fn click() -> Self {
        Self::Click { force: false }
    }

    /// Forced click
    #[must_use]
    pub const fn force_click() -> Self {
        Self::Click { force: true }
    }

    /// True for actions that operate on a resolved element
    #[must_use]
    pub const fn needs_target(&self) -> bool {
        matches!(
            self,
            Self::Click { .. } | Self::Hover | Self::ScrollIntoView | Self::Fill { .. }
        )
    }

    /// Action name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Click { force: false } => "click",
            Self::Click { force: true } => "force click",
            Self::Hover => "hover",
            Self::ScrollIntoView => "scroll into view",
            Self::Fill { .. } => "fill",
            Self::SetViewport { .. } => "set viewport",
            Self::ScrollToBottom => "scroll to bottom",
            Self::ScrollToTop => "scroll to top",
            Self::Screenshot { .. } => "screenshot",
            Self::InjectStyle { .. } => "inject style",
        }
    }
}

/// Interaction failure on an otherwise valid step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Element action requested without a target
    #[error("{action} needs a target element")]
    MissingTarget {
        /// Action name
        action: String,
    },

    /// Actionability precondition failed
    #[error("{action}: element not interactable: {message}")]
    NotInteractable {
        /// Action name
        action: String,
        /// Driver message
        message: String,
    },

    /// Element left the document mid-action
    #[error("{action}: element detached: {message}")]
    Detached {
        /// Action name
        action: String,
        /// Driver message
        message: String,
    },

    /// Action exceeded its bound
    #[error("{action} did not complete within {timeout_ms}ms")]
    TimedOut {
        /// Action name
        action: String,
        /// Bound in milliseconds
        timeout_ms: u64,
    },

    /// Any other driver failure
    #[error("{action}: {error}")]
    Driver {
        /// Action name
        action: String,
        /// Driver error
        error: DriverError,
    },
}

impl ActionError {
    /// Classify a driver failure for `action`
    #[must_use]
    pub fn from_driver(action: &str, error: DriverError) -> Self {
        let action = action.to_string();
        match error.kind {
            DriverErrorKind::NotInteractable => Self::NotInteractable {
                action,
                message: error.message,
            },
            DriverErrorKind::ElementDetached => Self::Detached {
                action,
                message: error.message,
            },
            _ => Self::Driver { action, error },
        }
    }

    /// Fatal driver failure underneath
    #[must_use]
    pub fn fatal_driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Driver { error, .. } if error.is_fatal() => Some(error),
            _ => None,
        }
    }
}

/// What the executor did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Action name
    pub action: &'static str,
    /// Click was forced
    pub forced: bool,
    /// Time spent
    pub elapsed: Duration,
    /// File written by a screenshot action
    pub artifact: Option<PathBuf>,
}

/// Result of [`ActionExecutor::act`]
pub type ActionResult = Result<ActionOutcome, ActionError>;

/// Per-scenario context for actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    /// Directory for checkpoint screenshots
    pub artifacts_dir: PathBuf,
}

impl ActionContext {
    /// Context writing into `artifacts_dir`
    #[must_use]
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
        }
    }

    /// Path for a checkpoint screenshot
    #[must_use]
    pub fn screenshot_path(&self, name: &str) -> PathBuf {
        let file = if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{name}.png")
        };
        self.artifacts_dir.join(file)
    }
}

/// Bounded interaction executor
#[derive(Debug, Clone, Copy)]
pub struct ActionExecutor {
    action_timeout: Duration,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_ACTION_TIMEOUT_MS))
    }
}

impl ActionExecutor {
    /// Executor bounding each action by `action_timeout`
    #[must_use]
    pub const fn new(action_timeout: Duration) -> Self {
        Self { action_timeout }
    }

    /// Perform `action`, on `element` when the action needs one
    pub async fn act<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        element: Option<&ResolvedElement>,
        action: &ActionKind,
        context: &ActionContext,
    ) -> ActionResult {
        let name = action.name();
        if action.needs_target() && element.is_none() {
            return Err(ActionError::MissingTarget {
                action: name.to_string(),
            });
        }
        let forced = matches!(action, ActionKind::Click { force: true });
        if forced {
            tracing::info!(
                element = ?element.map(|e| e.handle.as_str()),
                "forced click requested, actionability checks skipped"
            );
        }

        let start = Instant::now();
        let performed =
            tokio::time::timeout(self.action_timeout, perform(driver, element, action, context))
                .await;
        match performed {
            Ok(Ok(artifact)) => Ok(ActionOutcome {
                action: name,
                forced,
                elapsed: start.elapsed(),
                artifact,
            }),
            Ok(Err(error)) => {
                tracing::debug!(action = name, %error, "action failed");
                Err(ActionError::from_driver(name, error))
            }
            Err(_) => Err(ActionError::TimedOut {
                action: name.to_string(),
                timeout_ms: self.action_timeout.as_millis() as u64,
            }),
        }
    }
}

async fn perform<D: VerifyDriver + ?Sized>(
    driver: &D,
    element: Option<&ResolvedElement>,
    action: &ActionKind,
    context: &ActionContext,
) -> DriverResult<Option<PathBuf>> {
    let handle = element.map(|e| &e.handle);
    match (action, handle) {
        (ActionKind::Click { force }, Some(h)) => {
            driver.click(h, ClickOptions { force: *force }).await?;
        }
        (ActionKind::Hover, Some(h)) => driver.hover(h).await?,
        (ActionKind::ScrollIntoView, Some(h)) => driver.scroll_into_view(h).await?,
        (ActionKind::Fill { text }, Some(h)) => driver.fill(h, text).await?,
        (ActionKind::SetViewport { width, height }, _) => {
            driver.set_viewport(Viewport::new(*width, *height)).await?;
        }
        (ActionKind::ScrollToBottom, _) => driver.scroll_page(ScrollPosition::Bottom).await?,
        (ActionKind::ScrollToTop, _) => driver.scroll_page(ScrollPosition::Top).await?,
        (ActionKind::Screenshot { name, full_page }, _) => {
            tokio::fs::create_dir_all(&context.artifacts_dir)
                .await
                .map_err(|e| DriverError::new(DriverErrorKind::ScreenshotFailed, e.to_string()))?;
            let path = context.screenshot_path(name);
            driver.screenshot(&path, *full_page).await?;
            return Ok(Some(path));
        }
        (ActionKind::InjectStyle { css }, _) => driver.add_style(css).await?,
        (_, None) => {
            return Err(DriverError::unsupported(format!(
                "{} needs a target element",
                action.name()
            )))
        }
    }
    Ok(None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::{ElementRef, MockDriver, MockEffect, MockElement, MockPage};
    use crate::locator::StrategyKind;

    fn resolved(handle: &ElementRef) -> ResolvedElement {
        ResolvedElement {
            handle: handle.clone(),
            strategy: StrategyKind::Text,
            candidate_index: 0,
            match_index: 0,
            visible: true,
            attempts: Vec::new(),
        }
    }

    fn ctx() -> ActionContext {
        ActionContext::new("verification")
    }

    mod action_kind_tests {
        use super::*;

        #[test]
        fn test_yaml_forms() {
            let click: ActionKind = serde_yaml_ng::from_str("{ action: click, force: true }").unwrap();
            assert_eq!(click, ActionKind::force_click());
            let viewport: ActionKind =
                serde_yaml_ng::from_str("{ action: set_viewport, width: 375, height: 812 }")
                    .unwrap();
            assert!(!viewport.needs_target());
            let shot: ActionKind =
                serde_yaml_ng::from_str("{ action: screenshot, name: drawer-open }").unwrap();
            assert_eq!(
                shot,
                ActionKind::Screenshot {
                    name: "drawer-open".into(),
                    full_page: true
                }
            );
        }

        #[test]
        fn test_screenshot_path() {
            let c = ActionContext::new("/tmp/out");
            assert_eq!(c.screenshot_path("a"), PathBuf::from("/tmp/out/a.png"));
            assert_eq!(c.screenshot_path("b.jpeg"), PathBuf::from("/tmp/out/b.jpeg"));
        }
    }

    mod act_tests {
        use super::*;

        #[tokio::test]
        async fn test_forced_click_on_transparent_element() {
            let mut page = MockPage::new();
            let badge = page.add(MockElement::new("span").text("Removed").hidden());
            let button = page.add(
                MockElement::button("Remove")
                    .opacity(0.0)
                    .on_click(MockEffect::Reveal(badge.clone())),
            );
            let driver = MockDriver::new(page);
            let executor = ActionExecutor::default();
            let target = resolved(&button);

            let err = executor
                .act(&driver, Some(&target), &ActionKind::click(), &ctx())
                .await
                .unwrap_err();
            assert!(matches!(err, ActionError::NotInteractable { .. }));

            let outcome = executor
                .act(&driver, Some(&target), &ActionKind::force_click(), &ctx())
                .await
                .unwrap();
            assert!(outcome.forced);
            assert!(driver.is_visible(&badge).await.unwrap());
        }

        #[tokio::test]
        async fn test_missing_target() {
            let driver = MockDriver::new(MockPage::new());
            let err = ActionExecutor::default()
                .act(&driver, None, &ActionKind::Hover, &ctx())
                .await
                .unwrap_err();
            assert_eq!(
                err,
                ActionError::MissingTarget {
                    action: "hover".into()
                }
            );
        }

        #[tokio::test]
        async fn test_detached_mid_click() {
            let mut page = MockPage::new();
            let button = page.add(MockElement::button("Next").detaches_on_click());
            let driver = MockDriver::new(page);
            let err = ActionExecutor::default()
                .act(&driver, Some(&resolved(&button)), &ActionKind::click(), &ctx())
                .await
                .unwrap_err();
            assert!(matches!(err, ActionError::Detached { .. }));
            assert!(err.fatal_driver_error().is_none());
        }

        #[tokio::test]
        async fn test_page_level_actions() {
            let driver = MockDriver::new(MockPage::new());
            let executor = ActionExecutor::default();
            executor
                .act(
                    &driver,
                    None,
                    &ActionKind::SetViewport {
                        width: 375,
                        height: 812,
                    },
                    &ctx(),
                )
                .await
                .unwrap();
            executor
                .act(&driver, None, &ActionKind::ScrollToBottom, &ctx())
                .await
                .unwrap();
            executor
                .act(
                    &driver,
                    None,
                    &ActionKind::InjectStyle {
                        css: ".sr-only { position: static !important; }".into(),
                    },
                    &ctx(),
                )
                .await
                .unwrap();
            assert_eq!(driver.viewport(), Viewport::new(375, 812));
            assert_eq!(driver.scroll_position(), Some(ScrollPosition::Bottom));
            assert_eq!(driver.injected_styles().len(), 1);
        }

        #[tokio::test]
        async fn test_fill_sets_value() {
            let mut page = MockPage::new();
            let input = page.add(MockElement::new("input").attr("name", "ticker"));
            let driver = MockDriver::new(page);
            ActionExecutor::default()
                .act(
                    &driver,
                    Some(&resolved(&input)),
                    &ActionKind::Fill { text: "AAPL".into() },
                    &ctx(),
                )
                .await
                .unwrap();
            assert_eq!(
                driver.get_attribute(&input, "value").await.unwrap(),
                Some("AAPL".to_string())
            );
        }

        #[tokio::test]
        async fn test_checkpoint_screenshot() {
            let dir = tempfile::tempdir().unwrap();
            let context = ActionContext::new(dir.path().join("shots"));
            let driver = MockDriver::new(MockPage::new());
            let outcome = ActionExecutor::default()
                .act(
                    &driver,
                    None,
                    &ActionKind::Screenshot {
                        name: "table".into(),
                        full_page: true,
                    },
                    &context,
                )
                .await
                .unwrap();
            let path = outcome.artifact.unwrap();
            assert!(path.ends_with("shots/table.png"));
            assert!(path.exists());
        }

        #[tokio::test]
        async fn test_crashed_page_is_fatal() {
            let driver = MockDriver::new(MockPage::new().crash_after(0));
            let err = ActionExecutor::default()
                .act(&driver, None, &ActionKind::ScrollToTop, &ctx())
                .await
                .unwrap_err();
            assert!(err.fatal_driver_error().is_some());
        }
    }
}
