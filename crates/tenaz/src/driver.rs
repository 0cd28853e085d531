//! VerifyDriver - Browser Automation Capability
//!
//! The engine never talks to a browser directly. Every navigation, DOM query,
//! interaction and screenshot goes through [`VerifyDriver`], so scenarios can
//! run against a real Chromium page or against the in-memory [`MockDriver`].
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ScenarioRunner                                                   │
//! │    │ acquire (one per scenario)            release (exactly once) │
//! │    ▼                                                        ▲     │
//! │  DriverProvider ──► VerifyDriver ──────────────────────────┘     │
//! │                      ├── ChromiumDriver  (feature "browser")      │
//! │                      └── MockDriver      (in-memory DOM)          │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::locator::Strategy;

pub mod mock;

#[cfg(feature = "browser")]
pub mod chromium;

#[cfg(feature = "browser")]
pub use chromium::{ChromiumDriver, ChromiumProvider};
pub use mock::{MockDriver, MockEffect, MockElement, MockPage, MockProvider, MockStats};

/// Result type for driver capability calls
pub type DriverResult<T> = Result<T, DriverError>;

/// Classification of a driver failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverErrorKind {
    /// Navigation did not complete
    NavigationFailed,
    /// Page or browser target went away
    PageCrashed,
    /// Browser could not be started
    LaunchFailed,
    /// Protocol-level failure talking to the browser
    Protocol,
    /// Element is no longer attached to the document
    ElementDetached,
    /// Element failed the actionability check
    NotInteractable,
    /// Driver-side wait elapsed
    Timeout,
    /// Screenshot could not be captured or written
    ScreenshotFailed,
    /// Operation or selector not supported by this driver
    Unsupported,
}

impl DriverErrorKind {
    /// Short label used in messages
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NavigationFailed => "navigation failed",
            Self::PageCrashed => "page crashed",
            Self::LaunchFailed => "browser launch failed",
            Self::Protocol => "protocol error",
            Self::ElementDetached => "element detached",
            Self::NotInteractable => "element not interactable",
            Self::Timeout => "driver timeout",
            Self::ScreenshotFailed => "screenshot failed",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`VerifyDriver`]
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct DriverError {
    /// Failure classification
    pub kind: DriverErrorKind,
    /// Driver message
    pub message: String,
}

impl DriverError {
    /// Create a driver error
    #[must_use]
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Navigation failure
    #[must_use]
    pub fn navigation(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::NavigationFailed, message)
    }

    /// Crashed or closed page
    #[must_use]
    pub fn crashed(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::PageCrashed, message)
    }

    /// Detached element
    #[must_use]
    pub fn detached(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::ElementDetached, message)
    }

    /// Actionability failure
    #[must_use]
    pub fn not_interactable(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::NotInteractable, message)
    }

    /// Unsupported selector or operation
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Unsupported, message)
    }

    /// Fatal errors mean the page itself is unusable and abort the scenario
    /// regardless of `continue_on_failure`.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            DriverErrorKind::NavigationFailed
                | DriverErrorKind::PageCrashed
                | DriverErrorKind::LaunchFailed
                | DriverErrorKind::Protocol
        )
    }
}

/// Opaque element handle, valid only for the page that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(String);

impl ElementRef {
    /// Wrap a driver-specific handle id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Handle id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One DOM query: a strategy, optionally restricted to descendants of `scope`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementQuery {
    /// What to look for
    pub strategy: Strategy,
    /// Container element
    pub scope: Option<ElementRef>,
}

impl ElementQuery {
    /// Document-wide query
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            scope: None,
        }
    }

    /// Restrict to descendants of `scope`
    #[must_use]
    pub fn within(mut self, scope: Option<ElementRef>) -> Self {
        self.scope = scope;
        self
    }
}

/// Click options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickOptions {
    /// Skip the visible-and-not-occluded precondition
    pub force: bool,
}

impl ClickOptions {
    /// Forced click
    #[must_use]
    pub const fn forced() -> Self {
        Self { force: true }
    }
}

/// Viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Viewport {
    /// Create a viewport
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 800)
    }
}

/// Page scroll target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollPosition {
    /// Top of the document
    Top,
    /// Bottom of the document
    Bottom,
}

/// Page load milestone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// `load` event fired
    #[default]
    Load,
    /// `DOMContentLoaded` fired
    #[serde(alias = "dom_content_loaded")]
    DomContentLoaded,
    /// No network activity for a short window
    #[serde(alias = "network_idle")]
    NetworkIdle,
}

impl LoadState {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle => "networkidle",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Browser automation capability consumed by the engine.
///
/// Implementations drive exactly one page. The engine never issues two calls
/// concurrently on the same driver.
#[async_trait]
pub trait VerifyDriver: Send + Sync {
    /// Navigate to an absolute URL
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// Elements matching `query`, in document order
    async fn query_elements(&self, query: &ElementQuery) -> DriverResult<Vec<ElementRef>>;

    /// Attribute value, `None` if absent
    async fn get_attribute(&self, element: &ElementRef, name: &str)
        -> DriverResult<Option<String>>;

    /// Rendered text
    async fn get_text(&self, element: &ElementRef) -> DriverResult<String>;

    /// Attached, displayed and not fully transparent
    async fn is_visible(&self, element: &ElementRef) -> DriverResult<bool>;

    /// Click; non-forced clicks fail with `NotInteractable` on hidden or occluded elements
    async fn click(&self, element: &ElementRef, options: ClickOptions) -> DriverResult<()>;

    /// Move the pointer over the element
    async fn hover(&self, element: &ElementRef) -> DriverResult<()>;

    /// Replace the value of an input
    async fn fill(&self, element: &ElementRef, text: &str) -> DriverResult<()>;

    /// Scroll the element into the viewport
    async fn scroll_into_view(&self, element: &ElementRef) -> DriverResult<()>;

    /// Resize the viewport
    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()>;

    /// Scroll the whole page
    async fn scroll_page(&self, position: ScrollPosition) -> DriverResult<()>;

    /// Write a PNG screenshot to `path`
    async fn screenshot(&self, path: &Path, full_page: bool) -> DriverResult<()>;

    /// Wait until a CSS selector matches, bounded by `timeout`
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()>;

    /// Wait for a load milestone, bounded by `timeout`
    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> DriverResult<()>;

    /// Inject a stylesheet into the page
    async fn add_style(&self, css: &str) -> DriverResult<()>;

    /// Serialised DOM, truncated to `max_chars`
    async fn dom_excerpt(&self, max_chars: usize) -> DriverResult<String>;

    /// Close the page and its browser context
    async fn close(&self) -> DriverResult<()>;
}

/// Hands out one isolated driver per scenario run.
///
/// `release` takes the driver by value, so a driver cannot be released twice.
#[async_trait]
pub trait DriverProvider: Send + Sync {
    /// Driver type produced by this provider
    type Driver: VerifyDriver + 'static;

    /// Acquire a fresh page for `scenario`
    async fn acquire(&self, scenario: &str) -> DriverResult<Self::Driver>;

    /// Release a page acquired from this provider
    async fn release(&self, driver: Self::Driver) -> DriverResult<()> {
        driver.close().await
    }
}

/// Truncate on a char boundary, appending an ellipsis marker when cut
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Positions of matched nodes that contain no other matched node.
///
/// `parents[i]` is the nearest ancestor of node `i` within the same list.
/// A text query would otherwise match a leaf and every wrapper whose combined
/// text contains it.
#[must_use]
pub fn innermost(parents: &[Option<usize>], matched: &[bool]) -> Vec<usize> {
    let mut shadowed = vec![false; parents.len()];
    for (i, _) in matched.iter().enumerate().filter(|(_, hit)| **hit) {
        let mut current = parents.get(i).copied().flatten();
        let mut steps = 0;
        while let Some(p) = current.filter(|p| *p < parents.len()) {
            if shadowed[p] || steps > parents.len() {
                break;
            }
            shadowed[p] = true;
            current = parents[p];
            steps += 1;
        }
    }
    matched
        .iter()
        .enumerate()
        .filter(|(i, hit)| **hit && !shadowed.get(*i).copied().unwrap_or(false))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod driver_error_tests {
        use super::*;

        #[test]
        fn test_fatal_classification() {
            assert!(DriverError::navigation("net::ERR_CONNECTION_REFUSED").is_fatal());
            assert!(DriverError::crashed("target closed").is_fatal());
            assert!(DriverError::new(DriverErrorKind::LaunchFailed, "no chrome").is_fatal());
            assert!(DriverError::new(DriverErrorKind::Protocol, "ws closed").is_fatal());
            assert!(!DriverError::detached("gone").is_fatal());
            assert!(!DriverError::not_interactable("opacity 0").is_fatal());
            assert!(!DriverError::unsupported(":has()").is_fatal());
            assert!(!DriverError::new(DriverErrorKind::ScreenshotFailed, "disk").is_fatal());
            assert!(!DriverError::new(DriverErrorKind::Timeout, "5s").is_fatal());
        }

        #[test]
        fn test_display() {
            let err = DriverError::detached("node removed");
            assert_eq!(err.to_string(), "element detached: node removed");
        }
    }

    mod load_state_tests {
        use super::*;

        #[test]
        fn test_wire_names() {
            let parsed: LoadState = serde_yaml_ng::from_str("networkidle").unwrap_or_default();
            assert_eq!(parsed, LoadState::NetworkIdle);
            assert_eq!(LoadState::DomContentLoaded.to_string(), "domcontentloaded");
        }
    }

    mod innermost_tests {
        use super::*;

        #[test]
        fn test_wrapper_is_dropped_for_nested_match() {
            // <div><h3>AAPL</h3><button>View Details</button></div>
            let parents = [None, Some(0), Some(0)];
            assert_eq!(innermost(&parents, &[true, false, true]), vec![2]);
        }

        #[test]
        fn test_every_ancestor_is_dropped() {
            let parents = [None, Some(0), Some(1), Some(2)];
            assert_eq!(innermost(&parents, &[true, true, true, true]), vec![3]);
        }

        #[test]
        fn test_siblings_survive() {
            let parents = [None, Some(0), Some(0)];
            assert_eq!(innermost(&parents, &[false, true, true]), vec![1, 2]);
            assert_eq!(innermost(&parents, &[true, false, false]), vec![0]);
        }

        #[test]
        fn test_out_of_range_parent_ignored() {
            assert_eq!(innermost(&[Some(9)], &[true]), vec![0]);
        }
    }

    mod truncate_tests {
        use super::*;

        #[test]
        fn test_truncate_chars() {
            assert_eq!(truncate_chars("abcdef", 3), "abc…");
            assert_eq!(truncate_chars("abc", 3), "abc");
            assert_eq!(truncate_chars("ééé", 2), "éé…");
        }
    }

    #[test]
    fn test_default_viewport() {
        assert_eq!(Viewport::default(), Viewport::new(1280, 800));
    }

    #[test]
    fn test_click_options() {
        assert!(ClickOptions::forced().force);
        assert!(!ClickOptions::default().force);
    }
}
