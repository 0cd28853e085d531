//! In-memory driver for unit and integration tests.
//!
//! A [`MockPage`] is a blueprint: a flat list of [`MockElement`]s with parent
//! links, plus fault injection. [`MockProvider`] clones the blueprint into a
//! fresh [`MockDriver`] on every acquisition, so concurrent scenarios never
//! share state.
//!
//! Time-dependent behaviour (`appear_after`, `text_after`) is measured on
//! tokio's clock from the last navigation, so tests using paused time are
//! deterministic.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::{
    innermost, ClickOptions, DriverError, DriverErrorKind, DriverProvider, DriverResult,
    ElementQuery, ElementRef, LoadState, ScrollPosition, VerifyDriver, Viewport,
};
use crate::locator::Strategy;

const WAIT_POLL: Duration = Duration::from_millis(50);

/// State change applied when an element is hovered or clicked
#[derive(Debug, Clone, PartialEq)]
pub enum MockEffect {
    /// Make an element displayed and fully opaque
    Reveal(ElementRef),
    /// Hide an element
    Hide(ElementRef),
    /// Replace an element's text
    SetText(ElementRef, String),
    /// Set an attribute value
    SetAttribute(ElementRef, String, String),
    /// Append a new element
    Insert(MockElement),
    /// Remove an element from the document
    Remove(ElementRef),
}

/// One element of the in-memory document
#[derive(Debug, Clone, PartialEq)]
pub struct MockElement {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    text: String,
    role: Option<String>,
    name: Option<String>,
    title: Option<String>,
    attributes: BTreeMap<String, String>,
    parent: Option<usize>,
    displayed: bool,
    opacity: f64,
    occluded: bool,
    appear_after: Option<Duration>,
    text_after: Option<(Duration, String)>,
    on_hover: Vec<MockEffect>,
    on_click: Vec<MockEffect>,
    detaches_on_click: bool,
}

impl MockElement {
    /// Element with the given tag name
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            id: None,
            classes: Vec::new(),
            text: String::new(),
            role: None,
            name: None,
            title: None,
            attributes: BTreeMap::new(),
            parent: None,
            displayed: true,
            opacity: 1.0,
            occluded: false,
            appear_after: None,
            text_after: None,
            on_hover: Vec::new(),
            on_click: Vec::new(),
            detaches_on_click: false,
        }
    }

    /// `<button>` with text
    #[must_use]
    pub fn button(text: impl Into<String>) -> Self {
        Self::new("button").text(text)
    }

    /// Element id
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Space-separated class list
    #[must_use]
    pub fn class(mut self, classes: &str) -> Self {
        self.classes
            .extend(classes.split_whitespace().map(ToString::to_string));
        self
    }

    /// Own text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Explicit ARIA role
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Accessible name (defaults to `aria-label`, text, then title)
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `title` attribute
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Arbitrary attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Nest inside `parent`
    #[must_use]
    pub fn child_of(mut self, parent: &ElementRef) -> Self {
        self.parent = index_of(parent);
        self
    }

    /// `display: none`
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// CSS opacity
    #[must_use]
    pub const fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    /// Another element covers this one's hit point
    #[must_use]
    pub const fn occluded(mut self) -> Self {
        self.occluded = true;
        self
    }

    /// Attach only after `delay` has passed since navigation (or insertion)
    #[must_use]
    pub const fn appear_after(mut self, delay: Duration) -> Self {
        self.appear_after = Some(delay);
        self
    }

    /// Replace the text once `delay` has passed since navigation (or insertion)
    #[must_use]
    pub fn text_after(mut self, delay: Duration, text: impl Into<String>) -> Self {
        self.text_after = Some((delay, text.into()));
        self
    }

    /// Effect applied on hover
    #[must_use]
    pub fn on_hover(mut self, effect: MockEffect) -> Self {
        self.on_hover.push(effect);
        self
    }

    /// Effect applied after a successful click
    #[must_use]
    pub fn on_click(mut self, effect: MockEffect) -> Self {
        self.on_click.push(effect);
        self
    }

    /// The element is removed from the document while being clicked
    #[must_use]
    pub const fn detaches_on_click(mut self) -> Self {
        self.detaches_on_click = true;
        self
    }

    fn implicit_role(&self) -> Option<&str> {
        if let Some(role) = &self.role {
            return Some(role);
        }
        match self.tag.as_str() {
            "button" => Some("button"),
            "a" if self.attributes.contains_key("href") => Some("link"),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some("heading"),
            "img" => Some("img"),
            "table" => Some("table"),
            "tr" => Some("row"),
            "td" => Some("cell"),
            "th" => Some("columnheader"),
            "nav" => Some("navigation"),
            "dialog" => Some("dialog"),
            "input" => Some("textbox"),
            _ => None,
        }
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.clone(),
            "class" if !self.classes.is_empty() => Some(self.classes.join(" ")),
            "title" => self.title.clone(),
            "role" => self.role.clone(),
            _ => self.attributes.get(name).cloned(),
        }
    }
}

/// Blueprint for the document a [`MockDriver`] serves
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    elements: Vec<MockElement>,
    navigation_failure: Option<String>,
    crash_after: Option<usize>,
    screenshot_failure: bool,
    screenshot_delay: Option<Duration>,
}

impl MockPage {
    /// Empty page
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element, returning its handle
    pub fn add(&mut self, element: MockElement) -> ElementRef {
        self.elements.push(element);
        handle(self.elements.len() - 1)
    }

    /// Builder form of [`MockPage::add`]
    #[must_use]
    pub fn with(mut self, element: MockElement) -> Self {
        self.add(element);
        self
    }

    /// Every navigation fails
    #[must_use]
    pub fn fail_navigation(mut self, message: impl Into<String>) -> Self {
        self.navigation_failure = Some(message.into());
        self
    }

    /// The page crashes after `calls` driver calls
    #[must_use]
    pub const fn crash_after(mut self, calls: usize) -> Self {
        self.crash_after = Some(calls);
        self
    }

    /// Every screenshot fails
    #[must_use]
    pub const fn fail_screenshots(mut self) -> Self {
        self.screenshot_failure = true;
        self
    }

    /// Every screenshot takes `delay` before it is written
    #[must_use]
    pub const fn slow_screenshots(mut self, delay: Duration) -> Self {
        self.screenshot_delay = Some(delay);
        self
    }
}

#[derive(Debug)]
struct MockNode {
    element: MockElement,
    inserted_at: Instant,
    removed: bool,
}

#[derive(Debug)]
struct MockState {
    nodes: Vec<MockNode>,
    current_url: Option<String>,
    viewport: Viewport,
    scroll: Option<ScrollPosition>,
    styles: Vec<String>,
    closed: bool,
    calls: usize,
}

/// In-memory [`VerifyDriver`]
#[derive(Debug)]
pub struct MockDriver {
    state: Mutex<MockState>,
    call_history: Mutex<Vec<String>>,
    navigation_failure: Option<String>,
    crash_after: Option<usize>,
    screenshot_failure: bool,
    screenshot_delay: Option<Duration>,
    stats: Arc<MockStats>,
}

impl MockDriver {
    /// Driver serving `page`
    #[must_use]
    pub fn new(page: MockPage) -> Self {
        Self::with_stats(page, Arc::new(MockStats::default()))
    }

    fn with_stats(page: MockPage, stats: Arc<MockStats>) -> Self {
        let now = Instant::now();
        let nodes = page
            .elements
            .into_iter()
            .map(|element| MockNode {
                element,
                inserted_at: now,
                removed: false,
            })
            .collect();
        Self {
            state: Mutex::new(MockState {
                nodes,
                current_url: None,
                viewport: Viewport::default(),
                scroll: None,
                styles: Vec::new(),
                closed: false,
                calls: 0,
            }),
            call_history: Mutex::new(Vec::new()),
            navigation_failure: page.navigation_failure,
            crash_after: page.crash_after,
            screenshot_failure: page.screenshot_failure,
            screenshot_delay: page.screenshot_delay,
            stats,
        }
    }

    /// Recorded calls, e.g. `"click:mock-3:force"`
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check if a call with this prefix was recorded
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.history().iter().any(|c| c.starts_with(prefix))
    }

    /// Last navigated URL
    #[must_use]
    pub fn current_url(&self) -> Option<String> {
        self.lock_state().current_url.clone()
    }

    /// Current viewport
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.lock_state().viewport
    }

    /// Last page scroll
    #[must_use]
    pub fn scroll_position(&self) -> Option<ScrollPosition> {
        self.lock_state().scroll
    }

    /// Stylesheets injected with `add_style`
    #[must_use]
    pub fn injected_styles(&self) -> Vec<String> {
        self.lock_state().styles.clone()
    }

    /// Current text of an element, ignoring visibility
    #[must_use]
    pub fn text_of(&self, element: &ElementRef) -> Option<String> {
        let state = self.lock_state();
        let now = Instant::now();
        index_of(element)
            .and_then(|i| state.nodes.get(i))
            .map(|node| rendered_text(node, now))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and apply crash/closed checks
    fn enter(&self, call: String) -> DriverResult<std::sync::MutexGuard<'_, MockState>> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        let mut state = self.lock_state();
        state.calls += 1;
        if state.closed {
            return Err(DriverError::crashed("page has been closed"));
        }
        if let Some(limit) = self.crash_after {
            if state.calls > limit {
                return Err(DriverError::crashed(format!(
                    "target crashed after {limit} calls"
                )));
            }
        }
        Ok(state)
    }
}

#[async_trait]
impl VerifyDriver for MockDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.enter(format!("navigate:{url}"))?;
        if let Some(message) = &self.navigation_failure {
            return Err(DriverError::navigation(format!("{url}: {message}")));
        }
        let now = Instant::now();
        for node in &mut state.nodes {
            node.inserted_at = now;
        }
        state.current_url = Some(url.to_string());
        Ok(())
    }

    async fn query_elements(&self, query: &ElementQuery) -> DriverResult<Vec<ElementRef>> {
        let scope = query.scope.as_ref().map_or_else(String::new, |s| format!("@{s}"));
        let state = self.enter(format!("query:{}{scope}", query.strategy))?;
        let now = Instant::now();
        let scope_index = match &query.scope {
            Some(scope) => Some(attached_index(&state, scope, now)?),
            None => None,
        };
        let selector = match &query.strategy {
            Strategy::Css(css) => Some(Selector::parse(css)?),
            _ => None,
        };

        let mut hits = vec![false; state.nodes.len()];
        for (i, node) in state.nodes.iter().enumerate() {
            if !is_attached(&state, i, now) {
                continue;
            }
            if let Some(scope) = scope_index {
                if !is_descendant(&state, i, scope) {
                    continue;
                }
            }
            hits[i] = match (&query.strategy, &selector) {
                (_, Some(selector)) => selector.matches(&state, i),
                (Strategy::Text(m), None) => {
                    let text = inner_text(&state, i, now);
                    !text.is_empty() && m.matches(&text)
                }
                (Strategy::Role { role, name }, None) => {
                    node.element.implicit_role() == Some(role.as_str())
                        && name
                            .as_ref()
                            .map_or(true, |m| m.matches(&accessible_name(node, now)))
                }
                (Strategy::Title(m), None) => {
                    node.element.title.as_deref().is_some_and(|t| m.matches(t))
                }
                (
                    Strategy::AttributeSubstring {
                        attribute,
                        substring,
                    },
                    None,
                ) => node
                    .element
                    .attribute(attribute)
                    .is_some_and(|v| v.contains(substring.as_str())),
                (Strategy::Css(_), None) => false,
            };
        }
        let selected = if matches!(query.strategy, Strategy::Text(_)) {
            let parents: Vec<Option<usize>> =
                state.nodes.iter().map(|node| node.element.parent).collect();
            innermost(&parents, &hits)
        } else {
            (0..hits.len()).filter(|i| hits[*i]).collect()
        };
        Ok(selected.into_iter().map(handle).collect())
    }

    async fn get_attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let state = self.enter(format!("get_attribute:{element}:{name}"))?;
        let i = attached_index(&state, element, Instant::now())?;
        Ok(state.nodes[i].element.attribute(name))
    }

    async fn get_text(&self, element: &ElementRef) -> DriverResult<String> {
        let state = self.enter(format!("get_text:{element}"))?;
        let now = Instant::now();
        let i = attached_index(&state, element, now)?;
        Ok(rendered_text(&state.nodes[i], now))
    }

    async fn is_visible(&self, element: &ElementRef) -> DriverResult<bool> {
        let state = self.enter(format!("is_visible:{element}"))?;
        let now = Instant::now();
        Ok(match index_of(element) {
            Some(i) if is_attached(&state, i, now) => is_visible(&state, i),
            _ => false,
        })
    }

    async fn click(&self, element: &ElementRef, options: ClickOptions) -> DriverResult<()> {
        let suffix = if options.force { ":force" } else { "" };
        let mut state = self.enter(format!("click:{element}{suffix}"))?;
        let now = Instant::now();
        let i = attached_index(&state, element, now)?;
        if !options.force {
            if !is_visible(&state, i) {
                return Err(DriverError::not_interactable(format!(
                    "{element} is not visible"
                )));
            }
            if state.nodes[i].element.occluded {
                return Err(DriverError::not_interactable(format!(
                    "{element} is covered by another element"
                )));
            }
        }
        if state.nodes[i].element.detaches_on_click {
            state.nodes[i].removed = true;
            return Err(DriverError::detached(format!(
                "{element} was removed from the document during click"
            )));
        }
        let effects = state.nodes[i].element.on_click.clone();
        apply_effects(&mut state, effects, now);
        Ok(())
    }

    async fn hover(&self, element: &ElementRef) -> DriverResult<()> {
        let mut state = self.enter(format!("hover:{element}"))?;
        let now = Instant::now();
        let i = attached_index(&state, element, now)?;
        if !is_visible(&state, i) {
            return Err(DriverError::not_interactable(format!(
                "{element} is not visible"
            )));
        }
        let effects = state.nodes[i].element.on_hover.clone();
        apply_effects(&mut state, effects, now);
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> DriverResult<()> {
        let mut state = self.enter(format!("fill:{element}:{text}"))?;
        let i = attached_index(&state, element, Instant::now())?;
        if !is_visible(&state, i) {
            return Err(DriverError::not_interactable(format!(
                "{element} is not visible"
            )));
        }
        state.nodes[i]
            .element
            .attributes
            .insert("value".to_string(), text.to_string());
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> DriverResult<()> {
        let state = self.enter(format!("scroll_into_view:{element}"))?;
        attached_index(&state, element, Instant::now())?;
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()> {
        let mut state = self.enter(format!(
            "set_viewport:{}x{}",
            viewport.width, viewport.height
        ))?;
        state.viewport = viewport;
        Ok(())
    }

    async fn scroll_page(&self, position: ScrollPosition) -> DriverResult<()> {
        let mut state = self.enter(format!("scroll_page:{position:?}"))?;
        state.scroll = Some(position);
        Ok(())
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> DriverResult<()> {
        let call = format!("screenshot:{}:{full_page}", path.display());
        drop(self.enter(call)?);
        if let Some(delay) = self.screenshot_delay {
            tokio::time::sleep(delay).await;
        }
        if self.screenshot_failure {
            return Err(DriverError::new(
                DriverErrorKind::ScreenshotFailed,
                "mock screenshot failure",
            ));
        }
        tokio::fs::write(path, b"\x89PNG\r\n\x1a\nmock")
            .await
            .map_err(|e| DriverError::new(DriverErrorKind::ScreenshotFailed, e.to_string()))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        drop(self.enter(format!("wait_for_selector:{selector}"))?);
        let parsed = Selector::parse(selector)?;
        let deadline = Instant::now() + timeout;
        loop {
            {
                let state = self.lock_state();
                let now = Instant::now();
                let found = (0..state.nodes.len())
                    .any(|i| is_attached(&state, i, now) && parsed.matches(&state, i));
                if found {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(DriverError::new(
                    DriverErrorKind::Timeout,
                    format!("{selector} not attached within {}ms", timeout.as_millis()),
                ));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    async fn wait_for_load_state(&self, state: LoadState, _timeout: Duration) -> DriverResult<()> {
        drop(self.enter(format!("wait_for_load_state:{state}"))?);
        Ok(())
    }

    async fn add_style(&self, css: &str) -> DriverResult<()> {
        let mut state = self.enter(format!("add_style:{}", css.len()))?;
        state.styles.push(css.to_string());
        Ok(())
    }

    async fn dom_excerpt(&self, max_chars: usize) -> DriverResult<String> {
        let state = self.enter("dom_excerpt".to_string())?;
        let now = Instant::now();
        let mut html = String::new();
        for (i, node) in state.nodes.iter().enumerate() {
            if !is_attached(&state, i, now) {
                continue;
            }
            let el = &node.element;
            html.push('<');
            html.push_str(&el.tag);
            if let Some(id) = &el.id {
                html.push_str(&format!(" id=\"{id}\""));
            }
            if !el.classes.is_empty() {
                html.push_str(&format!(" class=\"{}\"", el.classes.join(" ")));
            }
            html.push('>');
            html.push_str(&rendered_text(node, now));
            html.push_str(&format!("</{}>\n", el.tag));
        }
        Ok(super::truncate_chars(&html, max_chars))
    }

    async fn close(&self) -> DriverResult<()> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push("close".to_string());
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.lock_state().closed = true;
        Ok(())
    }
}

// ============================================================================
// Document helpers
// ============================================================================

fn handle(index: usize) -> ElementRef {
    ElementRef::new(format!("mock-{index}"))
}

fn index_of(element: &ElementRef) -> Option<usize> {
    element.as_str().strip_prefix("mock-")?.parse().ok()
}

fn is_attached(state: &MockState, index: usize, now: Instant) -> bool {
    let mut current = Some(index);
    while let Some(i) = current {
        let Some(node) = state.nodes.get(i) else {
            return false;
        };
        if node.removed {
            return false;
        }
        if let Some(delay) = node.element.appear_after {
            if now.duration_since(node.inserted_at) < delay {
                return false;
            }
        }
        current = node.element.parent;
    }
    true
}

fn attached_index(state: &MockState, element: &ElementRef, now: Instant) -> DriverResult<usize> {
    index_of(element)
        .filter(|i| is_attached(state, *i, now))
        .ok_or_else(|| DriverError::detached(format!("{element} is not attached")))
}

fn is_visible(state: &MockState, index: usize) -> bool {
    let mut current = Some(index);
    while let Some(i) = current {
        let el = &state.nodes[i].element;
        if !el.displayed || el.opacity <= 0.0 {
            return false;
        }
        current = el.parent;
    }
    true
}

fn is_descendant(state: &MockState, index: usize, ancestor: usize) -> bool {
    let mut current = state.nodes[index].element.parent;
    while let Some(i) = current {
        if i == ancestor {
            return true;
        }
        current = state.nodes[i].element.parent;
    }
    false
}

fn rendered_text(node: &MockNode, now: Instant) -> String {
    match &node.element.text_after {
        Some((delay, text)) if now.duration_since(node.inserted_at) >= *delay => text.clone(),
        _ => node.element.text.clone(),
    }
}

/// Own text followed by the text of attached descendants, like `innerText`
fn inner_text(state: &MockState, index: usize, now: Instant) -> String {
    state
        .nodes
        .iter()
        .enumerate()
        .filter(|(j, _)| *j == index || is_descendant(state, *j, index))
        .filter(|(j, _)| is_attached(state, *j, now))
        .map(|(_, node)| rendered_text(node, now))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn accessible_name(node: &MockNode, now: Instant) -> String {
    let el = &node.element;
    el.name
        .clone()
        .or_else(|| el.attributes.get("aria-label").cloned())
        .or_else(|| {
            let text = rendered_text(node, now);
            (!text.trim().is_empty()).then_some(text)
        })
        .or_else(|| el.title.clone())
        .unwrap_or_default()
}

fn apply_effects(state: &mut MockState, effects: Vec<MockEffect>, now: Instant) {
    for effect in effects {
        let target = |r: &ElementRef, state: &MockState| {
            index_of(r).filter(|i| *i < state.nodes.len())
        };
        match effect {
            MockEffect::Reveal(r) => {
                if let Some(i) = target(&r, state) {
                    let el = &mut state.nodes[i].element;
                    el.displayed = true;
                    el.opacity = 1.0;
                }
            }
            MockEffect::Hide(r) => {
                if let Some(i) = target(&r, state) {
                    state.nodes[i].element.displayed = false;
                }
            }
            MockEffect::SetText(r, text) => {
                if let Some(i) = target(&r, state) {
                    state.nodes[i].element.text = text;
                    state.nodes[i].element.text_after = None;
                }
            }
            MockEffect::SetAttribute(r, name, value) => {
                if let Some(i) = target(&r, state) {
                    state.nodes[i].element.attributes.insert(name, value);
                }
            }
            MockEffect::Insert(element) => state.nodes.push(MockNode {
                element,
                inserted_at: now,
                removed: false,
            }),
            MockEffect::Remove(r) => {
                if let Some(i) = target(&r, state) {
                    state.nodes[i].removed = true;
                }
            }
        }
    }
}

// ============================================================================
// Minimal CSS selector matching
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, AttrOp)>,
}

impl Compound {
    fn matches(&self, el: &MockElement) -> bool {
        self.tag.as_ref().map_or(true, |t| t == "*" || *t == el.tag)
            && self.id.as_ref().map_or(true, |id| el.id.as_ref() == Some(id))
            && self.classes.iter().all(|c| el.classes.contains(c))
            && self.attrs.iter().all(|(name, op)| {
                let value = el.attribute(name);
                match op {
                    AttrOp::Exists => value.is_some(),
                    AttrOp::Equals(v) => value.as_deref() == Some(v.as_str()),
                    AttrOp::Contains(v) => value.is_some_and(|a| a.contains(v.as_str())),
                    AttrOp::Prefix(v) => value.is_some_and(|a| a.starts_with(v.as_str())),
                }
            })
    }
}

/// Selector list; each entry is a chain of compounds joined by descendant combinators
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selector(Vec<Vec<Compound>>);

impl Selector {
    fn parse(source: &str) -> DriverResult<Self> {
        let unsupported = |why: &str| DriverError::unsupported(format!("selector {source:?}: {why}"));
        let mut groups = Vec::new();
        for group in source.split(',') {
            let mut chain = Vec::new();
            for part in split_outside_brackets(group) {
                chain.push(parse_compound(&part).map_err(|why| unsupported(&why))?);
            }
            if chain.is_empty() {
                return Err(unsupported("empty selector"));
            }
            groups.push(chain);
        }
        Ok(Self(groups))
    }

    fn matches(&self, state: &MockState, index: usize) -> bool {
        self.0.iter().any(|chain| chain_matches(chain, state, index))
    }
}

fn chain_matches(chain: &[Compound], state: &MockState, index: usize) -> bool {
    let Some((last, ancestors)) = chain.split_last() else {
        return false;
    };
    if !last.matches(&state.nodes[index].element) {
        return false;
    }
    let mut remaining = ancestors.iter().rev().peekable();
    let mut current = state.nodes[index].element.parent;
    while let Some(compound) = remaining.peek() {
        let Some(i) = current else {
            return false;
        };
        if compound.matches(&state.nodes[i].element) {
            remaining.next();
        }
        current = state.nodes[i].element.parent;
    }
    true
}

fn split_outside_brackets(group: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in group.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c.is_whitespace() && depth == 0 {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if c == '\\' {
            chars.next();
            if let Some(escaped) = chars.next() {
                ident.push(escaped);
            }
        } else if c.is_alphanumeric() || c == '-' || c == '_' || c == '*' {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

fn parse_compound(part: &str) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let mut chars = part.chars().peekable();
    match chars.peek() {
        Some('>' | '+' | '~') => return Err("only descendant combinators are supported".into()),
        Some(c) if c.is_alphanumeric() || *c == '*' => {
            compound.tag = Some(parse_ident(&mut chars).to_lowercase());
        }
        _ => {}
    }
    while let Some(c) = chars.next() {
        match c {
            '#' => compound.id = Some(parse_ident(&mut chars)),
            '.' => compound.classes.push(parse_ident(&mut chars)),
            '[' => {
                let body: String = chars.by_ref().take_while(|c| *c != ']').collect();
                compound.attrs.push(parse_attribute(&body)?);
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }
    Ok(compound)
}

fn parse_attribute(body: &str) -> Result<(String, AttrOp), String> {
    let unquote = |v: &str| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
    if let Some((name, value)) = body.split_once("*=") {
        return Ok((name.trim().to_string(), AttrOp::Contains(unquote(value))));
    }
    if let Some((name, value)) = body.split_once("^=") {
        return Ok((name.trim().to_string(), AttrOp::Prefix(unquote(value))));
    }
    if let Some((name, value)) = body.split_once('=') {
        return Ok((name.trim().to_string(), AttrOp::Equals(unquote(value))));
    }
    let name = body.trim();
    if name.is_empty() {
        return Err("empty attribute selector".into());
    }
    Ok((name.to_string(), AttrOp::Exists))
}

// ============================================================================
// Provider
// ============================================================================

/// Acquisition counters shared between a [`MockProvider`] and its drivers
#[derive(Debug, Default)]
pub struct MockStats {
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
    closes: AtomicUsize,
    released_histories: Mutex<Vec<Vec<String>>>,
}

impl MockStats {
    /// Successful acquisitions
    #[must_use]
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Releases
    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Driver closes
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Call history of every released driver, in release order
    #[must_use]
    pub fn released_histories(&self) -> Vec<Vec<String>> {
        self.released_histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// [`DriverProvider`] that serves a fresh copy of one [`MockPage`]
#[derive(Debug, Clone)]
pub struct MockProvider {
    page: MockPage,
    acquire_failure: Option<String>,
    release_delay: Option<Duration>,
    stats: Arc<MockStats>,
}

impl MockProvider {
    /// Provider for `page`
    #[must_use]
    pub fn new(page: MockPage) -> Self {
        Self {
            page,
            acquire_failure: None,
            release_delay: None,
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Every acquisition fails with a launch error
    #[must_use]
    pub fn fail_acquire(mut self, message: impl Into<String>) -> Self {
        self.acquire_failure = Some(message.into());
        self
    }

    /// Every release stalls for `delay` before closing the driver
    #[must_use]
    pub const fn slow_release(mut self, delay: Duration) -> Self {
        self.release_delay = Some(delay);
        self
    }

    /// Shared counters
    #[must_use]
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl DriverProvider for MockProvider {
    type Driver = MockDriver;

    async fn acquire(&self, _scenario: &str) -> DriverResult<MockDriver> {
        if let Some(message) = &self.acquire_failure {
            return Err(DriverError::new(DriverErrorKind::LaunchFailed, message.clone()));
        }
        self.stats.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(MockDriver::with_stats(
            self.page.clone(),
            Arc::clone(&self.stats),
        ))
    }

    async fn release(&self, driver: MockDriver) -> DriverResult<()> {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.release_delay {
            tokio::time::sleep(delay).await;
        }
        let result = driver.close().await;
        self.stats
            .released_histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(driver.history());
        result
    }
}
