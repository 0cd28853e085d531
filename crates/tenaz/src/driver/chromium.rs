//! Chromium driver over the DevTools protocol (chromiumoxide)
//!
//! Elements are addressed by a `data-tenaz-id` attribute stamped on them the
//! first time a query returns them. Handle lookups that find no attached
//! element report `ElementDetached`.
//!
//! Text, role-name and title matching happen on the Rust side with
//! [`TextMatch`], so a page and the in-memory mock agree on what matches.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{
    innermost, truncate_chars, ClickOptions, DriverError, DriverErrorKind, DriverProvider, DriverResult,
    ElementQuery, ElementRef, LoadState, ScrollPosition, VerifyDriver, Viewport,
};
use crate::config::EngineConfig;
use crate::locator::{Strategy, TextMatch};

const HANDLE_ATTRIBUTE: &str = "data-tenaz-id";

/// Poll interval for driver-side waits
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Quiet window for `networkidle`
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Clean shutdown budget when no provider sets one
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Collects candidate elements for a query and stamps handles on them.
///
/// Returns `{detached}` when the scope handle is gone, else
/// `{items: [{id, text}]}` where `text` is the string the Rust side matches
/// (rendered text, accessible name or title).
const COLLECT_JS: &str = r#"(q) => {
  const attr = 'data-tenaz-id';
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const stamp = (el) => {
    if (!el.getAttribute(attr)) {
      window.__tenazSeq = (window.__tenazSeq || 0) + 1;
      el.setAttribute(attr, 't' + window.__tenazSeq);
    }
    return el.getAttribute(attr);
  };
  let root = document;
  if (q.scope) {
    root = document.querySelector('[' + attr + '="' + q.scope + '"]');
    if (!root || !root.isConnected) return { detached: true };
  }
  const all = Array.from(root.querySelectorAll('*'));
  const implicitRole = (el) => {
    const explicit = el.getAttribute('role');
    if (explicit) return explicit;
    const tag = el.tagName.toLowerCase();
    if (tag === 'button') return 'button';
    if (tag === 'a' && el.hasAttribute('href')) return 'link';
    if (/^h[1-6]$/.test(tag)) return 'heading';
    if (tag === 'img') return 'img';
    if (tag === 'table') return 'table';
    if (tag === 'tr') return 'row';
    if (tag === 'td') return 'cell';
    if (tag === 'th') return 'columnheader';
    if (tag === 'nav') return 'navigation';
    if (tag === 'dialog') return 'dialog';
    if (tag === 'input') {
      const type = (el.getAttribute('type') || 'text').toLowerCase();
      if (['button', 'submit', 'reset'].includes(type)) return 'button';
      if (type === 'checkbox' || type === 'radio') return type;
      return 'textbox';
    }
    if (tag === 'textarea') return 'textbox';
    return null;
  };
  const accessibleName = (el) =>
    norm(el.getAttribute('aria-label')) || norm(el.innerText || el.textContent) || norm(el.getAttribute('title'));
  let items = [];
  switch (q.kind) {
    case 'css':
      items = Array.from(root.querySelectorAll(q.css)).map((el) => ({ el, text: null }));
      break;
    case 'attribute':
      items = all
        .filter((el) => (el.getAttribute(q.attribute) || '').includes(q.substring))
        .map((el) => ({ el, text: null }));
      break;
    case 'title':
      items = all.filter((el) => el.hasAttribute('title')).map((el) => ({ el, text: el.getAttribute('title') }));
      break;
    case 'role':
      items = all.filter((el) => implicitRole(el) === q.role).map((el) => ({ el, text: accessibleName(el) }));
      break;
    case 'text':
      items = all
        .filter((el) => !['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE'].includes(el.tagName))
        .map((el) => ({ el, text: norm(el.innerText || el.textContent) }))
        .filter(({ text }) => text.length > 0);
      break;
  }
  const position = new Map(items.map(({ el }, i) => [el, i]));
  const nearest = (el) => {
    for (let n = el.parentElement; n; n = n.parentElement) {
      if (position.has(n)) return position.get(n);
    }
    return null;
  };
  return { items: items.map(({ el, text }) => ({ id: stamp(el), text, parent: nearest(el) })) };
}"#;

/// Displayed, not transparent, not `visibility: hidden`, with a box
const VISIBLE_JS: &str = r"(el) => {
  for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
    const s = getComputedStyle(n);
    if (s.display === 'none' || parseFloat(s.opacity) === 0) return false;
  }
  if (getComputedStyle(el).visibility === 'hidden') return false;
  const r = el.getBoundingClientRect();
  return r.width > 0 && r.height > 0;
}";

/// Actionability for a non-forced click: visible and topmost at its center
const ACTIONABLE_JS: &str = r"(el) => {
  el.scrollIntoView({ block: 'center', inline: 'center' });
  const r = el.getBoundingClientRect();
  const hit = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
  if (!hit) return 'outside the viewport';
  if (hit === el || el.contains(hit)) return null;
  return 'covered by <' + hit.tagName.toLowerCase() + (hit.id ? '#' + hit.id : '') + '>';
}";

#[derive(Debug, Deserialize)]
struct Collected {
    #[serde(default)]
    detached: bool,
    #[serde(default)]
    items: Vec<CollectedItem>,
}

#[derive(Debug, Deserialize)]
struct CollectedItem {
    id: String,
    text: Option<String>,
    /// Position of the nearest collected ancestor
    #[serde(default)]
    parent: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ElementReply {
    #[serde(default)]
    detached: bool,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct LoadSnapshot {
    ready_state: String,
    resources: u64,
}

/// One browser with one page, owned by a single scenario run
#[derive(Debug)]
pub struct ChromiumDriver {
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
    close_timeout: Duration,
}

impl ChromiumDriver {
    /// Launch a browser and open a blank page
    pub async fn launch(
        headless: bool,
        sandbox: bool,
        viewport: Viewport,
        executable: Option<&Path>,
    ) -> DriverResult<Self> {
        let mut builder = BrowserConfig::builder().window_size(viewport.width, viewport.height);
        if !headless {
            builder = builder.with_head();
        }
        if !sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| DriverError::new(DriverErrorKind::LaunchFailed, e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::new(DriverErrorKind::LaunchFailed, e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(DriverError::new(DriverErrorKind::LaunchFailed, e.to_string()));
            }
        };
        let driver = Self {
            page,
            browser: Mutex::new(Some(browser)),
            handler,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        };
        driver.set_viewport(viewport).await?;
        Ok(driver)
    }

    /// Grace period for a clean shutdown before the process is killed
    #[must_use]
    pub const fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, expression: String) -> DriverResult<T> {
        self.page
            .evaluate(expression)
            .await
            .map_err(cdp_error)?
            .into_value()
            .map_err(|e| DriverError::new(DriverErrorKind::Protocol, e.to_string()))
    }

    /// Run `body_js` (a function of the element) against a handle
    async fn on_element(&self, element: &ElementRef, body_js: &str) -> DriverResult<Value> {
        let expression = format!(
            "(() => {{ const el = document.querySelector('[{HANDLE_ATTRIBUTE}=\"' + {id} + '\"]'); \
             if (!el || !el.isConnected) return {{ detached: true }}; \
             return {{ value: ({body_js})(el) }}; }})()",
            id = json!(element.as_str()),
        );
        let reply: ElementReply = self.evaluate(expression).await?;
        if reply.detached {
            return Err(DriverError::detached(format!("{element} is not attached")));
        }
        Ok(reply.value)
    }

    async fn find(&self, element: &ElementRef) -> DriverResult<chromiumoxide::element::Element> {
        self.page
            .find_element(selector_for(element))
            .await
            .map_err(|e| DriverError::detached(format!("{element}: {e}")))
    }

    async fn require_visible(&self, element: &ElementRef) -> DriverResult<()> {
        if self.is_visible(element).await? {
            Ok(())
        } else {
            Err(DriverError::not_interactable(format!("{element} is not visible")))
        }
    }
}

#[async_trait]
impl VerifyDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::navigation(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn query_elements(&self, query: &ElementQuery) -> DriverResult<Vec<ElementRef>> {
        let (request, matcher) = collect_request(&query.strategy);
        let mut request = request;
        if let Some(scope) = &query.scope {
            request["scope"] = json!(scope.as_str());
        }
        let collected: Collected = self
            .evaluate(format!("({COLLECT_JS})({request})"))
            .await?;
        if collected.detached {
            return Err(DriverError::detached("query scope is no longer attached"));
        }
        let innermost_only = matches!(query.strategy, Strategy::Text(_));
        Ok(select_items(collected.items, matcher, innermost_only))
    }

    async fn get_attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let body = format!("(el) => el.getAttribute({})", json!(name));
        let value = self.on_element(element, &body).await?;
        Ok(value.as_str().map(String::from))
    }

    async fn get_text(&self, element: &ElementRef) -> DriverResult<String> {
        let value = self
            .on_element(element, "(el) => el.innerText || el.textContent || ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_visible(&self, element: &ElementRef) -> DriverResult<bool> {
        match self.on_element(element, VISIBLE_JS).await {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(e) if e.kind == DriverErrorKind::ElementDetached => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn click(&self, element: &ElementRef, options: ClickOptions) -> DriverResult<()> {
        if options.force {
            self.on_element(element, "(el) => { el.click(); return null; }")
                .await?;
            return Ok(());
        }
        self.require_visible(element).await?;
        let blocked = self.on_element(element, ACTIONABLE_JS).await?;
        if let Some(reason) = blocked.as_str() {
            return Err(DriverError::not_interactable(format!("{element} {reason}")));
        }
        self.find(element)
            .await?
            .click()
            .await
            .map_err(|e| DriverError::new(DriverErrorKind::NotInteractable, e.to_string()))?;
        Ok(())
    }

    async fn hover(&self, element: &ElementRef) -> DriverResult<()> {
        self.require_visible(element).await?;
        self.find(element)
            .await?
            .hover()
            .await
            .map_err(|e| DriverError::new(DriverErrorKind::NotInteractable, e.to_string()))?;
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> DriverResult<()> {
        self.require_visible(element).await?;
        self.on_element(
            element,
            "(el) => { el.focus(); if ('value' in el) { el.value = ''; } return null; }",
        )
        .await?;
        self.find(element)
            .await?
            .type_str(text)
            .await
            .map_err(|e| DriverError::new(DriverErrorKind::NotInteractable, e.to_string()))?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> DriverResult<()> {
        self.on_element(
            element,
            "(el) => { el.scrollIntoView({ block: 'center' }); return null; }",
        )
        .await?;
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport.width))
            .height(i64::from(viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| DriverError::new(DriverErrorKind::Protocol, e))?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn scroll_page(&self, position: ScrollPosition) -> DriverResult<()> {
        let script = match position {
            ScrollPosition::Top => "window.scrollTo(0, 0); null",
            ScrollPosition::Bottom => {
                "window.scrollTo(0, document.documentElement.scrollHeight); null"
            }
        };
        self.page.evaluate(script).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> DriverResult<()> {
        let bytes = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(full_page).build())
            .await
            .map_err(|e| DriverError::new(DriverErrorKind::ScreenshotFailed, e.to_string()))?;
        tokio::fs::write(path, bytes).await.map_err(|e| {
            DriverError::new(
                DriverErrorKind::ScreenshotFailed,
                format!("{}: {e}", path.display()),
            )
        })
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        let start = Instant::now();
        let expression = format!("document.querySelector({}) !== null", json!(selector));
        loop {
            if self.evaluate::<bool>(expression.clone()).await? {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::new(
                    DriverErrorKind::Timeout,
                    format!("{selector} not attached within {}ms", timeout.as_millis()),
                ));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> DriverResult<()> {
        let start = Instant::now();
        let expression = "({ ready_state: document.readyState, \
             resources: performance.getEntriesByType('resource').length })"
            .to_string();
        let mut quiet_since: Option<(Instant, u64)> = None;
        loop {
            let snapshot: LoadSnapshot = self.evaluate(expression.clone()).await?;
            let ready = match state {
                LoadState::DomContentLoaded => snapshot.ready_state != "loading",
                LoadState::Load => snapshot.ready_state == "complete",
                LoadState::NetworkIdle => {
                    if snapshot.ready_state == "complete" {
                        match quiet_since {
                            Some((since, count)) if count == snapshot.resources => {
                                since.elapsed() >= NETWORK_IDLE_WINDOW
                            }
                            _ => {
                                quiet_since = Some((Instant::now(), snapshot.resources));
                                false
                            }
                        }
                    } else {
                        false
                    }
                }
            };
            if ready {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::new(
                    DriverErrorKind::Timeout,
                    format!("{state} not reached within {}ms", timeout.as_millis()),
                ));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    async fn add_style(&self, css: &str) -> DriverResult<()> {
        let expression = format!(
            "(() => {{ const s = document.createElement('style'); s.textContent = {}; \
             document.head.appendChild(s); return null; }})()",
            json!(css)
        );
        self.page.evaluate(expression).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn dom_excerpt(&self, max_chars: usize) -> DriverResult<String> {
        let html: String = self
            .evaluate("document.documentElement.outerHTML".to_string())
            .await?;
        Ok(truncate_chars(&html, max_chars))
    }

    async fn close(&self) -> DriverResult<()> {
        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => {
                let graceful = tokio::time::timeout(self.close_timeout, async {
                    let closed = browser.close().await.map(|_| ()).map_err(cdp_error);
                    if let Err(e) = browser.wait().await {
                        tracing::debug!(error = %e, "browser process wait failed");
                    }
                    closed
                })
                .await;
                match graceful {
                    Ok(closed) => closed,
                    Err(_) => {
                        tracing::warn!(
                            timeout_ms = self.close_timeout.as_millis() as u64,
                            "browser did not close in time, killing it"
                        );
                        if let Some(Err(e)) = browser.kill().await {
                            tracing::warn!(error = %e, "browser kill failed");
                        }
                        Err(DriverError::new(
                            DriverErrorKind::Timeout,
                            format!("browser close exceeded {}ms", self.close_timeout.as_millis()),
                        ))
                    }
                }
            }
            None => Ok(()),
        };
        self.handler.abort();
        result
    }
}

/// Query request for [`COLLECT_JS`] plus the Rust-side text matcher
fn collect_request(strategy: &Strategy) -> (Value, Option<&TextMatch>) {
    match strategy {
        Strategy::Text(m) => (json!({ "kind": "text" }), Some(m)),
        Strategy::Role { role, name } => (json!({ "kind": "role", "role": role }), name.as_ref()),
        Strategy::Title(m) => (json!({ "kind": "title" }), Some(m)),
        Strategy::Css(css) => (json!({ "kind": "css", "css": css }), None),
        Strategy::AttributeSubstring {
            attribute,
            substring,
        } => (
            json!({ "kind": "attribute", "attribute": attribute, "substring": substring }),
            None,
        ),
    }
}

/// Apply the matcher; text queries keep only the deepest hits, so a wrapper
/// whose `innerText` merely contains a matching child is dropped
fn select_items(
    items: Vec<CollectedItem>,
    matcher: Option<&TextMatch>,
    innermost_only: bool,
) -> Vec<ElementRef> {
    let hits: Vec<bool> = items
        .iter()
        .map(|item| match (matcher, &item.text) {
            (Some(m), Some(text)) => m.matches(text),
            (Some(_), None) => false,
            (None, _) => true,
        })
        .collect();
    let keep: Vec<usize> = if innermost_only {
        let parents: Vec<Option<usize>> = items.iter().map(|item| item.parent).collect();
        innermost(&parents, &hits)
    } else {
        (0..hits.len()).filter(|i| hits[*i]).collect()
    };
    let mut items: Vec<Option<CollectedItem>> = items.into_iter().map(Some).collect();
    keep.into_iter()
        .filter_map(|i| items.get_mut(i).and_then(Option::take))
        .map(|item| ElementRef::new(item.id))
        .collect()
}

fn selector_for(element: &ElementRef) -> String {
    format!("[{HANDLE_ATTRIBUTE}=\"{}\"]", element.as_str())
}

fn cdp_error(error: CdpError) -> DriverError {
    match error {
        // page script threw, e.g. an invalid selector
        CdpError::JavascriptException(details) => {
            DriverError::unsupported(format!("script error: {}", details.text))
        }
        other => DriverError::new(DriverErrorKind::Protocol, other.to_string()),
    }
}

/// Launches one isolated browser per scenario
#[derive(Debug, Clone)]
pub struct ChromiumProvider {
    headless: bool,
    sandbox: bool,
    viewport: Viewport,
    executable: Option<PathBuf>,
    close_timeout: Duration,
}

impl ChromiumProvider {
    /// Provider using the configured viewport and headless flag
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            headless: config.headless,
            sandbox: true,
            viewport: config.viewport,
            executable: None,
            // leaves the rest of the release budget for the kill
            close_timeout: config.release_timeout() / 2,
        }
    }

    /// Disable the Chromium sandbox (containers running as root)
    #[must_use]
    pub const fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Use a specific Chromium binary
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }
}

#[async_trait]
impl DriverProvider for ChromiumProvider {
    type Driver = ChromiumDriver;

    async fn acquire(&self, scenario: &str) -> DriverResult<ChromiumDriver> {
        tracing::debug!(scenario, headless = self.headless, "launching chromium");
        let driver = ChromiumDriver::launch(
            self.headless,
            self.sandbox,
            self.viewport,
            self.executable.as_deref(),
        )
        .await?;
        Ok(driver.with_close_timeout(self.close_timeout))
    }
}
