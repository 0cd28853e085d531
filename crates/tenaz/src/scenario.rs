//! Scenario documents
//!
//! A scenario is a named, ordered list of steps. It can be built in code or
//! loaded from YAML (several scenarios per file as separate documents).
//!
//! ```yaml
//! name: drawer layout
//! steps:
//!   - navigate: { url: /, wait_until: networkidle, ready: [{ text: Best, exact: true }] }
//!   - label: open drawer
//!     act: { action: click, target: [{ title: View Details, index: first }] }
//!   - assert:
//!       attribute:
//!         target: { within: [{ css: .fixed.bottom-0 }], candidates: [{ css: div.p-6 }] }
//!         name: class
//!         contains: lg:overflow-hidden
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::action::ActionKind;
use crate::assertion::{Condition, ExpectedText};
use crate::driver::{LoadState, Viewport};
use crate::locator::TargetDescriptor;
use crate::result::{TenazError, TenazResult};
use crate::wait::WaitClass;

/// Navigation with optional readiness checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawNavigate")]
pub struct NavigateStep {
    /// Absolute URL, or a path joined to the base URL
    pub url: String,
    /// Load milestone to wait for after navigating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_until: Option<LoadState>,
    /// Element that must resolve before the step passes (structural wait)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<TargetDescriptor>,
}

impl NavigateStep {
    /// Navigate to `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait_until: None,
            ready: None,
        }
    }

    /// Wait for a load milestone
    #[must_use]
    pub const fn wait_until(mut self, state: LoadState) -> Self {
        self.wait_until = Some(state);
        self
    }

    /// Require an element before passing
    #[must_use]
    pub fn ready(mut self, target: TargetDescriptor) -> Self {
        self.ready = Some(target);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNavigate {
    Url(String),
    Full {
        url: String,
        #[serde(default)]
        wait_until: Option<LoadState>,
        #[serde(default)]
        ready: Option<TargetDescriptor>,
    },
}

impl From<RawNavigate> for NavigateStep {
    fn from(raw: RawNavigate) -> Self {
        match raw {
            RawNavigate::Url(url) => Self::new(url),
            RawNavigate::Full {
                url,
                wait_until,
                ready,
            } => Self {
                url,
                wait_until,
                ready,
            },
        }
    }
}

/// Interaction with an optional target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActStep {
    /// Element to act on; page-level actions have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetDescriptor>,
    /// Action
    #[serde(flatten)]
    pub action: ActionKind,
}

/// Element wait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementWait {
    /// Element to wait for
    pub target: TargetDescriptor,
    /// Structural or data wait
    #[serde(default)]
    pub class: WaitClass,
    /// Override for the class timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Explicit wait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStep {
    /// Page load milestone (bounded by the data timeout)
    LoadState(LoadState),
    /// Element resolves under a wait class
    Element(ElementWait),
    /// CSS selector attaches (bounded by the structural timeout)
    Selector(String),
    /// Fixed delay for animations and transitions
    SettleMs(u64),
}

/// Step kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Navigate
    Navigate(NavigateStep),
    /// Locate and act
    Act(ActStep),
    /// Assert a condition
    Assert(Condition),
    /// Wait
    Wait(WaitStep),
}

/// One unit of a scenario
///
/// Parsing is strict: exactly one kind key, no unknown keys. For the short
/// `navigate: /path` form, sibling `wait_until` and `ready` keys belong to the
/// navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStep")]
pub struct Step {
    /// Label shown in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// What the step does
    #[serde(flatten)]
    pub kind: StepKind,
    /// Postcondition checked after the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Condition>,
    /// Keep going after a failure; defaults per kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_failure: Option<bool>,
}

impl Step {
    fn from_kind(kind: StepKind) -> Self {
        Self {
            label: None,
            kind,
            expect: None,
            continue_on_failure: None,
        }
    }

    /// Navigate to `url`
    #[must_use]
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::from_kind(StepKind::Navigate(NavigateStep::new(url)))
    }

    /// Navigate with options
    #[must_use]
    pub fn navigate_with(step: NavigateStep) -> Self {
        Self::from_kind(StepKind::Navigate(step))
    }

    /// Act on a target element
    #[must_use]
    pub fn act(action: ActionKind, target: TargetDescriptor) -> Self {
        Self::from_kind(StepKind::Act(ActStep {
            target: Some(target),
            action,
        }))
    }

    /// Page-level action without a target
    #[must_use]
    pub fn page_action(action: ActionKind) -> Self {
        Self::from_kind(StepKind::Act(ActStep {
            target: None,
            action,
        }))
    }

    /// Assert a condition
    #[must_use]
    pub fn assert(condition: Condition) -> Self {
        Self::from_kind(StepKind::Assert(condition))
    }

    /// Explicit wait
    #[must_use]
    pub fn wait(wait: WaitStep) -> Self {
        Self::from_kind(StepKind::Wait(wait))
    }

    /// Set the label
    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Failure does not abort the scenario
    #[must_use]
    pub const fn soft(mut self) -> Self {
        self.continue_on_failure = Some(true);
        self
    }

    /// Failure aborts the scenario
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.continue_on_failure = Some(false);
        self
    }

    /// Postcondition
    #[must_use]
    pub fn expecting(mut self, condition: Condition) -> Self {
        self.expect = Some(condition);
        self
    }

    /// Effective soft-fail flag: assertions are soft unless stated otherwise
    #[must_use]
    pub fn continue_on_failure(&self) -> bool {
        self.continue_on_failure
            .unwrap_or(matches!(self.kind, StepKind::Assert(_)))
    }

    /// Label, or a description derived from the step
    #[must_use]
    pub fn display_label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.kind {
            StepKind::Navigate(nav) => format!("navigate {}", nav.url),
            StepKind::Act(act) => match &act.target {
                Some(target) => format!("{} {target}", act.action.name()),
                None => act.action.name().to_string(),
            },
            StepKind::Assert(condition) => format!("assert {}", condition.describe()),
            StepKind::Wait(WaitStep::LoadState(state)) => format!("wait for {state}"),
            StepKind::Wait(WaitStep::Element(wait)) => format!("wait for {}", wait.target),
            StepKind::Wait(WaitStep::Selector(selector)) => format!("wait for {selector}"),
            StepKind::Wait(WaitStep::SettleMs(ms)) => format!("settle {ms}ms"),
        }
    }

    /// Every target and condition referenced by this step
    fn targets(&self) -> Vec<&TargetDescriptor> {
        let mut targets = Vec::new();
        match &self.kind {
            StepKind::Navigate(nav) => targets.extend(nav.ready.as_ref()),
            StepKind::Act(act) => targets.extend(act.target.as_ref()),
            StepKind::Assert(condition) => targets.push(condition.target()),
            StepKind::Wait(WaitStep::Element(wait)) => targets.push(&wait.target),
            StepKind::Wait(_) => {}
        }
        if let Some(condition) = &self.expect {
            targets.push(condition.target());
        }
        targets
    }

    fn conditions(&self) -> impl Iterator<Item = &Condition> {
        let own = match &self.kind {
            StepKind::Assert(condition) => Some(condition),
            _ => None,
        };
        own.into_iter().chain(self.expect.as_ref())
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    navigate: Option<NavigateStep>,
    #[serde(default)]
    act: Option<ActStep>,
    #[serde(default)]
    assert: Option<Condition>,
    #[serde(default)]
    wait: Option<WaitStep>,
    #[serde(default)]
    wait_until: Option<LoadState>,
    #[serde(default)]
    ready: Option<TargetDescriptor>,
    #[serde(default)]
    expect: Option<Condition>,
    #[serde(default)]
    continue_on_failure: Option<bool>,
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let mut kinds: Vec<StepKind> = Vec::new();
        kinds.extend(raw.navigate.map(StepKind::Navigate));
        kinds.extend(raw.act.map(StepKind::Act));
        kinds.extend(raw.assert.map(StepKind::Assert));
        kinds.extend(raw.wait.map(StepKind::Wait));
        if kinds.len() != 1 {
            return Err(format!(
                "a step needs exactly one of navigate, act, assert, wait (found {})",
                kinds.len()
            ));
        }
        let mut kind = kinds.remove(0);

        if raw.wait_until.is_some() || raw.ready.is_some() {
            let StepKind::Navigate(nav) = &mut kind else {
                return Err("wait_until and ready only apply to navigate steps".to_string());
            };
            if let Some(state) = raw.wait_until {
                if nav.wait_until.replace(state).is_some() {
                    return Err("wait_until is given twice".to_string());
                }
            }
            if let Some(target) = raw.ready {
                if nav.ready.replace(target).is_some() {
                    return Err("ready is given twice".to_string());
                }
            }
        }

        Ok(Self {
            label: raw.label,
            kind,
            expect: raw.expect,
            continue_on_failure: raw.continue_on_failure,
        })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_label())
    }
}

/// Named, ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Scenario name
    pub name: String,
    /// Overrides the configured base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Overrides the configured scenario timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Overrides the configured initial viewport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Empty scenario
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            timeout_ms: None,
            viewport: None,
            steps: Vec::new(),
        }
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Set base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set scenario timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Parse a single-scenario YAML document
    pub fn from_yaml(content: &str) -> TenazResult<Self> {
        let scenario: Self = serde_yaml_ng::from_str(content).map_err(malformed)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse every YAML document in `content`
    pub fn all_from_yaml(content: &str) -> TenazResult<Vec<Self>> {
        let mut scenarios = Vec::new();
        for document in serde_yaml_ng::Deserializer::from_str(content) {
            let value = serde_yaml_ng::Value::deserialize(document).map_err(malformed)?;
            if value.is_null() {
                continue;
            }
            let scenario: Self = serde_yaml_ng::from_value(value).map_err(malformed)?;
            scenario.validate()?;
            scenarios.push(scenario);
        }
        Ok(scenarios)
    }

    /// Load every scenario in a YAML file
    pub fn load(path: &Path) -> TenazResult<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        Self::all_from_yaml(&content).map_err(|e| match e {
            TenazError::Config { message } => {
                TenazError::config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Structural checks that do not need a browser
    pub fn validate(&self) -> TenazResult<()> {
        let invalid = |message: String| TenazError::invalid_scenario(&self.name, message);
        if self.name.trim().is_empty() {
            return Err(TenazError::invalid_scenario("<unnamed>", "name must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(invalid("no steps".to_string()));
        }
        if self.timeout_ms == Some(0) {
            return Err(invalid("timeout_ms must be greater than zero".to_string()));
        }
        if let Some(base) = &self.base_url {
            url::Url::parse(base)
                .map_err(|e| invalid(format!("base_url {base:?}: {e}")))?;
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.targets().iter().any(|t| t.has_empty_candidates()) {
                return Err(invalid(format!("step {index}: target has no candidates")));
            }
            if let StepKind::Act(act) = &step.kind {
                if act.action.needs_target() && act.target.is_none() {
                    return Err(invalid(format!(
                        "step {index}: {} needs a target",
                        act.action.name()
                    )));
                }
            }
            if let StepKind::Wait(WaitStep::Element(ElementWait {
                timeout_ms: Some(0),
                ..
            })) = &step.kind
            {
                return Err(invalid(format!("step {index}: timeout_ms must be greater than zero")));
            }
            for condition in step.conditions() {
                if let Condition::Text {
                    expect: expect @ ExpectedText::OneOf { .. },
                    ..
                } = condition
                {
                    expect
                        .matcher()
                        .map_err(|e| invalid(format!("step {index}: {e}")))?;
                }
            }
        }
        Ok(())
    }
}

/// Unparseable or unknown keys in a scenario document
fn malformed(error: serde_yaml_ng::Error) -> TenazError {
    TenazError::config(format!("malformed scenario: {error}"))
}

/// Join `url` to `base` unless it is already absolute
pub fn resolve_url(base: &str, url: &str) -> TenazResult<String> {
    if let Ok(absolute) = url::Url::parse(url) {
        return Ok(absolute.to_string());
    }
    let base = url::Url::parse(base)
        .map_err(|e| TenazError::config(format!("base_url {base:?}: {e}")))?;
    base.join(url)
        .map(|u| u.to_string())
        .map_err(|e| TenazError::config(format!("cannot join {url:?} to {base}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::locator::CandidateLocator;

    const DRAWER: &str = r#"
name: drawer layout
timeout_ms: 120000
steps:
  - navigate: { url: /, wait_until: networkidle, ready: [{ text: "Best", exact: true }] }
  - label: enter app
    act:
      action: click
      target: [{ role: button, name: "Start Analysis" }, { text: "Start" }]
    continue_on_failure: true
  - wait: { element: { target: [{ text: "Key Metrics" }], class: data } }
  - act: { action: click, target: [{ title: View Details, index: first }] }
    expect:
      visible: { target: [{ css: .fixed.bottom-0 }] }
  - assert:
      attribute:
        target: { within: [{ css: ".fixed.bottom-0" }], candidates: [{ css: "div.p-6" }] }
        name: class
        contains: lg:overflow-hidden
  - act: { action: screenshot, name: drawer }
  - wait: { settle_ms: 2000 }
"#;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_drawer_document() {
            let scenario = Scenario::from_yaml(DRAWER).unwrap();
            assert_eq!(scenario.steps.len(), 7);
            assert_eq!(scenario.timeout_ms, Some(120_000));

            let StepKind::Navigate(nav) = &scenario.steps[0].kind else {
                panic!("expected navigate");
            };
            assert_eq!(nav.wait_until, Some(LoadState::NetworkIdle));
            assert!(nav.ready.is_some());

            let StepKind::Act(act) = &scenario.steps[1].kind else {
                panic!("expected act");
            };
            assert_eq!(act.action, ActionKind::click());
            assert_eq!(act.target.as_ref().unwrap().candidates.len(), 2);
            assert!(scenario.steps[1].continue_on_failure());

            assert!(matches!(
                scenario.steps[2].kind,
                StepKind::Wait(WaitStep::Element(ElementWait {
                    class: WaitClass::Data,
                    ..
                }))
            ));
            assert!(scenario.steps[3].expect.is_some());
            assert!(scenario.steps[4].continue_on_failure());
            assert!(matches!(
                scenario.steps[6].kind,
                StepKind::Wait(WaitStep::SettleMs(2000))
            ));
        }

        #[test]
        fn test_short_navigate_takes_sibling_options() {
            let content = r#"
name: drawer layout
base_url: http://localhost:3000
timeout_ms: 120000
steps:
  - navigate: /
    wait_until: networkidle
    ready: [{ text: "Best", exact: true }]
  - label: enter app
    act:
      action: click
      target: [{ role: button, name: "Start Analysis" }, { text: "Start" }]
    continue_on_failure: true
  - wait: { element: { target: [{ text: "Key Metrics" }], class: data } }
  - assert:
      attribute:
        target: { within: [{ css: ".fixed.bottom-0" }], candidates: [{ css: "div.p-6" }] }
        name: class
        contains: lg:overflow-hidden
"#;
            let scenario = Scenario::from_yaml(content).unwrap();
            assert_eq!(scenario.steps.len(), 4);
            assert_eq!(scenario.base_url.as_deref(), Some("http://localhost:3000"));
            let expected = NavigateStep::new("/")
                .wait_until(LoadState::NetworkIdle)
                .ready(TargetDescriptor::single(CandidateLocator::exact_text("Best")));
            assert_eq!(scenario.steps[0].kind, StepKind::Navigate(expected));
            assert!(scenario.steps[1].continue_on_failure());
            assert!(scenario.steps[3].continue_on_failure());
        }

        #[test]
        fn test_misspelled_key_rejected() {
            let content = "name: s\nsteps:\n  - navigate: /\n    continue_on_falure: true\n";
            let err = Scenario::from_yaml(content).unwrap_err();
            assert!(matches!(err, TenazError::Config { .. }));
            assert!(err.to_string().contains("continue_on_falure"), "{err}");
        }

        #[test]
        fn test_navigate_options_on_other_kinds_rejected() {
            let content = "name: s\nsteps:\n  - act: { action: scroll_to_bottom }\n    wait_until: load\n";
            let err = Scenario::from_yaml(content).unwrap_err();
            assert!(err.to_string().contains("only apply to navigate"), "{err}");
        }

        #[test]
        fn test_duplicate_wait_until_rejected() {
            let content = "name: s\nsteps:\n  - navigate: { url: /, wait_until: load }\n    wait_until: networkidle\n";
            let err = Scenario::from_yaml(content).unwrap_err();
            assert!(err.to_string().contains("twice"), "{err}");
        }

        #[test]
        fn test_unknown_scenario_key_rejected() {
            let err = Scenario::from_yaml("name: s\ntimeout: 5\nsteps: [{ navigate: / }]\n").unwrap_err();
            assert!(err.to_string().contains("timeout"), "{err}");
        }

        #[test]
        fn test_step_with_two_kinds_rejected() {
            let content = "name: s\nsteps:\n  - navigate: /\n    wait: { settle_ms: 10 }\n";
            assert!(Scenario::from_yaml(content).is_err());
            assert!(Scenario::from_yaml("name: s\nsteps:\n  - label: nothing\n").is_err());
        }

        #[test]
        fn test_serialized_step_parses_back() {
            let step = Step::navigate_with(NavigateStep::new("/").wait_until(LoadState::Load))
                .labeled("home")
                .soft();
            let yaml = serde_yaml_ng::to_string(&step).unwrap();
            let parsed: Step = serde_yaml_ng::from_str(&yaml).unwrap();
            assert_eq!(parsed, step);
        }

        #[test]
        fn test_navigate_shorthand() {
            let scenario = Scenario::from_yaml("name: s\nsteps:\n  - navigate: /portfolio\n").unwrap();
            assert_eq!(
                scenario.steps[0].kind,
                StepKind::Navigate(NavigateStep::new("/portfolio"))
            );
        }

        #[test]
        fn test_multiple_documents() {
            let content = "name: a\nsteps: [{ navigate: / }]\n---\nname: b\nsteps: [{ navigate: /b }]\n";
            let scenarios = Scenario::all_from_yaml(content).unwrap();
            assert_eq!(scenarios.len(), 2);
            assert_eq!(scenarios[1].name, "b");
        }

        #[test]
        fn test_load_reports_path() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("broken.yaml");
            std::fs::write(&path, "name: x\nsteps: [{ teleport: / }]\n").unwrap();
            let err = Scenario::load(&path).unwrap_err();
            assert!(err.to_string().contains("broken.yaml"));
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn test_rejects_empty_steps() {
            assert!(Scenario::new("empty").validate().is_err());
        }

        #[test]
        fn test_rejects_zero_timeout() {
            let s = Scenario::new("s").step(Step::navigate("/")).with_timeout_ms(0);
            assert!(s.validate().is_err());
        }

        #[test]
        fn test_rejects_untargeted_click() {
            let s = Scenario::new("s").step(Step::page_action(ActionKind::click()));
            let err = s.validate().unwrap_err();
            assert!(err.to_string().contains("needs a target"));
        }

        #[test]
        fn test_rejects_empty_candidates_in_code() {
            let s = Scenario::new("s").step(Step::act(
                ActionKind::Hover,
                TargetDescriptor::new(Vec::new()),
            ));
            assert!(s.validate().is_err());
        }

        #[test]
        fn test_rejects_empty_label_set() {
            let s = Scenario::new("s").step(Step::assert(Condition::Text {
                target: TargetDescriptor::single(CandidateLocator::css("span")),
                expect: ExpectedText::OneOf {
                    labels: Vec::new(),
                    suffix: " Risk".into(),
                },
            }));
            assert!(s.validate().is_err());
        }
    }

    mod step_tests {
        use super::*;

        #[test]
        fn test_default_soft_flags() {
            assert!(!Step::navigate("/").continue_on_failure());
            assert!(!Step::page_action(ActionKind::ScrollToBottom).continue_on_failure());
            let assert = Step::assert(Condition::Visible {
                target: TargetDescriptor::single(CandidateLocator::text("Ready")),
            });
            assert!(assert.continue_on_failure());
            assert!(!assert.required().continue_on_failure());
        }

        #[test]
        fn test_display_label() {
            let step = Step::act(
                ActionKind::click(),
                TargetDescriptor::single(CandidateLocator::text("Load More")),
            );
            assert_eq!(step.display_label(), "click [text ~\"Load More\"]");
            assert_eq!(step.labeled("paginate").display_label(), "paginate");
        }
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("http://localhost:3000", "/portfolio").unwrap(),
            "http://localhost:3000/portfolio"
        );
        assert_eq!(
            resolve_url("http://localhost:3000", "https://example.com/x").unwrap(),
            "https://example.com/x"
        );
        assert!(resolve_url("not a url", "/x").is_err());
    }
}
