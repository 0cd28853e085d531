//! Locator model: ordered candidate strategies for one logical control.
//!
//! A [`TargetDescriptor`] names *one* control that the application may render
//! in several ways (a "Start Analysis" hero button on desktop, a bare "Start"
//! on mobile, an icon button carrying only a `title`). Candidates are tried in
//! order by the resolver; the first candidate that yields exactly one usable
//! element wins.
//!
//! # Design Philosophy
//!
//! - **Strict Selection**: more than one usable match without an explicit
//!   [`IndexSelector`] is an error, never a silent pick of the first element
//! - **Tagged Strategies**: alternatives are data, not cascading `if` branches
//! - **Scoped Lookup**: a descriptor may be resolved inside another one
//!   (`within`), e.g. a button inside the first card of a grid

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::result::{TenazError, TenazResult};

/// Compiled regular expression used for text matching.
///
/// Serialises as its source string; invalid sources are rejected when a
/// scenario document is parsed.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a pattern
    pub fn new(source: &str) -> TenazResult<Self> {
        Regex::new(source)
            .map(Self)
            .map_err(|e| TenazError::InvalidPattern {
                pattern: source.to_string(),
                message: e.to_string(),
            })
    }

    /// Pattern source
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Check whether the pattern matches anywhere in `text`
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.as_str()).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl TryFrom<String> for Pattern {
    type Error = TenazError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.as_str().to_string()
    }
}

/// How a text value is compared against rendered text.
///
/// Rendered text is whitespace-normalised (trimmed, runs collapsed to a single
/// space) before comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    /// Case-insensitive substring (the default)
    Contains(String),
    /// Whole text, case-sensitive
    Exact(String),
    /// Regular expression, matched anywhere in the text
    Pattern(Pattern),
}

impl TextMatch {
    /// Case-insensitive substring match
    #[must_use]
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    /// Exact match
    #[must_use]
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    /// Regular expression match
    pub fn pattern(source: &str) -> TenazResult<Self> {
        Pattern::new(source).map(Self::Pattern)
    }

    /// Alternation over a closed label set, e.g. risk levels:
    /// `one_of(&["Low", "Medium", "High"], " Risk")` matches "Medium Risk".
    pub fn one_of<S: AsRef<str>>(labels: &[S], suffix: &str) -> TenazResult<Self> {
        if labels.is_empty() {
            return Err(TenazError::InvalidPattern {
                pattern: String::new(),
                message: "label set must not be empty".to_string(),
            });
        }
        let alternatives: Vec<String> = labels
            .iter()
            .map(|label| regex::escape(label.as_ref()))
            .collect();
        let source = format!("(?:{}){}", alternatives.join("|"), regex::escape(suffix));
        Self::pattern(&source)
    }

    /// Check rendered text against this matcher
    #[must_use]
    pub fn matches(&self, rendered: &str) -> bool {
        let normalized = normalize_whitespace(rendered);
        match self {
            Self::Contains(needle) => normalized
                .to_lowercase()
                .contains(&normalize_whitespace(needle).to_lowercase()),
            Self::Exact(expected) => normalized == normalize_whitespace(expected),
            Self::Pattern(pattern) => pattern.is_match(&normalized),
        }
    }

    /// Raw value (text or pattern source)
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Contains(s) | Self::Exact(s) => s,
            Self::Pattern(p) => p.as_str(),
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(s) => write!(f, "~{s:?}"),
            Self::Exact(s) => write!(f, "{s:?}"),
            Self::Pattern(p) => write!(f, "/{}/", p.as_str()),
        }
    }
}

/// Collapse whitespace runs and trim, the way browsers expose `innerText`.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strategy used to query the DOM for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Visible text content
    Text(TextMatch),
    /// ARIA role, optionally filtered by accessible name
    Role {
        /// Role name (e.g. "button", "heading")
        role: String,
        /// Accessible name filter
        name: Option<TextMatch>,
    },
    /// `title` attribute
    Title(TextMatch),
    /// CSS selector
    Css(String),
    /// Attribute value containing a substring (e.g. `img[src*='logos']`)
    AttributeSubstring {
        /// Attribute name
        attribute: String,
        /// Substring the value must contain
        substring: String,
    },
}

impl Strategy {
    /// Strategy discriminant
    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::Text(_) => StrategyKind::Text,
            Self::Role { .. } => StrategyKind::Role,
            Self::Title(_) => StrategyKind::Title,
            Self::Css(_) => StrategyKind::Css,
            Self::AttributeSubstring { .. } => StrategyKind::AttributeSubstring,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(m) => write!(f, "text {m}"),
            Self::Role { role, name: None } => write!(f, "role={role}"),
            Self::Role {
                role,
                name: Some(name),
            } => write!(f, "role={role}[name {name}]"),
            Self::Title(m) => write!(f, "title {m}"),
            Self::Css(selector) => write!(f, "css {selector:?}"),
            Self::AttributeSubstring {
                attribute,
                substring,
            } => write!(f, "[{attribute}*={substring:?}]"),
        }
    }
}

/// Strategy discriminant, recorded in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// by-text
    Text,
    /// by-role+name
    Role,
    /// by-title
    Title,
    /// by-css
    Css,
    /// by-attribute-substring
    AttributeSubstring,
}

impl StrategyKind {
    /// Report label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "by-text",
            Self::Role => "by-role",
            Self::Title => "by-title",
            Self::Css => "by-css",
            Self::AttributeSubstring => "by-attribute-substring",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which element to take when several survive filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSelector {
    /// First in document order
    First,
    /// Last in document order
    Last,
    /// Zero-based position
    Nth(usize),
}

impl IndexSelector {
    /// Position to pick among `len` survivors, `None` if out of range
    #[must_use]
    pub const fn pick(self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        match self {
            Self::First => Some(0),
            Self::Last => Some(len - 1),
            Self::Nth(n) if n < len => Some(n),
            Self::Nth(_) => None,
        }
    }
}

impl fmt::Display for IndexSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Last => f.write_str("last"),
            Self::Nth(n) => write!(f, "nth={n}"),
        }
    }
}

/// Filters applied after the DOM query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    /// Drop elements that are attached but not visible
    pub require_visible: bool,
    /// Explicit disambiguation when multiplicity is expected
    pub index: Option<IndexSelector>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            require_visible: true,
            index: None,
        }
    }
}

/// One (strategy, constraints) pair tried by the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCandidate", into = "RawCandidate")]
pub struct CandidateLocator {
    /// How to query
    pub strategy: Strategy,
    /// How to filter the query result
    pub constraints: Constraints,
}

impl CandidateLocator {
    /// Candidate with default constraints
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            constraints: Constraints::default(),
        }
    }

    /// Substring text match
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Strategy::Text(TextMatch::contains(text)))
    }

    /// Exact text match
    #[must_use]
    pub fn exact_text(text: impl Into<String>) -> Self {
        Self::new(Strategy::Text(TextMatch::exact(text)))
    }

    /// Text match with an explicit matcher
    #[must_use]
    pub fn text_matching(matcher: TextMatch) -> Self {
        Self::new(Strategy::Text(matcher))
    }

    /// Role filtered by accessible name (substring)
    #[must_use]
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Strategy::Role {
            role: role.into(),
            name: Some(TextMatch::contains(name)),
        })
    }

    /// Role with any accessible name
    #[must_use]
    pub fn any_role(role: impl Into<String>) -> Self {
        Self::new(Strategy::Role {
            role: role.into(),
            name: None,
        })
    }

    /// `title` attribute (substring)
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self::new(Strategy::Title(TextMatch::contains(title)))
    }

    /// CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Css(selector.into()))
    }

    /// Attribute value containing `substring`
    #[must_use]
    pub fn attribute_contains(attribute: impl Into<String>, substring: impl Into<String>) -> Self {
        Self::new(Strategy::AttributeSubstring {
            attribute: attribute.into(),
            substring: substring.into(),
        })
    }

    /// Take the first survivor
    #[must_use]
    pub const fn first(self) -> Self {
        self.with_index(IndexSelector::First)
    }

    /// Take the last survivor
    #[must_use]
    pub const fn last(self) -> Self {
        self.with_index(IndexSelector::Last)
    }

    /// Take the survivor at `n`
    #[must_use]
    pub const fn nth(self, n: usize) -> Self {
        self.with_index(IndexSelector::Nth(n))
    }

    /// Set the index constraint
    #[must_use]
    pub const fn with_index(mut self, index: IndexSelector) -> Self {
        self.constraints.index = Some(index);
        self
    }

    /// Set the visibility requirement
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.constraints.require_visible = visible;
        self
    }

    /// Accept hidden elements (e.g. hover-revealed buttons that will be force-clicked)
    #[must_use]
    pub const fn any_visibility(self) -> Self {
        self.with_visible(false)
    }
}

impl fmt::Display for CandidateLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.strategy)?;
        if let Some(index) = self.constraints.index {
            write!(f, " ({index})")?;
        }
        if !self.constraints.require_visible {
            f.write_str(" (any visibility)")?;
        }
        Ok(())
    }
}

/// Ordered candidates for one logical control, optionally scoped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTarget", into = "RawTarget")]
pub struct TargetDescriptor {
    /// Candidates in priority order
    pub candidates: Vec<CandidateLocator>,
    /// Container the candidates are resolved in
    pub within: Option<Box<TargetDescriptor>>,
}

impl TargetDescriptor {
    /// Descriptor from an ordered candidate list
    #[must_use]
    pub fn new(candidates: Vec<CandidateLocator>) -> Self {
        Self {
            candidates,
            within: None,
        }
    }

    /// Descriptor with a single candidate
    #[must_use]
    pub fn single(candidate: CandidateLocator) -> Self {
        Self::new(vec![candidate])
    }

    /// Append a fallback candidate
    #[must_use]
    pub fn or(mut self, candidate: CandidateLocator) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Resolve the candidates inside `scope`
    #[must_use]
    pub fn within(mut self, scope: TargetDescriptor) -> Self {
        self.within = Some(Box::new(scope));
        self
    }

    /// True if any descriptor in the scope chain has no candidates
    #[must_use]
    pub fn has_empty_candidates(&self) -> bool {
        self.scope_chain().iter().any(|d| d.candidates.is_empty())
    }

    /// Descriptors from the outermost scope to `self`
    #[must_use]
    pub fn scope_chain(&self) -> Vec<&TargetDescriptor> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(scope) = current.within.as_deref() {
            chain.push(scope);
            current = scope;
        }
        chain.reverse();
        chain
    }
}

impl From<CandidateLocator> for TargetDescriptor {
    fn from(candidate: CandidateLocator) -> Self {
        Self::single(candidate)
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.candidates.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(" | "))?;
        if let Some(scope) = &self.within {
            write!(f, " within {scope}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Scenario-document representation
// ============================================================================

/// Flat YAML form of a candidate: exactly one of `text`, `role`, `title`,
/// `css`, `attribute` plus modifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contains: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    exact: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    regex: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<IndexSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visible: Option<bool>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl RawCandidate {
    fn text_match(&self, value: &str) -> TenazResult<TextMatch> {
        match (self.exact, self.regex) {
            (true, true) => Err(TenazError::InvalidPattern {
                pattern: value.to_string(),
                message: "`exact` and `regex` are mutually exclusive".to_string(),
            }),
            (true, false) => Ok(TextMatch::exact(value)),
            (false, true) => TextMatch::pattern(value),
            (false, false) => Ok(TextMatch::contains(value)),
        }
    }

    fn strategy(&self) -> TenazResult<Strategy> {
        let keys = [
            self.text.is_some(),
            self.role.is_some(),
            self.title.is_some(),
            self.css.is_some(),
            self.attribute.is_some(),
        ];
        if keys.iter().filter(|k| **k).count() != 1 {
            return Err(candidate_error(
                "exactly one of `text`, `role`, `title`, `css`, `attribute` is required",
            ));
        }
        if self.name.is_some() && self.role.is_none() {
            return Err(candidate_error("`name` is only valid with `role`"));
        }
        if self.contains.is_some() && self.attribute.is_none() {
            return Err(candidate_error("`contains` is only valid with `attribute`"));
        }

        if let Some(text) = &self.text {
            return Ok(Strategy::Text(self.text_match(text)?));
        }
        if let Some(role) = &self.role {
            let name = match &self.name {
                Some(name) => Some(self.text_match(name)?),
                None => None,
            };
            return Ok(Strategy::Role {
                role: role.clone(),
                name,
            });
        }
        if let Some(title) = &self.title {
            return Ok(Strategy::Title(self.text_match(title)?));
        }
        if let Some(css) = &self.css {
            return Ok(Strategy::Css(css.clone()));
        }
        let attribute = self.attribute.clone().unwrap_or_default();
        let substring = self
            .contains
            .clone()
            .ok_or_else(|| candidate_error("`attribute` requires `contains`"))?;
        Ok(Strategy::AttributeSubstring {
            attribute,
            substring,
        })
    }
}

fn candidate_error(message: &str) -> TenazError {
    TenazError::invalid_scenario("<candidate>", message)
}

impl TryFrom<RawCandidate> for CandidateLocator {
    type Error = TenazError;

    fn try_from(raw: RawCandidate) -> Result<Self, Self::Error> {
        let strategy = raw.strategy()?;
        Ok(Self {
            strategy,
            constraints: Constraints {
                require_visible: raw.visible.unwrap_or(true),
                index: raw.index,
            },
        })
    }
}

fn split_text_match(raw: &mut RawCandidate, matcher: TextMatch) -> String {
    match matcher {
        TextMatch::Contains(s) => s,
        TextMatch::Exact(s) => {
            raw.exact = true;
            s
        }
        TextMatch::Pattern(p) => {
            raw.regex = true;
            p.into()
        }
    }
}

impl From<CandidateLocator> for RawCandidate {
    fn from(candidate: CandidateLocator) -> Self {
        let mut raw = Self {
            index: candidate.constraints.index,
            visible: (!candidate.constraints.require_visible).then_some(false),
            ..Self::default()
        };
        match candidate.strategy {
            Strategy::Text(m) => raw.text = Some(split_text_match(&mut raw, m)),
            Strategy::Role { role, name } => {
                raw.role = Some(role);
                raw.name = name.map(|m| split_text_match(&mut raw, m));
            }
            Strategy::Title(m) => raw.title = Some(split_text_match(&mut raw, m)),
            Strategy::Css(selector) => raw.css = Some(selector),
            Strategy::AttributeSubstring {
                attribute,
                substring,
            } => {
                raw.attribute = Some(attribute);
                raw.contains = Some(substring);
            }
        }
        raw
    }
}

/// YAML form of a target: a bare candidate list, or a map with a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTarget {
    List(Vec<CandidateLocator>),
    Scoped {
        candidates: Vec<CandidateLocator>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        within: Option<Box<TargetDescriptor>>,
    },
}

impl TryFrom<RawTarget> for TargetDescriptor {
    type Error = TenazError;

    fn try_from(raw: RawTarget) -> Result<Self, Self::Error> {
        let (candidates, within) = match raw {
            RawTarget::List(candidates) => (candidates, None),
            RawTarget::Scoped { candidates, within } => (candidates, within),
        };
        if candidates.is_empty() {
            return Err(candidate_error("a target needs at least one candidate"));
        }
        Ok(Self { candidates, within })
    }
}

impl From<TargetDescriptor> for RawTarget {
    fn from(target: TargetDescriptor) -> Self {
        match target.within {
            None => Self::List(target.candidates),
            Some(within) => Self::Scoped {
                candidates: target.candidates,
                within: Some(within),
            },
        }
    }
}
