//! Engine configuration
//!
//! Loaded from YAML, then adjusted by environment variables and finally by
//! command-line flags. Every field has a default, so an empty document is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::action::DEFAULT_ACTION_TIMEOUT_MS;
use crate::diagnostics::{DEFAULT_DIAGNOSTICS_TIMEOUT_MS, DEFAULT_DOM_EXCERPT_CHARS};
use crate::driver::Viewport;
use crate::result::{TenazError, TenazResult};
use crate::wait::{
    WaitClass, WaitPolicy, DEFAULT_DATA_TIMEOUT_MS, DEFAULT_MAX_POLL_INTERVAL_MS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_SETTLE_MS, DEFAULT_STRUCTURAL_TIMEOUT_MS,
};

/// Default base URL of the application under test
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Default scenario bound (5 minutes)
pub const DEFAULT_SCENARIO_TIMEOUT_MS: u64 = 300_000;

/// Default bound for releasing a driver (10 seconds)
pub const DEFAULT_RELEASE_TIMEOUT_MS: u64 = 10_000;

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "TENAZ_BASE_URL";
/// Environment variable overriding `artifacts_dir`
pub const ENV_ARTIFACTS_DIR: &str = "TENAZ_ARTIFACTS_DIR";
/// Environment variable overriding `headless`
pub const ENV_HEADLESS: &str = "TENAZ_HEADLESS";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Base URL relative navigation targets are joined to
    pub base_url: String,
    /// Structural wait timeout (ms)
    pub structural_timeout_ms: u64,
    /// Data wait timeout (ms)
    pub data_timeout_ms: u64,
    /// Settle delay after data waits (ms)
    pub settle_ms: u64,
    /// Polling interval (ms)
    pub poll_interval_ms: u64,
    /// Backoff multiplier for the polling interval
    pub backoff_factor: f64,
    /// Cap for the backed-off polling interval (ms)
    pub max_poll_interval_ms: u64,
    /// Bound for a single action (ms)
    pub action_timeout_ms: u64,
    /// Bound for a whole scenario (ms)
    pub scenario_timeout_ms: u64,
    /// Bound for each diagnostics driver call (ms)
    pub diagnostics_timeout_ms: u64,
    /// Bound for releasing the driver after a run (ms)
    pub release_timeout_ms: u64,
    /// Directory for screenshots and sidecars
    pub artifacts_dir: PathBuf,
    /// Initial viewport
    pub viewport: Viewport,
    /// Run the browser without a window
    pub headless: bool,
    /// DOM excerpt length in diagnostics
    pub dom_excerpt_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            structural_timeout_ms: DEFAULT_STRUCTURAL_TIMEOUT_MS,
            data_timeout_ms: DEFAULT_DATA_TIMEOUT_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backoff_factor: 1.0,
            max_poll_interval_ms: DEFAULT_MAX_POLL_INTERVAL_MS,
            action_timeout_ms: DEFAULT_ACTION_TIMEOUT_MS,
            scenario_timeout_ms: DEFAULT_SCENARIO_TIMEOUT_MS,
            diagnostics_timeout_ms: DEFAULT_DIAGNOSTICS_TIMEOUT_MS,
            release_timeout_ms: DEFAULT_RELEASE_TIMEOUT_MS,
            artifacts_dir: PathBuf::from("verification"),
            viewport: Viewport::default(),
            headless: true,
            dom_excerpt_chars: DEFAULT_DOM_EXCERPT_CHARS,
        }
    }
}

impl EngineConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a YAML configuration file
    pub fn load(path: &Path) -> TenazResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TenazError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML configuration document
    pub fn from_yaml(content: &str) -> TenazResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml_ng::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TENAZ_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(dir) = lookup(ENV_ARTIFACTS_DIR).filter(|v| !v.is_empty()) {
            self.artifacts_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(ENV_HEADLESS) {
            match flag.to_ascii_lowercase().as_str() {
                "0" | "false" | "no" | "off" => self.headless = false,
                "1" | "true" | "yes" | "on" => self.headless = true,
                other => tracing::warn!(value = other, "ignoring unrecognised {ENV_HEADLESS}"),
            }
        }
        self
    }

    /// Set base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set artifacts directory
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set structural timeout
    #[must_use]
    pub const fn with_structural_timeout_ms(mut self, ms: u64) -> Self {
        self.structural_timeout_ms = ms;
        self
    }

    /// Set data timeout
    #[must_use]
    pub const fn with_data_timeout_ms(mut self, ms: u64) -> Self {
        self.data_timeout_ms = ms;
        self
    }

    /// Set settle delay
    #[must_use]
    pub const fn with_settle_ms(mut self, ms: u64) -> Self {
        self.settle_ms = ms;
        self
    }

    /// Set polling interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set action timeout
    #[must_use]
    pub const fn with_action_timeout_ms(mut self, ms: u64) -> Self {
        self.action_timeout_ms = ms;
        self
    }

    /// Set scenario timeout
    #[must_use]
    pub const fn with_scenario_timeout_ms(mut self, ms: u64) -> Self {
        self.scenario_timeout_ms = ms;
        self
    }

    /// Set release timeout
    #[must_use]
    pub const fn with_release_timeout_ms(mut self, ms: u64) -> Self {
        self.release_timeout_ms = ms;
        self
    }

    /// Reject settings that would make waits spin or never poll
    pub fn validate(&self) -> TenazResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(TenazError::config("poll_interval_ms must be greater than zero"));
        }
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            return Err(TenazError::config(format!(
                "backoff_factor must be at least 1.0, got {}",
                self.backoff_factor
            )));
        }
        for (name, value) in [
            ("structural_timeout_ms", self.structural_timeout_ms),
            ("data_timeout_ms", self.data_timeout_ms),
            ("action_timeout_ms", self.action_timeout_ms),
            ("scenario_timeout_ms", self.scenario_timeout_ms),
        ] {
            if value < self.poll_interval_ms {
                return Err(TenazError::config(format!(
                    "{name} ({value}) is shorter than poll_interval_ms ({})",
                    self.poll_interval_ms
                )));
            }
        }
        if self.release_timeout_ms == 0 {
            return Err(TenazError::config("release_timeout_ms must be greater than zero"));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(TenazError::config(format!(
                "base_url {:?} is not an absolute URL",
                self.base_url
            )));
        }
        Ok(())
    }

    /// Wait policy for a wait class
    #[must_use]
    pub fn policy(&self, class: WaitClass) -> WaitPolicy {
        let poll = Duration::from_millis(self.poll_interval_ms);
        let base = WaitPolicy::new(Duration::ZERO, poll).with_backoff(
            self.backoff_factor,
            Duration::from_millis(self.max_poll_interval_ms),
        );
        match class {
            WaitClass::Structural => {
                base.with_timeout(Duration::from_millis(self.structural_timeout_ms))
            }
            WaitClass::Data => base
                .with_timeout(Duration::from_millis(self.data_timeout_ms))
                .with_settle(Duration::from_millis(self.settle_ms)),
        }
    }

    /// Structural wait policy
    #[must_use]
    pub fn structural(&self) -> WaitPolicy {
        self.policy(WaitClass::Structural)
    }

    /// Data wait policy
    #[must_use]
    pub fn data(&self) -> WaitPolicy {
        self.policy(WaitClass::Data)
    }

    /// Action bound
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Scenario bound
    #[must_use]
    pub const fn scenario_timeout(&self) -> Duration {
        Duration::from_millis(self.scenario_timeout_ms)
    }

    /// Diagnostics bound
    #[must_use]
    pub const fn diagnostics_timeout(&self) -> Duration {
        Duration::from_millis(self.diagnostics_timeout_ms)
    }

    /// Release bound
    #[must_use]
    pub const fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }
}
