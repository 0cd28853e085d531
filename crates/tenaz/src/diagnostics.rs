//! Diagnostics capture for failed steps.
//!
//! Runs on the already-failing path, so [`DiagnosticsCapture::capture`] never
//! returns an error: every problem is logged, recorded in
//! `capture_errors`, and swallowed. Each driver call is bounded by the
//! diagnostics timeout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::driver::VerifyDriver;
use crate::resolver::LocatorAttempt;
use crate::result::StepError;

/// Default bound for each diagnostics driver call (10 seconds)
pub const DEFAULT_DIAGNOSTICS_TIMEOUT_MS: u64 = 10_000;

/// Default DOM excerpt length
pub const DEFAULT_DOM_EXCERPT_CHARS: usize = 2_000;

/// Evidence captured for one failed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticArtifact {
    /// Artifact id
    pub id: Uuid,
    /// Capture time, RFC 3339
    pub captured_at: String,
    /// Scenario name
    pub scenario: String,
    /// Zero-based step index
    pub step_index: usize,
    /// Step label
    pub step_label: String,
    /// Screenshot file, if one was written
    pub screenshot: Option<PathBuf>,
    /// JSON sidecar file, if one was written
    pub sidecar: Option<PathBuf>,
    /// One-line summary
    pub summary: String,
    /// Locator attempts that led to the failure
    pub attempts: Vec<LocatorAttempt>,
    /// Serialised DOM excerpt
    pub dom_excerpt: Option<String>,
    /// Problems hit while capturing
    pub capture_errors: Vec<String>,
}

/// What failed, for the capture
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// Scenario name
    pub scenario: &'a str,
    /// Zero-based step index
    pub step_index: usize,
    /// Step label
    pub step_label: &'a str,
    /// The step failure
    pub error: &'a StepError,
    /// Locator attempts
    pub attempts: &'a [LocatorAttempt],
}

/// Screenshot and context capture
#[derive(Debug, Clone)]
pub struct DiagnosticsCapture {
    artifacts_dir: PathBuf,
    timeout: Duration,
    dom_excerpt_chars: usize,
}

impl DiagnosticsCapture {
    /// Capture into `artifacts_dir`
    #[must_use]
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            timeout: Duration::from_millis(DEFAULT_DIAGNOSTICS_TIMEOUT_MS),
            dom_excerpt_chars: DEFAULT_DOM_EXCERPT_CHARS,
        }
    }

    /// Bound each driver call
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// DOM excerpt length; zero disables the excerpt
    #[must_use]
    pub const fn with_dom_excerpt_chars(mut self, chars: usize) -> Self {
        self.dom_excerpt_chars = chars;
        self
    }

    /// Artifacts directory
    #[must_use]
    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// File stem for a step: `{scenario-slug}-step{NN}-{id prefix}`.
    /// The artifact id keeps scenarios with the same slug apart.
    #[must_use]
    pub fn stem(scenario: &str, step_index: usize, id: &Uuid) -> String {
        let id = id.simple().to_string();
        format!("{}-step{:02}-{}", slugify(scenario), step_index, &id[..8])
    }

    /// Capture screenshot, DOM excerpt and a JSON sidecar. Never fails.
    pub async fn capture<D: VerifyDriver + ?Sized>(
        &self,
        driver: &D,
        failure: FailureContext<'_>,
    ) -> DiagnosticArtifact {
        let mut capture_errors = Vec::new();
        let id = Uuid::new_v4();
        let stem = Self::stem(failure.scenario, failure.step_index, &id);

        let dir_ready = match tokio::fs::create_dir_all(&self.artifacts_dir).await {
            Ok(()) => true,
            Err(e) => {
                record(
                    &mut capture_errors,
                    format!("create {}: {e}", self.artifacts_dir.display()),
                );
                false
            }
        };

        let mut screenshot = None;
        if dir_ready {
            let path = self.artifacts_dir.join(format!("{stem}.png"));
            match tokio::time::timeout(self.timeout, driver.screenshot(&path, true)).await {
                Ok(Ok(())) => screenshot = Some(path),
                Ok(Err(e)) => record(&mut capture_errors, format!("screenshot: {e}")),
                Err(_) => record(
                    &mut capture_errors,
                    format!("screenshot: timed out after {}ms", self.timeout.as_millis()),
                ),
            }
        }

        let mut dom_excerpt = None;
        if self.dom_excerpt_chars > 0 {
            match tokio::time::timeout(self.timeout, driver.dom_excerpt(self.dom_excerpt_chars))
                .await
            {
                Ok(Ok(excerpt)) => dom_excerpt = Some(excerpt),
                Ok(Err(e)) => record(&mut capture_errors, format!("dom excerpt: {e}")),
                Err(_) => record(
                    &mut capture_errors,
                    format!("dom excerpt: timed out after {}ms", self.timeout.as_millis()),
                ),
            }
        }

        let mut artifact = DiagnosticArtifact {
            id,
            captured_at: chrono::Utc::now().to_rfc3339(),
            scenario: failure.scenario.to_string(),
            step_index: failure.step_index,
            step_label: failure.step_label.to_string(),
            screenshot,
            sidecar: None,
            summary: summarize(&failure),
            attempts: failure.attempts.to_vec(),
            dom_excerpt,
            capture_errors,
        };

        if dir_ready {
            let path = self.artifacts_dir.join(format!("{stem}.json"));
            artifact.sidecar = Some(path.clone());
            let written = match serde_json::to_vec_pretty(&artifact) {
                Ok(json) => tokio::fs::write(&path, json)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = written {
                artifact.sidecar = None;
                record(&mut artifact.capture_errors, format!("sidecar: {e}"));
            }
        }

        tracing::info!(
            scenario = failure.scenario,
            step = failure.step_index,
            screenshot = ?artifact.screenshot,
            "diagnostics captured"
        );
        artifact
    }
}

fn record(errors: &mut Vec<String>, message: String) {
    tracing::warn!(error = %message, "diagnostics capture problem");
    errors.push(message);
}

fn summarize(failure: &FailureContext<'_>) -> String {
    let mut summary = format!(
        "step {} ({}) failed: {}",
        failure.step_index, failure.step_label, failure.error
    );
    if !failure.attempts.is_empty() {
        let tried: Vec<String> = failure.attempts.iter().map(ToString::to_string).collect();
        summary.push_str("; attempts: ");
        summary.push_str(&tried.join("; "));
    }
    summary
}

/// Lowercase ASCII slug: `"Drawer Layout (mobile)"` -> `"drawer-layout-mobile"`
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "scenario".to_string()
    } else {
        slug.to_string()
    }
}
