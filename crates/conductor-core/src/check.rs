//! Acceptance-check execution.
//!
//! Checks are shell commands declared per unit and run inside the unit's
//! workspace. The full set always runs, even after a failure — a corrective
//! fix that passes check A but silently breaks previously-passing check B
//! must be caught on re-validation.

use crate::error::{ConductorError, Result};
use crate::types::FailureClass;
use crate::unit::AcceptanceCheck;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    /// Combined stdout/stderr, truncated for the diagnostics trail.
    pub output: String,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    /// One-line-per-failure summary for attempt history and retry prompts.
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(|o| format!("check '{}' failed:\n{}", o.name, o.output))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

const MAX_CAPTURED_OUTPUT: usize = 8 * 1024;

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
fn truncate_output(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// Run every check in `dir` with a per-check timeout. A timed-out check is
/// reported as a failure, not an error — the executor treats it as a
/// content failure like any other.
pub async fn run_checks(
    checks: &[AcceptanceCheck],
    dir: &Path,
    timeout: Duration,
) -> Result<CheckReport> {
    let mut report = CheckReport::default();
    for check in checks {
        let outcome = run_one(check, dir, timeout).await?;
        tracing::debug!(
            check = %outcome.name,
            passed = outcome.passed,
            "acceptance check finished"
        );
        report.outcomes.push(outcome);
    }
    Ok(report)
}

async fn run_one(check: &AcceptanceCheck, dir: &Path, timeout: Duration) -> Result<CheckOutcome> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(&check.run)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ConductorError::CheckSpawn(check.name.clone(), e.to_string()))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => Ok(CheckOutcome {
            name: check.name.clone(),
            passed: false,
            output: format!("timed out after {}s", timeout.as_secs()),
        }),
        Ok(Err(e)) => Err(ConductorError::CheckSpawn(check.name.clone(), e.to_string())),
        Ok(Ok(out)) => {
            let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&out.stderr);
            if !stderr.trim().is_empty() {
                if !combined.is_empty() {
                    combined.push('\n');
                }
                combined.push_str(stderr.trim_end());
            }
            truncate_output(&mut combined, MAX_CAPTURED_OUTPUT);
            Ok(CheckOutcome {
                name: check.name.clone(),
                passed: out.status.success(),
                output: combined,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

static STRUCTURAL_RE: OnceLock<Regex> = OnceLock::new();
static MISSING_REF_RE: OnceLock<Regex> = OnceLock::new();
static BEHAVIORAL_RE: OnceLock<Regex> = OnceLock::new();

fn structural_re() -> &'static Regex {
    STRUCTURAL_RE.get_or_init(|| {
        Regex::new(r"(?i)(syntax error|parse error|expected .* found|unexpected token|compilation failed|error\[E\d+\]|mismatched types)").unwrap()
    })
}

fn missing_ref_re() -> &'static Regex {
    MISSING_REF_RE.get_or_init(|| {
        Regex::new(r"(?i)(cannot find|unresolved import|undefined reference|no such file|not found|undefined symbol|module not found)").unwrap()
    })
}

fn behavioral_re() -> &'static Regex {
    BEHAVIORAL_RE.get_or_init(|| {
        Regex::new(r"(?i)(assert|test .*failed|\d+ failed|panicked at|expected .* got|failures:)").unwrap()
    })
}

/// Classify a failed validation run from its combined failure output.
/// Structural problems shadow behavioral ones: a file that doesn't parse
/// also fails its tests, and fixing the parse error comes first.
pub fn classify(report: &CheckReport) -> FailureClass {
    let text = report.failure_summary();
    if structural_re().is_match(&text) {
        FailureClass::Structural
    } else if missing_ref_re().is_match(&text) {
        FailureClass::MissingReference
    } else if behavioral_re().is_match(&text) {
        FailureClass::Behavioral
    } else {
        FailureClass::Unclassified
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn check(name: &str, run: &str) -> AcceptanceCheck {
        AcceptanceCheck::new(name, run)
    }

    #[tokio::test]
    async fn passing_and_failing_checks() {
        let dir = TempDir::new().unwrap();
        let report = run_checks(
            &[check("ok", "true"), check("bad", "echo boom >&2; false")],
            dir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(!report.all_passed());
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[0].passed);
        assert!(!report.outcomes[1].passed);
        assert!(report.outcomes[1].output.contains("boom"));
    }

    #[tokio::test]
    async fn full_set_runs_even_after_failure() {
        let dir = TempDir::new().unwrap();
        let report = run_checks(
            &[check("first", "false"), check("second", "true")],
            dir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        // The failing first check must not short-circuit the second.
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[1].passed);
    }

    #[tokio::test]
    async fn checks_run_in_the_given_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker"), "x").unwrap();
        let report = run_checks(
            &[check("marker", "test -f marker")],
            dir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(report.all_passed());
    }

    #[tokio::test]
    async fn timeout_reported_as_failure() {
        let dir = TempDir::new().unwrap();
        let report = run_checks(
            &[check("slow", "sleep 5")],
            dir.path(),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(!report.all_passed());
        assert!(report.outcomes[0].output.contains("timed out"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // A multibyte character straddling the cap is dropped, not split.
        let mut s = "a".repeat(MAX_CAPTURED_OUTPUT - 1);
        s.push('é');
        truncate_output(&mut s, MAX_CAPTURED_OUTPUT);
        assert_eq!(s.len(), MAX_CAPTURED_OUTPUT - 1);
        assert!(s.chars().all(|c| c == 'a'));

        let mut short = String::from("fits");
        truncate_output(&mut short, MAX_CAPTURED_OUTPUT);
        assert_eq!(short, "fits");
    }

    #[tokio::test]
    async fn oversized_multibyte_output_is_captured_without_panicking() {
        let dir = TempDir::new().unwrap();
        let cmd = format!(
            "head -c {} /dev/zero | tr '\\0' a; printf 'é'; false",
            MAX_CAPTURED_OUTPUT - 1
        );
        let report = run_checks(&[check("noisy", &cmd)], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!report.all_passed());
        let out = &report.outcomes[0].output;
        assert!(out.len() <= MAX_CAPTURED_OUTPUT);
        assert!(out.is_char_boundary(out.len()));
    }

    fn report_with(output: &str) -> CheckReport {
        CheckReport {
            outcomes: vec![CheckOutcome {
                name: "c".into(),
                passed: false,
                output: output.into(),
            }],
        }
    }

    #[test]
    fn classify_structural() {
        assert_eq!(
            classify(&report_with("error[E0308]: mismatched types")),
            FailureClass::Structural
        );
    }

    #[test]
    fn classify_missing_reference() {
        assert_eq!(
            classify(&report_with("error: unresolved import `crate::ghost`")),
            FailureClass::MissingReference
        );
    }

    #[test]
    fn classify_behavioral() {
        assert_eq!(
            classify(&report_with("thread 'main' panicked at 'assertion failed'")),
            FailureClass::Behavioral
        );
    }

    #[test]
    fn classify_unclassified() {
        assert_eq!(
            classify(&report_with("something odd happened")),
            FailureClass::Unclassified
        );
    }

    #[test]
    fn classify_structural_shadows_behavioral() {
        let r = report_with("syntax error near line 3\ntest foo failed");
        assert_eq!(classify(&r), FailureClass::Structural);
    }
}
