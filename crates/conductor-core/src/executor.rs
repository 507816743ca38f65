//! Self-correction loop for a single unit.
//!
//! One executor run drives a unit through up to `max_attempts` collaborator
//! invocations. Every attempt ends with the full acceptance-check set; a
//! failed attempt's classified diagnostics feed the next prompt. Throttling
//! is handled inside an attempt and never consumes one.

use crate::cancel::CancelToken;
use crate::check::{self, CheckReport};
use crate::collaborator::{AgentContext, AttemptSummary, CollabOutcome, Collaborator};
use crate::error::Result;
use crate::ratelimit::RateLimiter;
use crate::types::FailureClass;
use crate::unit::Unit;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ExecutorConfig / UnitRunResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Wall-clock ceiling for one collaborator invocation. A timeout is a
    /// failed attempt, not a scheduler error.
    pub attempt_timeout: Duration,
    /// Per-check ceiling during validation.
    pub check_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(45 * 60),
            check_timeout: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnitRunResult {
    pub succeeded: bool,
    pub attempts_used: u32,
    /// Diagnostic trail for the manifest; `None` on clean success.
    pub notes: Option<String>,
    pub history: Vec<AttemptSummary>,
    /// True when the run stopped at an attempt boundary due to cancellation.
    pub cancelled: bool,
}

impl UnitRunResult {
    fn cancelled_after(attempts_used: u32, history: Vec<AttemptSummary>) -> Self {
        Self {
            succeeded: false,
            attempts_used,
            notes: Some("cancelled before completion".to_string()),
            history,
            cancelled: true,
        }
    }
}

enum AttemptEnd {
    Validated(CheckReport),
    GaveUp(String),
    Cancelled,
}

// ---------------------------------------------------------------------------
// UnitExecutor
// ---------------------------------------------------------------------------

pub struct UnitExecutor<C: Collaborator> {
    collaborator: Arc<C>,
    limiter: Arc<RateLimiter>,
    cfg: ExecutorConfig,
}

impl<C: Collaborator> UnitExecutor<C> {
    pub fn new(collaborator: Arc<C>, limiter: Arc<RateLimiter>, cfg: ExecutorConfig) -> Self {
        Self {
            collaborator,
            limiter,
            cfg,
        }
    }

    /// Drive `unit` to success or attempt exhaustion inside `workspace`.
    ///
    /// Cancellation is honored at attempt boundaries only; an in-flight
    /// collaborator invocation always runs to its end (or timeout).
    pub async fn run(
        &self,
        unit: &Unit,
        workspace: &Path,
        cancel: &CancelToken,
    ) -> Result<UnitRunResult> {
        let mut history: Vec<AttemptSummary> = Vec::new();

        for attempt in 1..=unit.max_attempts.max(1) {
            if cancel.is_cancelled() {
                return Ok(UnitRunResult::cancelled_after(attempt - 1, history));
            }

            let ctx = AgentContext {
                unit_id: unit.id.clone(),
                description: unit.description.clone(),
                workspace: workspace.to_path_buf(),
                checks: unit.checks.clone(),
                prior_attempts: history.clone(),
            };

            tracing::info!(unit = %unit.id, attempt, max = unit.max_attempts, "starting attempt");
            let end = self.one_attempt(&ctx, workspace, cancel).await?;

            match end {
                AttemptEnd::Cancelled => {
                    return Ok(UnitRunResult::cancelled_after(attempt - 1, history));
                }
                AttemptEnd::Validated(report) if report.all_passed() => {
                    tracing::info!(unit = %unit.id, attempt, "unit succeeded");
                    return Ok(UnitRunResult {
                        succeeded: true,
                        attempts_used: attempt,
                        notes: None,
                        history,
                        cancelled: false,
                    });
                }
                AttemptEnd::Validated(report) => {
                    let class = check::classify(&report);
                    let summary = report.failure_summary();
                    tracing::warn!(
                        unit = %unit.id,
                        attempt,
                        class = %class,
                        "attempt failed validation"
                    );
                    history.push(AttemptSummary {
                        attempt,
                        failure_class: class,
                        summary,
                    });
                }
                AttemptEnd::GaveUp(reason) => {
                    tracing::warn!(unit = %unit.id, attempt, %reason, "collaborator failed");
                    history.push(AttemptSummary {
                        attempt,
                        failure_class: FailureClass::Unclassified,
                        summary: reason,
                    });
                }
            }
        }

        let notes = history.last().map(|h| {
            format!(
                "exhausted {} attempts; last failure ({}): {}",
                unit.max_attempts,
                h.failure_class,
                h.summary
            )
        });
        Ok(UnitRunResult {
            succeeded: false,
            attempts_used: unit.max_attempts.max(1),
            notes,
            history,
            cancelled: false,
        })
    }

    /// One attempt: invoke the collaborator (looping through throttles
    /// without consuming the attempt), then run the full check set.
    async fn one_attempt(
        &self,
        ctx: &AgentContext,
        workspace: &Path,
        cancel: &CancelToken,
    ) -> Result<AttemptEnd> {
        loop {
            let invocation =
                tokio::time::timeout(self.cfg.attempt_timeout, self.collaborator.invoke(ctx)).await;

            let outcome = match invocation {
                Err(_) => {
                    // Timeout is a content failure like any other.
                    return Ok(AttemptEnd::GaveUp(format!(
                        "collaborator timed out after {}s",
                        self.cfg.attempt_timeout.as_secs()
                    )));
                }
                Ok(result) => result?,
            };

            match outcome {
                CollabOutcome::Throttled { retry_after } => {
                    let computed = self.limiter.on_throttled();
                    let wait = retry_after.map_or(computed, |hint| hint.max(computed));
                    tokio::time::sleep(self.limiter.jittered(wait)).await;
                    if cancel.is_cancelled() {
                        return Ok(AttemptEnd::Cancelled);
                    }
                    // Same attempt, re-invoke.
                }
                CollabOutcome::Failure { reason } => {
                    self.limiter.on_success();
                    return Ok(AttemptEnd::GaveUp(reason));
                }
                CollabOutcome::Success { transcript } => {
                    tracing::debug!(unit = %ctx.unit_id, bytes = transcript.len(), "collaborator transcript");
                    let report =
                        check::run_checks(&ctx.checks, workspace, self.cfg.check_timeout).await?;
                    self.limiter.on_success();
                    return Ok(AttemptEnd::Validated(report));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
