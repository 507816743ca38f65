//! The seam between the scheduler and the external coding agent.
//!
//! The executor talks to an agent only through [`Collaborator`], so core
//! logic and tests run against mocks while the CLI plugs in a real
//! subprocess-backed implementation.

use crate::error::Result;
use crate::types::FailureClass;
use crate::unit::AcceptanceCheck;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// AgentContext
// ---------------------------------------------------------------------------

/// Everything a collaborator needs to work on one attempt of one unit.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub unit_id: String,
    pub description: String,
    /// Workspace directory the collaborator must confine its edits to.
    pub workspace: PathBuf,
    pub checks: Vec<AcceptanceCheck>,
    /// Earlier attempts on this unit, oldest first. Empty on attempt one.
    pub prior_attempts: Vec<AttemptSummary>,
}

/// What went wrong on one earlier attempt, fed back into the next prompt.
#[derive(Debug, Clone)]
pub struct AttemptSummary {
    pub attempt: u32,
    pub failure_class: FailureClass,
    /// Failing check output, truncated.
    pub summary: String,
}

// ---------------------------------------------------------------------------
// CollabOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum CollabOutcome {
    /// The collaborator believes it completed the work.
    Success { transcript: String },
    /// The collaborator gave up or crashed; counts as a failed attempt.
    Failure { reason: String },
    /// Provider-side throttling. Does not consume an attempt; the executor
    /// backs off and re-invokes.
    Throttled { retry_after: Option<Duration> },
}

// ---------------------------------------------------------------------------
// Collaborator
// ---------------------------------------------------------------------------

pub trait Collaborator: Send + Sync {
    /// Run one attempt inside `ctx.workspace`. Implementations must leave
    /// the working tree in whatever state they reached; validation is the
    /// executor's job, not theirs.
    fn invoke(
        &self,
        ctx: &AgentContext,
    ) -> impl Future<Output = Result<CollabOutcome>> + Send;
}
