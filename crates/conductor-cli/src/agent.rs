//! Bridges the scheduler's collaborator seam to the `coder-agent` subprocess
//! driver.

use std::time::Duration;

use coder_agent::{AgentOutcome, InvokeOptions};
use conductor_core::collaborator::{AgentContext, CollabOutcome, Collaborator};
use conductor_core::config::AgentConfig;
use conductor_core::error::{ConductorError, Result};

const SYSTEM_PROMPT: &str = "You are implementing one unit of work inside an isolated git \
worktree. Confine all edits to the current working directory. Do not run git commit, git \
push, or modify anything outside this directory. Work until the acceptance checks listed \
in the task would pass.";

pub struct CliCollaborator {
    cfg: AgentConfig,
}

impl CliCollaborator {
    pub fn new(cfg: AgentConfig) -> Self {
        Self { cfg }
    }
}

impl Collaborator for CliCollaborator {
    fn invoke(
        &self,
        ctx: &AgentContext,
    ) -> impl std::future::Future<Output = Result<CollabOutcome>> + Send {
        let prompt = build_prompt(ctx);
        let opts = InvokeOptions {
            path_to_executable: Some(self.cfg.binary.clone()),
            model: self.cfg.model.clone(),
            max_turns: Some(self.cfg.max_turns),
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            cwd: Some(ctx.workspace.clone()),
            env: Vec::new(),
        };
        let unit_id = ctx.unit_id.clone();
        async move {
            tracing::debug!(unit = %unit_id, "invoking coding agent");
            match coder_agent::invoke(prompt, opts).await {
                Ok(AgentOutcome::Completed { result_text, num_turns, .. }) => {
                    tracing::debug!(unit = %unit_id, num_turns, "agent completed");
                    Ok(CollabOutcome::Success {
                        transcript: result_text,
                    })
                }
                Ok(AgentOutcome::Errored { reason }) => Ok(CollabOutcome::Failure { reason }),
                Ok(AgentOutcome::Throttled { retry_after_secs }) => Ok(CollabOutcome::Throttled {
                    retry_after: retry_after_secs.map(Duration::from_secs),
                }),
                Err(e) => Err(ConductorError::Collaborator(e.to_string())),
            }
        }
    }
}

/// Render the unit (and any earlier failed attempts) as the agent prompt.
fn build_prompt(ctx: &AgentContext) -> String {
    let mut prompt = format!("# Task: {}\n\n{}\n", ctx.unit_id, ctx.description);

    if !ctx.checks.is_empty() {
        prompt.push_str("\n## Acceptance checks\n\n");
        prompt.push_str("Your work is validated by running, in this directory:\n\n");
        for check in &ctx.checks {
            prompt.push_str(&format!("- {}: `{}`\n", check.name, check.run));
        }
    }

    if !ctx.prior_attempts.is_empty() {
        prompt.push_str("\n## Previous attempts\n\n");
        for attempt in &ctx.prior_attempts {
            prompt.push_str(&format!(
                "### Attempt {} failed ({})\n\n{}\n\n{}\n",
                attempt.attempt,
                attempt.failure_class,
                attempt.failure_class.fix_hint(),
                attempt.summary
            ));
        }
    }

    prompt
}
