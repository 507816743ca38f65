use std::path::PathBuf;

// ─── InvokeOptions ────────────────────────────────────────────────────────

/// Options for a single-shot agent invocation.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Path to the agent CLI binary. Defaults to `claude` on `PATH`.
    pub path_to_executable: Option<String>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    /// Appended to the agent's default system prompt.
    pub system_prompt: Option<String>,
    /// Working directory for the subprocess — the unit workspace.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

// ─── AgentOutcome ─────────────────────────────────────────────────────────

/// The terminal outcome of one agent invocation.
///
/// `Throttled` is separated from `Errored` because callers treat it
/// differently: a throttle is retried after backoff, an error is a failed
/// attempt.
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    Completed {
        result_text: String,
        num_turns: u32,
        total_cost_usd: f64,
    },
    Errored {
        reason: String,
    },
    Throttled {
        /// Provider hint, when one was present in the output.
        retry_after_secs: Option<u64>,
    },
}

// ─── ResultPayload ────────────────────────────────────────────────────────

/// The terminal JSON object emitted by `--output-format json`.
///
/// Only the fields we consume are modelled; unknown fields are ignored so
/// newer CLI versions don't break parsing.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ResultPayload {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub total_cost_usd: f64,
}
