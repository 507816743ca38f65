//! `coder-agent` — native Rust driver for the coding-agent CLI subprocess.
//!
//! Wraps single-shot `claude --print --output-format json` invocations: the
//! prompt goes in on stdin, the terminal result object comes back typed, and
//! provider throttling is distinguished from real failures so callers can
//! back off instead of burning a retry.
//!
//! ```rust,ignore
//! use coder_agent::{invoke, AgentOutcome, InvokeOptions};
//!
//! let outcome = invoke("Add a health endpoint.", InvokeOptions::default()).await?;
//! if let AgentOutcome::Completed { result_text, .. } = outcome {
//!     println!("{result_text}");
//! }
//! ```

pub mod error;
pub mod types;

pub(crate) mod process;

pub use error::CoderAgentError;
pub use types::{AgentOutcome, InvokeOptions};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, CoderAgentError>;

/// Drive one agent invocation to its terminal outcome.
pub async fn invoke(prompt: impl Into<String>, opts: InvokeOptions) -> Result<AgentOutcome> {
    process::run(&prompt.into(), &opts).await
}
