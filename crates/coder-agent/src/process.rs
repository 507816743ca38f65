use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::types::{AgentOutcome, InvokeOptions, ResultPayload};
use crate::{CoderAgentError, Result};

// ─── Command builder ──────────────────────────────────────────────────────

/// Single-shot mode: the prompt goes in on stdin and one JSON result object
/// comes out on stdout.
fn build_command(opts: &InvokeOptions) -> Command {
    let exe = opts.path_to_executable.as_deref().unwrap_or("claude");
    let mut cmd = Command::new(exe);

    cmd.arg("--print").arg("--output-format").arg("json");

    if let Some(model) = &opts.model {
        cmd.arg("--model").arg(model);
    }
    if let Some(max_turns) = opts.max_turns {
        cmd.arg("--max-turns").arg(max_turns.to_string());
    }
    if let Some(sp) = &opts.system_prompt {
        cmd.arg("--append-system-prompt").arg(sp);
    }
    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &opts.env {
        cmd.env(k, v);
    }
    // Works both from a terminal and from inside a running agent session.
    cmd.env_remove("CLAUDECODE");

    cmd
}

// ─── Invocation ───────────────────────────────────────────────────────────

pub(crate) async fn run(prompt: &str, opts: &InvokeOptions) -> Result<AgentOutcome> {
    let mut cmd = build_command(opts);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(CoderAgentError::Io)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(CoderAgentError::Io)?;
        // Dropping stdin closes the pipe: single-turn operation.
    }

    let out = child.wait_with_output().await.map_err(CoderAgentError::Io)?;
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();

    if !out.status.success() {
        if let Some(retry) = throttle_signal(&stderr) {
            tracing::warn!("agent throttled: {stderr}");
            return Ok(AgentOutcome::Throttled {
                retry_after_secs: retry,
            });
        }
        let code = out
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        return Ok(AgentOutcome::Errored {
            reason: format!("agent exited with {code}: {stderr}"),
        });
    }

    parse_result(&stdout)
}

/// Interpret the terminal JSON object. The CLI reports agent-level failures
/// (max turns, budget, refusals) as a zero-exit result with `is_error`.
fn parse_result(stdout: &str) -> Result<AgentOutcome> {
    // The result object is the last non-empty line; --print mode emits
    // exactly one, but be tolerant of leading noise.
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("");

    let payload: ResultPayload =
        serde_json::from_str(line).map_err(|e| CoderAgentError::Parse {
            output: line.to_string(),
            source: e,
        })?;

    let text = payload.result.unwrap_or_default();
    if payload.is_error {
        if let Some(retry) = throttle_signal(&text) {
            return Ok(AgentOutcome::Throttled {
                retry_after_secs: retry,
            });
        }
        let subtype = payload.subtype.unwrap_or_else(|| "unknown".to_string());
        return Ok(AgentOutcome::Errored {
            reason: format!("agent reported error ({subtype}): {text}"),
        });
    }

    Ok(AgentOutcome::Completed {
        result_text: text,
        num_turns: payload.num_turns,
        total_cost_usd: payload.total_cost_usd,
    })
}

// ─── Throttle detection ───────────────────────────────────────────────────

/// `Some(retry_hint)` when the text looks like provider-side throttling.
fn throttle_signal(text: &str) -> Option<Option<u64>> {
    let lower = text.to_lowercase();
    let throttled = lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("429")
        || lower.contains("overloaded")
        || lower.contains("too many requests");
    if !throttled {
        return None;
    }
    Some(retry_after_hint(&lower))
}

/// Parse a `retry after <n>` / `retry-after: <n>` seconds hint, if present.
fn retry_after_hint(lower: &str) -> Option<u64> {
    for marker in ["retry after ", "retry-after: ", "retry_after: "] {
        if let Some(pos) = lower.find(marker) {
            let rest = &lower[pos + marker.len()..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(n) = digits.parse() {
                return Some(n);
            }
        }
    }
    None
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write a fake agent executable that runs the given shell body.
    fn fake_agent(dir: &TempDir, body: &str) -> InvokeOptions {
        let path = dir.path().join("fake-agent");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        InvokeOptions {
            path_to_executable: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn completed_result() {
        let dir = TempDir::new().unwrap();
        let opts = fake_agent(
            &dir,
            r#"cat > /dev/null
echo '{"type":"result","subtype":"success","is_error":false,"result":"done","num_turns":4,"total_cost_usd":0.02}'"#,
        );
        match run("prompt", &opts).await.unwrap() {
            AgentOutcome::Completed {
                result_text,
                num_turns,
                total_cost_usd,
            } => {
                assert_eq!(result_text, "done");
                assert_eq!(num_turns, 4);
                assert!((total_cost_usd - 0.02).abs() < 1e-9);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prompt_reaches_stdin() {
        let dir = TempDir::new().unwrap();
        let opts = fake_agent(
            &dir,
            r#"text=$(cat)
printf '{"is_error":false,"result":"%s","num_turns":1,"total_cost_usd":0}' "$text""#,
        );
        match run("echo-me", &opts).await.unwrap() {
            AgentOutcome::Completed { result_text, .. } => assert_eq!(result_text, "echo-me"),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_result_with_subtype() {
        let dir = TempDir::new().unwrap();
        let opts = fake_agent(
            &dir,
            r#"cat > /dev/null
echo '{"subtype":"error_max_turns","is_error":true,"result":"","num_turns":10,"total_cost_usd":0.1}'"#,
        );
        match run("prompt", &opts).await.unwrap() {
            AgentOutcome::Errored { reason } => assert!(reason.contains("error_max_turns")),
            other => panic!("expected Errored, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limited_exit_becomes_throttled() {
        let dir = TempDir::new().unwrap();
        let opts = fake_agent(
            &dir,
            r#"cat > /dev/null
echo 'API error: 429 rate limit exceeded, retry after 30 seconds' >&2
exit 1"#,
        );
        match run("prompt", &opts).await.unwrap() {
            AgentOutcome::Throttled { retry_after_secs } => {
                assert_eq!(retry_after_secs, Some(30));
            }
            other => panic!("expected Throttled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overloaded_result_becomes_throttled() {
        let dir = TempDir::new().unwrap();
        let opts = fake_agent(
            &dir,
            r#"cat > /dev/null
echo '{"is_error":true,"result":"upstream overloaded, please retry","num_turns":0,"total_cost_usd":0}'"#,
        );
        assert!(matches!(
            run("prompt", &opts).await.unwrap(),
            AgentOutcome::Throttled {
                retry_after_secs: None
            }
        ));
    }

    #[tokio::test]
    async fn plain_failure_is_errored() {
        let dir = TempDir::new().unwrap();
        let opts = fake_agent(
            &dir,
            r#"cat > /dev/null
echo 'something broke' >&2
exit 2"#,
        );
        match run("prompt", &opts).await.unwrap() {
            AgentOutcome::Errored { reason } => {
                assert!(reason.contains("2"));
                assert!(reason.contains("something broke"));
            }
            other => panic!("expected Errored, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_output_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let opts = fake_agent(
            &dir,
            r#"cat > /dev/null
echo 'not json at all'"#,
        );
        assert!(matches!(
            run("prompt", &opts).await,
            Err(CoderAgentError::Parse { .. })
        ));
    }

    #[test]
    fn retry_hint_variants() {
        assert_eq!(retry_after_hint("retry after 12s"), Some(12));
        assert_eq!(retry_after_hint("retry-after: 5"), Some(5));
        assert_eq!(retry_after_hint("no hint here"), None);
    }
}
