use crate::agent::CliCollaborator;
use crate::output;
use anyhow::{bail, Context};
use conductor_core::config::HarnessConfig;
use conductor_core::plan::Plan;
use conductor_core::scheduler::{RunSummary, Scheduler};
use conductor_core::types::RunStatus;
use conductor_core::workspace::WorkspaceManager;
use conductor_core::paths;
use std::path::Path;
use std::sync::Arc;

pub fn run(root: &Path, resume: bool, max_parallel: Option<usize>, json: bool) -> anyhow::Result<()> {
    let mut cfg =
        HarnessConfig::load(&paths::config_path(root)).context("failed to load config")?;
    if let Some(n) = max_parallel {
        cfg.max_parallel = n.max(1);
    }
    let plan = Plan::load(&paths::plan_path(root)).context("failed to load plan")?;

    if !WorkspaceManager::is_repo(root) {
        bail!(
            "{} is not a git repository; unit workspaces require one",
            root.display()
        );
    }
    which::which(&cfg.agent.binary).with_context(|| {
        format!(
            "agent binary '{}' not found on PATH (set agent.binary in {})",
            cfg.agent.binary,
            paths::CONFIG_FILE
        )
    })?;

    let collaborator = Arc::new(CliCollaborator::new(cfg.agent.clone()));
    let scheduler = if resume {
        Scheduler::resume(root, plan.units, &cfg, collaborator)
    } else {
        Scheduler::new(root, plan.units, &cfg, collaborator)
    }
    .context("failed to build scheduler")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let summary = runtime.block_on(async {
        // Ctrl-C requests cancellation; the run winds down at the next
        // attempt boundaries instead of dying mid-merge.
        let token = scheduler.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ncancellation requested; finishing in-flight attempts...");
                token.request();
            }
        });
        scheduler.run().await
    })?;

    report(&summary, json)?;
    match summary.run_status {
        RunStatus::Completed => Ok(()),
        RunStatus::Cancelled => bail!("run cancelled before completion"),
        _ => bail!(
            "run partially completed: {} failed, {} blocked",
            summary.failed.len(),
            summary.blocked.len()
        ),
    }
}

fn report(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        return output::print_json(&serde_json::json!({
            "run_status": summary.run_status.as_str(),
            "succeeded": summary.succeeded,
            "failed": summary.failed,
            "blocked": summary.blocked,
            "skipped": summary.skipped,
        }));
    }

    println!("run {}", summary.run_status);
    let section = |label: &str, ids: &[String]| {
        if !ids.is_empty() {
            println!("  {label}: {}", ids.join(", "));
        }
    };
    section("succeeded", &summary.succeeded);
    section("skipped (already done)", &summary.skipped);
    section("failed", &summary.failed);
    section("blocked", &summary.blocked);
    if !summary.failed.is_empty() {
        println!("\nfailed workspaces are preserved under {}", paths::WORKSPACES_DIR);
        println!("inspect with: conductor status  /  conductor workspace list");
    }
    Ok(())
}
