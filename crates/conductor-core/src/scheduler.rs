//! Level-sequential parallel scheduler.
//!
//! Execution order comes from the dependency graph's levels: everything in
//! level k finishes (and successful units merge) before level k+1 starts, so
//! a dispatched unit always sees all of its dependencies' changes in the
//! mainline it branched from.
//!
//! Concurrency model: a single coordinator task owns the graph and the
//! manifest; workers run units and report back over an mpsc channel. All
//! status writes and all merges happen on the coordinator, so unit state
//! needs no locking and mainline integration is naturally serialized.

use crate::cancel::CancelToken;
use crate::collaborator::Collaborator;
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::executor::{UnitExecutor, UnitRunResult};
use crate::graph::DependencyGraph;
use crate::manifest::{RunManifest, UnitRecord};
use crate::paths;
use crate::ratelimit::RateLimiter;
use crate::types::{RunStatus, UnitStatus};
use crate::unit::Unit;
use crate::workspace::{MergeOutcome, Workspace, WorkspaceManager};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Worker messages
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum WorkerOutcome {
    Finished {
        workspace: Workspace,
        result: UnitRunResult,
    },
    CreationFailed {
        message: String,
    },
}

#[derive(Debug)]
struct WorkerMsg {
    unit_id: String,
    outcome: WorkerOutcome,
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_status: RunStatus,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub blocked: Vec<String>,
    /// Units already succeeded in a previous run and skipped on resume.
    pub skipped: Vec<String>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler<C: Collaborator + 'static> {
    root: PathBuf,
    graph: DependencyGraph,
    manifest: RunManifest,
    workspaces: Arc<WorkspaceManager>,
    limiter: Arc<RateLimiter>,
    executor: Arc<UnitExecutor<C>>,
    cancel: CancelToken,
    skipped: Vec<String>,
}

impl<C: Collaborator + 'static> Scheduler<C> {
    /// Fresh run: builds the graph (failing fast on cycles and dangling
    /// dependencies) and starts a new manifest covering every unit.
    pub fn new(
        root: &Path,
        units: Vec<Unit>,
        cfg: &HarnessConfig,
        collaborator: Arc<C>,
    ) -> Result<Self> {
        let graph = DependencyGraph::build(units)?;
        let manifest = RunManifest::start(graph.units().map(|u| u.id.clone()));
        Ok(Self::assemble(root, graph, manifest, cfg, collaborator, Vec::new()))
    }

    /// Resume an interrupted run: succeeded units are skipped, everything
    /// else goes back to pending.
    pub fn resume(
        root: &Path,
        units: Vec<Unit>,
        cfg: &HarnessConfig,
        collaborator: Arc<C>,
    ) -> Result<Self> {
        let mut graph = DependencyGraph::build(units)?;
        let mut manifest = RunManifest::load(&paths::manifest_path(root))?;
        manifest.reset_for_resume();

        let mut skipped = Vec::new();
        for id in manifest.succeeded_ids() {
            if graph.unit(&id).is_some() {
                graph.set_status(&id, UnitStatus::Succeeded)?;
                skipped.push(id);
            }
        }

        // Workspaces preserved from failed attempts would collide with the
        // fresh ones the re-attempt creates; discard them up front.
        let manager = WorkspaceManager::new(root);
        for unit in graph.units() {
            if skipped.contains(&unit.id) {
                continue;
            }
            if paths::workspace_dir(root, &unit.id).exists() {
                tracing::info!(unit = %unit.id, "discarding stale workspace before re-attempt");
                manager.cleanup_unit(&unit.id)?;
            }
        }
        tracing::info!(skipped = skipped.len(), "resuming previous run");
        Ok(Self::assemble(root, graph, manifest, cfg, collaborator, skipped))
    }

    fn assemble(
        root: &Path,
        graph: DependencyGraph,
        manifest: RunManifest,
        cfg: &HarnessConfig,
        collaborator: Arc<C>,
        skipped: Vec<String>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(cfg.rate_limit()));
        let executor = Arc::new(UnitExecutor::new(
            collaborator,
            Arc::clone(&limiter),
            cfg.executor(),
        ));
        Self {
            root: root.to_path_buf(),
            graph,
            manifest,
            workspaces: Arc::new(WorkspaceManager::new(root)),
            limiter,
            executor,
            cancel: CancelToken::new(paths::cancel_path(root)),
            skipped,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute the run to completion, cancellation, or exhaustion.
    pub async fn run(mut self) -> Result<RunSummary> {
        self.cancel.clear_stale_flag()?;
        self.save_manifest()?;

        let levels = self.graph.levels();
        tracing::info!(units = self.graph.len(), levels = levels.len(), "run starting");

        for (k, level) in levels.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            self.limiter.reset_for_level();
            self.apply_cap_override()?;

            let runnable: Vec<String> = level
                .iter()
                .filter(|id| self.graph.status(id) == Some(UnitStatus::Pending))
                .cloned()
                .collect();
            if runnable.is_empty() {
                continue;
            }
            tracing::info!(level = k, units = runnable.len(), "dispatching level");
            self.run_level(runnable).await?;
        }

        let status = self.finalize()?;
        Ok(self.summary(status))
    }

    /// Dispatch one level's units through a dynamically sized worker pool.
    ///
    /// The pool width is re-read from the rate limiter before every
    /// dispatch, so a throttle-driven cap reduction takes effect on the
    /// next unit without disturbing ones already in flight. Siblings in a
    /// level do not share fate: one unit failing never aborts the others.
    async fn run_level(&mut self, runnable: Vec<String>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<WorkerMsg>(runnable.len().max(1));
        let mut queue: VecDeque<String> = runnable.into();
        let mut in_flight = 0usize;

        loop {
            while in_flight < self.limiter.current_worker_cap() && !self.cancel.is_cancelled() {
                let Some(id) = queue.pop_front() else { break };
                self.dispatch(&id, tx.clone())?;
                in_flight += 1;
            }
            if in_flight == 0 {
                // Queue drained, or cancellation with nothing running.
                break;
            }
            let Some(msg) = rx.recv().await else { break };
            in_flight -= 1;
            self.handle(msg)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, unit_id: &str, tx: mpsc::Sender<WorkerMsg>) -> Result<()> {
        self.graph.set_status(unit_id, UnitStatus::Running)?;
        self.manifest.record(
            unit_id,
            UnitRecord {
                status: UnitStatus::Running,
                attempts_used: 0,
                last_error: None,
                workspace: None,
            },
        )?;
        self.save_manifest()?;

        // Clone what the worker needs; the graph itself never leaves the
        // coordinator.
        let unit = match self.graph.unit(unit_id) {
            Some(u) => u.clone(),
            None => return Err(crate::error::ConductorError::UnitNotFound(unit_id.into())),
        };
        let workspaces = Arc::clone(&self.workspaces);
        let executor = Arc::clone(&self.executor);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let msg = match workspaces.create(&unit.id) {
                Err(e) => WorkerMsg {
                    unit_id: unit.id.clone(),
                    outcome: WorkerOutcome::CreationFailed {
                        message: e.to_string(),
                    },
                },
                Ok(workspace) => match executor.run(&unit, &workspace.path, &cancel).await {
                    Ok(result) => WorkerMsg {
                        unit_id: unit.id.clone(),
                        outcome: WorkerOutcome::Finished { workspace, result },
                    },
                    Err(e) => WorkerMsg {
                        unit_id: unit.id.clone(),
                        outcome: WorkerOutcome::Finished {
                            workspace,
                            result: UnitRunResult {
                                succeeded: false,
                                attempts_used: unit.max_attempts,
                                notes: Some(format!("executor error: {e}")),
                                history: Vec::new(),
                                cancelled: false,
                            },
                        },
                    },
                },
            };
            // Receiver only drops once the level is complete.
            let _ = tx.send(msg).await;
        });
        Ok(())
    }

    fn handle(&mut self, msg: WorkerMsg) -> Result<()> {
        match msg.outcome {
            WorkerOutcome::CreationFailed { message } => {
                tracing::error!(unit = %msg.unit_id, %message, "workspace creation failed");
                self.fail_unit(&msg.unit_id, 1, message, None)?;
            }
            WorkerOutcome::Finished { workspace, result } if result.cancelled => {
                // Back to pending so a later resume picks it up; the
                // untouched workspace is not worth preserving.
                let _ = self.workspaces.cleanup(&workspace);
                self.graph.set_status(&msg.unit_id, UnitStatus::Pending)?;
                self.manifest.record(&msg.unit_id, UnitRecord {
                    status: UnitStatus::Pending,
                    attempts_used: result.attempts_used,
                    last_error: None,
                    workspace: None,
                })?;
                self.save_manifest()?;
            }
            WorkerOutcome::Finished { workspace, result } if result.succeeded => {
                self.integrate(&msg.unit_id, workspace, result)?;
            }
            WorkerOutcome::Finished { workspace, result } => {
                // Workspace preserved for diagnosis.
                let notes = result
                    .notes
                    .unwrap_or_else(|| "failed without diagnostics".to_string());
                self.fail_unit(
                    &msg.unit_id,
                    result.attempts_used,
                    notes,
                    Some(workspace.path.display().to_string()),
                )?;
            }
        }
        Ok(())
    }

    /// Merge a successful unit into the mainline. A merge conflict that
    /// survives every resolution tier turns the success into a failure,
    /// with the workspace preserved.
    fn integrate(&mut self, unit_id: &str, workspace: Workspace, result: UnitRunResult) -> Result<()> {
        match self.workspaces.merge(&workspace)? {
            MergeOutcome::Merged { strategy } => {
                self.workspaces.cleanup(&workspace)?;
                self.graph.set_status(unit_id, UnitStatus::Succeeded)?;
                self.graph
                    .record_attempts(unit_id, result.attempts_used, None)?;
                self.manifest.record(unit_id, UnitRecord {
                    status: UnitStatus::Succeeded,
                    attempts_used: result.attempts_used,
                    last_error: None,
                    workspace: None,
                })?;
                self.save_manifest()?;
                tracing::info!(unit = unit_id, strategy = %strategy, "unit integrated");
            }
            MergeOutcome::Conflict { diagnostics } => {
                let notes = format!("merge conflict:\n{diagnostics}");
                self.fail_unit(
                    unit_id,
                    result.attempts_used,
                    notes,
                    Some(workspace.path.display().to_string()),
                )?;
            }
        }
        Ok(())
    }

    /// Terminal failure: record it and block the forward closure.
    fn fail_unit(
        &mut self,
        unit_id: &str,
        attempts_used: u32,
        notes: String,
        workspace: Option<String>,
    ) -> Result<()> {
        let blocked = self.graph.mark_failed(unit_id)?;
        self.graph
            .record_attempts(unit_id, attempts_used, Some(notes.clone()))?;
        self.manifest.record(unit_id, UnitRecord {
            status: UnitStatus::Failed,
            attempts_used,
            last_error: Some(notes),
            workspace,
        })?;
        for id in &blocked {
            self.manifest.record(id, UnitRecord {
                status: UnitStatus::Blocked,
                attempts_used: 0,
                last_error: Some(format!("dependency '{unit_id}' failed")),
                workspace: None,
            })?;
        }
        self.save_manifest()?;
        tracing::warn!(unit = unit_id, blocked = blocked.len(), "unit failed");
        Ok(())
    }

    fn finalize(&mut self) -> Result<RunStatus> {
        let status = if self.cancel.is_cancelled() {
            RunStatus::Cancelled
        } else if self
            .graph
            .units()
            .all(|u| u.status == UnitStatus::Succeeded)
        {
            RunStatus::Completed
        } else {
            RunStatus::PartiallyCompleted
        };
        self.manifest.set_run_status(status);
        self.save_manifest()?;
        let _ = self.cancel.clear_stale_flag();
        tracing::info!(status = %status, "run finished");
        Ok(status)
    }

    fn summary(&self, run_status: RunStatus) -> RunSummary {
        let mut summary = RunSummary {
            run_status,
            succeeded: Vec::new(),
            failed: Vec::new(),
            blocked: Vec::new(),
            skipped: self.skipped.clone(),
        };
        for unit in self.graph.units() {
            if summary.skipped.contains(&unit.id) {
                continue;
            }
            match unit.status {
                UnitStatus::Succeeded => summary.succeeded.push(unit.id.clone()),
                UnitStatus::Failed => summary.failed.push(unit.id.clone()),
                UnitStatus::Blocked => summary.blocked.push(unit.id.clone()),
                _ => {}
            }
        }
        summary
    }

    fn save_manifest(&self) -> Result<()> {
        crate::io::ensure_dir(&paths::conductor_dir(&self.root))?;
        self.manifest.save(&paths::manifest_path(&self.root))
    }

    /// Consume a pending operator cap override, if one was written by
    /// `conductor cap` since the last level boundary.
    fn apply_cap_override(&self) -> Result<()> {
        let path = paths::cap_override_path(&self.root);
        if !path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(&path)?;
        match raw.trim().parse::<usize>() {
            Ok(cap) => {
                tracing::info!(cap, "applying operator worker-cap override");
                self.limiter.set_cap(cap);
            }
            Err(_) => {
                tracing::warn!(content = %raw.trim(), "ignoring malformed worker-cap override");
            }
        }
        std::fs::remove_file(&path)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
