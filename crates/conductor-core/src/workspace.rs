//! Isolated per-unit workspaces over git worktrees.
//!
//! The mainline is the git repository at the project root. `create` branches
//! a worktree from the current mainline tip; `merge` integrates a unit
//! branch back, serialized behind a merge lock; `cleanup` removes worktree
//! and branch. The mainline is mutated only by `merge` — `create` and
//! `cleanup` never touch it. Failed workspaces are preserved for diagnosis
//! and only removed by an explicit operator cleanup.

use crate::error::{ConductorError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;

/// Committer identity for merge commits made by the scheduler.
const GIT_IDENTITY: [&str; 4] = [
    "-c",
    "user.name=conductor",
    "-c",
    "user.email=conductor@localhost",
];

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Workspace {
    pub unit_id: String,
    pub path: PathBuf,
    pub branch: String,
    /// Mainline revision this workspace was branched from.
    pub base_rev: String,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub fn branch_name(unit_id: &str) -> String {
        format!("unit/{unit_id}")
    }
}

// ---------------------------------------------------------------------------
// Merge strategies
// ---------------------------------------------------------------------------

pub enum Resolution {
    Resolved,
    Conflict(String),
}

/// One tier of conflict resolution. Strategies are tried in order; the
/// first `Resolved` wins. A strategy must leave the mainline untouched
/// when it reports `Conflict`.
pub trait MergeStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn attempt(&self, mainline: &Path, ws: &Workspace) -> Result<Resolution>;
}

/// Tier 1: plain `git merge --no-ff`.
struct CleanMerge;

impl MergeStrategy for CleanMerge {
    fn name(&self) -> &str {
        "clean-merge"
    }

    fn attempt(&self, mainline: &Path, ws: &Workspace) -> Result<Resolution> {
        try_merge(mainline, ws, &[])
    }
}

/// Tier 2: conflict-only resolution pass favoring the workspace side
/// (`-X theirs`). Only conflicting hunks are taken from the unit branch;
/// everything else merges normally. Modify/delete and similar conflicts
/// still escalate.
struct FavorWorkspace;

impl MergeStrategy for FavorWorkspace {
    fn name(&self) -> &str {
        "favor-workspace"
    }

    fn attempt(&self, mainline: &Path, ws: &Workspace) -> Result<Resolution> {
        try_merge(mainline, ws, &["-X", "theirs"])
    }
}

fn try_merge(mainline: &Path, ws: &Workspace, extra: &[&str]) -> Result<Resolution> {
    let msg = format!("merge unit '{}'", ws.unit_id);
    let mut args: Vec<&str> = GIT_IDENTITY.to_vec();
    args.extend(["merge", "--no-ff"]);
    args.extend(extra);
    args.extend(["-m", msg.as_str(), ws.branch.as_str()]);

    let out = git(mainline, &args)?;
    if out.status.success() {
        return Ok(Resolution::Resolved);
    }

    // Collect conflicted paths before aborting, for the diagnostics trail.
    let conflicted = git(mainline, &["diff", "--name-only", "--diff-filter=U"])
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_default();
    let _ = git(mainline, &["merge", "--abort"]);

    let mut diag = String::from_utf8_lossy(&out.stderr).trim().to_string();
    if diag.is_empty() {
        diag = String::from_utf8_lossy(&out.stdout).trim().to_string();
    }
    if !conflicted.is_empty() {
        diag = format!("{diag}\nconflicted files:\n{conflicted}");
    }
    Ok(Resolution::Conflict(diag))
}

// ---------------------------------------------------------------------------
// MergeOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Merged { strategy: String },
    /// Every tier failed. The workspace is preserved and the mainline is
    /// left exactly as it was.
    Conflict { diagnostics: String },
}

// ---------------------------------------------------------------------------
// WorkspaceManager
// ---------------------------------------------------------------------------

pub struct WorkspaceManager {
    mainline: PathBuf,
    workspaces: PathBuf,
    strategies: Vec<Box<dyn MergeStrategy>>,
    /// The mainline is the one truly shared mutable resource: merges are
    /// serialized even though units execute concurrently.
    merge_lock: Mutex<()>,
}

impl WorkspaceManager {
    pub fn new(root: &Path) -> Self {
        Self {
            mainline: root.to_path_buf(),
            workspaces: paths::workspaces_dir(root),
            strategies: vec![Box::new(CleanMerge), Box::new(FavorWorkspace)],
            merge_lock: Mutex::new(()),
        }
    }

    /// True if the mainline directory is inside a git repository.
    pub fn is_repo(root: &Path) -> bool {
        git(root, &["rev-parse", "--git-dir"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Allocate a new isolated workspace branched from the mainline tip.
    ///
    /// At most one workspace exists per unit: if the path is already
    /// present (e.g. preserved from a failed earlier run), creation fails
    /// and the operator must clean up first.
    pub fn create(&self, unit_id: &str) -> Result<Workspace> {
        paths::validate_unit_id(unit_id)?;
        let path = self.workspaces.join(unit_id);
        if path.exists() {
            return Err(ConductorError::WorkspaceCreation {
                unit: unit_id.to_string(),
                message: format!("workspace already exists at {}", path.display()),
            });
        }
        crate::io::ensure_dir(&self.workspaces)?;

        let base_rev = git_ok(&self.mainline, &["rev-parse", "HEAD"]).map_err(|e| {
            ConductorError::WorkspaceCreation {
                unit: unit_id.to_string(),
                message: e.to_string(),
            }
        })?;

        let branch = Workspace::branch_name(unit_id);
        let path_str = path.to_string_lossy().into_owned();
        // -B: a stale branch from an abandoned run is reset rather than fatal.
        git_ok(
            &self.mainline,
            &["worktree", "add", "-B", branch.as_str(), path_str.as_str(), "HEAD"],
        )
        .map_err(|e| ConductorError::WorkspaceCreation {
            unit: unit_id.to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(unit = unit_id, path = %path.display(), "workspace created");
        Ok(Workspace {
            unit_id: unit_id.to_string(),
            path,
            branch,
            base_rev,
            created_at: Utc::now(),
        })
    }

    /// Integrate a workspace's changes into the mainline.
    ///
    /// Commits whatever the unit left in its worktree, then walks the
    /// resolution tiers. On `Conflict` the mainline is untouched and the
    /// workspace preserved; the caller marks the unit failed.
    pub fn merge(&self, ws: &Workspace) -> Result<MergeOutcome> {
        let _guard = self.merge_lock.lock().expect("merge lock poisoned");

        self.commit_all(ws)?;

        let mut last_diag = String::new();
        for strategy in &self.strategies {
            match strategy.attempt(&self.mainline, ws)? {
                Resolution::Resolved => {
                    tracing::info!(unit = %ws.unit_id, strategy = strategy.name(), "merged");
                    return Ok(MergeOutcome::Merged {
                        strategy: strategy.name().to_string(),
                    });
                }
                Resolution::Conflict(diag) => {
                    tracing::warn!(
                        unit = %ws.unit_id,
                        strategy = strategy.name(),
                        "merge tier failed"
                    );
                    last_diag = diag;
                }
            }
        }
        Ok(MergeOutcome::Conflict {
            diagnostics: last_diag,
        })
    }

    /// Delete a workspace's worktree and branch. Only called after a
    /// successful merge, or explicitly by an operator for abandoned
    /// failed workspaces — never automatically on failure paths.
    pub fn cleanup(&self, ws: &Workspace) -> Result<()> {
        let path_str = ws.path.to_string_lossy().into_owned();
        git_ok(
            &self.mainline,
            &["worktree", "remove", "--force", path_str.as_str()],
        )?;
        git_ok(&self.mainline, &["branch", "-D", ws.branch.as_str()])?;
        tracing::debug!(unit = %ws.unit_id, "workspace cleaned up");
        Ok(())
    }

    /// Operator cleanup by unit id, for workspaces preserved from failed
    /// runs. Best-effort on the branch: the worktree is the scarce resource.
    pub fn cleanup_unit(&self, unit_id: &str) -> Result<()> {
        let path = self.workspaces.join(unit_id);
        if !path.exists() {
            return Err(ConductorError::WorkspaceNotFound(unit_id.to_string()));
        }
        let path_str = path.to_string_lossy().into_owned();
        git_ok(
            &self.mainline,
            &["worktree", "remove", "--force", path_str.as_str()],
        )?;
        let branch = Workspace::branch_name(unit_id);
        let _ = git(&self.mainline, &["branch", "-D", branch.as_str()]);
        Ok(())
    }

    /// Unit ids with a workspace directory on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.workspaces.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.workspaces)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn commit_all(&self, ws: &Workspace) -> Result<()> {
        git_ok(&ws.path, &["add", "-A"])?;
        let msg = format!("unit '{}' changes", ws.unit_id);
        let mut args: Vec<&str> = GIT_IDENTITY.to_vec();
        args.extend(["commit", "--allow-empty", "-m", msg.as_str()]);
        git_ok(&ws.path, &args)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// git helpers
// ---------------------------------------------------------------------------

fn git(dir: &Path, args: &[&str]) -> Result<Output> {
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|e| ConductorError::Vcs(format!("failed to invoke git: {e}")))
}

fn git_ok(dir: &Path, args: &[&str]) -> Result<String> {
    let out = git(dir, args)?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(ConductorError::Vcs(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
