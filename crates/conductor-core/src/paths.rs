use crate::error::{ConductorError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CONDUCTOR_DIR: &str = ".conductor";
pub const WORKSPACES_DIR: &str = ".conductor/workspaces";

pub const CONFIG_FILE: &str = ".conductor/config.yaml";
pub const PLAN_FILE: &str = ".conductor/plan.yaml";
pub const MANIFEST_FILE: &str = ".conductor/manifest.yaml";
pub const CANCEL_FILE: &str = ".conductor/cancel";
pub const CAP_OVERRIDE_FILE: &str = ".conductor/worker-cap";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn conductor_dir(root: &Path) -> PathBuf {
    root.join(CONDUCTOR_DIR)
}

pub fn workspaces_dir(root: &Path) -> PathBuf {
    root.join(WORKSPACES_DIR)
}

pub fn workspace_dir(root: &Path, unit_id: &str) -> PathBuf {
    workspaces_dir(root).join(unit_id)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn plan_path(root: &Path) -> PathBuf {
    root.join(PLAN_FILE)
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

pub fn cancel_path(root: &Path) -> PathBuf {
    root.join(CANCEL_FILE)
}

pub fn cap_override_path(root: &Path) -> PathBuf {
    root.join(CAP_OVERRIDE_FILE)
}

// ---------------------------------------------------------------------------
// Unit id validation
// ---------------------------------------------------------------------------

static UNIT_ID_RE: OnceLock<Regex> = OnceLock::new();

fn unit_id_re() -> &'static Regex {
    UNIT_ID_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Unit ids double as branch names and workspace directory names, so they
/// follow the same rule everywhere: lowercase alphanumeric with hyphens.
pub fn validate_unit_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !unit_id_re().is_match(id) {
        return Err(ConductorError::InvalidUnitId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
