//! Run manifest: durable record of a scheduler run.
//!
//! Saved incrementally after every unit transition so a killed process can
//! be resumed. YAML on disk, next to the plan, so operators can read it
//! directly.

use crate::error::{ConductorError, Result};
use crate::types::{RunStatus, UnitStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// UnitRecord / RunManifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRecord {
    pub status: UnitStatus,
    #[serde(default)]
    pub attempts_used: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Workspace path, kept for failed units so the operator can inspect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

impl UnitRecord {
    fn pending() -> Self {
        Self {
            status: UnitStatus::Pending,
            attempts_used: 0,
            last_error: None,
            workspace: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_version")]
    pub version: u32,
    pub run_id: Uuid,
    pub run_status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Keyed by unit id; BTreeMap keeps the file diffable between saves.
    pub units: BTreeMap<String, UnitRecord>,
}

fn default_version() -> u32 {
    1
}

impl RunManifest {
    /// Fresh manifest covering `unit_ids`, all pending.
    pub fn start(unit_ids: impl IntoIterator<Item = String>) -> Self {
        let now = Utc::now();
        Self {
            version: 1,
            run_id: Uuid::new_v4(),
            run_status: RunStatus::Running,
            started_at: now,
            updated_at: now,
            units: unit_ids
                .into_iter()
                .map(|id| (id, UnitRecord::pending()))
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConductorError::NotInitialized);
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Record a unit transition and bump the timestamp. Unknown ids are a
    /// coordinator bug, surfaced as an error rather than silently inserted.
    pub fn record(&mut self, unit_id: &str, record: UnitRecord) -> Result<()> {
        let slot = self
            .units
            .get_mut(unit_id)
            .ok_or_else(|| ConductorError::UnitNotFound(unit_id.to_string()))?;
        *slot = record;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_run_status(&mut self, status: RunStatus) {
        self.run_status = status;
        self.updated_at = Utc::now();
    }

    /// Ids already succeeded; a resuming run skips these.
    pub fn succeeded_ids(&self) -> Vec<String> {
        self.units
            .iter()
            .filter(|(_, r)| r.status == UnitStatus::Succeeded)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Prepare an interrupted manifest for resumption: anything that was
    /// running or terminally failed/blocked goes back to pending; succeeded
    /// units keep their record.
    pub fn reset_for_resume(&mut self) {
        for record in self.units.values_mut() {
            if record.status != UnitStatus::Succeeded {
                *record = UnitRecord::pending();
            }
        }
        self.run_status = RunStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn counts(&self) -> BTreeMap<UnitStatus, usize> {
        let mut counts = BTreeMap::new();
        for record in self.units.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
