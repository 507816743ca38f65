use crate::paths::validate_unit_id;
use crate::types::UnitStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default ceiling for the self-correction retry loop.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

// ---------------------------------------------------------------------------
// AcceptanceCheck
// ---------------------------------------------------------------------------

/// One shell-invocable validation step declared for a unit.
///
/// Checks run with the unit's workspace as working directory. A unit passes
/// only when every check passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCheck {
    pub name: String,
    /// Shell command, executed via `sh -c`.
    pub run: String,
}

impl AcceptanceCheck {
    pub fn new(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: run.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// A discrete, independently executable task with declared dependencies and
/// acceptance checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub checks: Vec<AcceptanceCheck>,
    #[serde(default)]
    pub status: UnitStatus,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Free-form diagnostic text, set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Unit {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            checks: Vec::new(),
            status: UnitStatus::Pending,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            result_notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_check(mut self, name: &str, run: &str) -> Self {
        self.checks.push(AcceptanceCheck::new(name, run));
        self
    }

    /// Validate the id against the shared unit-id rule.
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_unit_id(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
