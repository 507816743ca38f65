use crate::error::{ConductorError, Result};
use crate::unit::Unit;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Declarative unit source, produced by an external planning phase and
/// consumed read-only by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default = "default_version")]
    pub version: u32,
    pub units: Vec<Unit>,
}

fn default_version() -> u32 {
    1
}

impl Plan {
    pub fn new(units: Vec<Unit>) -> Self {
        Self { version: 1, units }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConductorError::NotInitialized);
        }
        let data = std::fs::read_to_string(path)?;
        let plan: Plan = serde_yaml::from_str(&data)?;
        for unit in &plan.units {
            unit.validate()?;
        }
        Ok(plan)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }
}

/// Starter plan written by `conductor init`.
pub fn template() -> &'static str {
    r#"version: 1
units:
  - id: example-unit
    description: Describe the feature for the coding agent here.
    dependencies: []
    checks:
      - name: build
        run: cargo build
      - name: tests
        run: cargo test
"#
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.yaml");
        let plan = Plan::new(vec![
            Unit::new("db-schema", "Design the schema"),
            Unit::new("auth-api", "Auth endpoints").with_dependencies(&["db-schema"]),
        ]);
        plan.save(&path).unwrap();
        let loaded = Plan::load(&path).unwrap();
        assert_eq!(loaded.units.len(), 2);
        assert_eq!(loaded.units[1].dependencies, vec!["db-schema"]);
    }

    #[test]
    fn template_parses() {
        let plan: Plan = serde_yaml::from_str(template()).unwrap();
        assert_eq!(plan.units.len(), 1);
        assert_eq!(plan.units[0].checks.len(), 2);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Plan::load(&dir.path().join("plan.yaml")),
            Err(ConductorError::NotInitialized)
        ));
    }

    #[test]
    fn load_rejects_invalid_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, "units:\n  - id: Bad_Id\n    description: x\n").unwrap();
        assert!(matches!(
            Plan::load(&path),
            Err(ConductorError::InvalidUnitId(_))
        ));
    }
}
