use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// UnitStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a unit of work.
///
/// Transitions are applied only by the scheduler coordinator:
/// `Pending → Running → Succeeded | Failed`, and `Pending → Blocked` when a
/// dependency fails terminally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Blocked,
}

impl UnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Running => "running",
            UnitStatus::Succeeded => "succeeded",
            UnitStatus::Failed => "failed",
            UnitStatus::Blocked => "blocked",
        }
    }

    /// Terminal states are never left once entered (within one run).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitStatus::Succeeded | UnitStatus::Failed | UnitStatus::Blocked
        )
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for UnitStatus {
    fn default() -> Self {
        UnitStatus::Pending
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    PartiallyCompleted,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::PartiallyCompleted => "partially_completed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FailureClass
// ---------------------------------------------------------------------------

/// Coarse classification of a failed validation attempt, used to steer the
/// corrective re-invocation of the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Compile/parse/syntax-level breakage.
    Structural,
    /// Unresolved names, missing files, dangling imports.
    MissingReference,
    /// Code builds but behaves wrong (test assertions, wrong output).
    Behavioral,
    Unclassified,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Structural => "structural",
            FailureClass::MissingReference => "missing_reference",
            FailureClass::Behavioral => "behavioral",
            FailureClass::Unclassified => "unclassified",
        }
    }

    /// Corrective guidance included in the retry prompt for this class.
    pub fn fix_hint(self) -> &'static str {
        match self {
            FailureClass::Structural => {
                "The previous attempt left the code in a state that does not parse or compile. \
                 Fix the structural errors first, then re-check the rest of the change."
            }
            FailureClass::MissingReference => {
                "The previous attempt references names, files, or modules that do not exist. \
                 Create the missing pieces or correct the references."
            }
            FailureClass::Behavioral => {
                "The code builds but the acceptance checks fail on behavior. Re-read the failing \
                 check output and adjust the logic; do not weaken or skip the checks."
            }
            FailureClass::Unclassified => {
                "The acceptance checks fail for an unclear reason. Re-read the check output \
                 carefully before changing anything."
            }
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_terminality() {
        assert!(UnitStatus::Succeeded.is_terminal());
        assert!(UnitStatus::Failed.is_terminal());
        assert!(UnitStatus::Blocked.is_terminal());
        assert!(!UnitStatus::Pending.is_terminal());
        assert!(!UnitStatus::Running.is_terminal());
    }

    #[test]
    fn status_serde_snake_case() {
        let s = serde_yaml::to_string(&UnitStatus::Blocked).unwrap();
        assert_eq!(s.trim(), "blocked");
        let back: UnitStatus = serde_yaml::from_str("succeeded").unwrap();
        assert_eq!(back, UnitStatus::Succeeded);
    }

    #[test]
    fn failure_class_display() {
        assert_eq!(FailureClass::MissingReference.to_string(), "missing_reference");
    }
}
