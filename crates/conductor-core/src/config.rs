//! Harness configuration, persisted at `.conductor/config.yaml`.

use crate::error::{ConductorError, Result};
use crate::executor::ExecutorConfig;
use crate::ratelimit::{CapRestorePolicy, RateLimitConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// AgentConfig / HarnessConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Collaborator executable, resolved on PATH.
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_binary() -> String {
    "claude".to_string()
}

fn default_max_turns() -> u32 {
    50
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            model: None,
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Upper bound on concurrently running units.
    pub max_parallel: usize,
    /// Default self-correction ceiling; per-unit `max_attempts` overrides.
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub attempt_timeout_minutes: u64,
    pub check_timeout_minutes: u64,
    pub cap_restore: CapRestorePolicy,
    pub clean_streak: u32,
    pub agent: AgentConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            max_attempts: crate::unit::DEFAULT_MAX_ATTEMPTS,
            base_backoff_secs: 1,
            max_backoff_secs: 60,
            attempt_timeout_minutes: 45,
            check_timeout_minutes: 10,
            cap_restore: CapRestorePolicy::default(),
            clean_streak: 5,
            agent: AgentConfig::default(),
        }
    }
}

impl HarnessConfig {
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

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            base_backoff: Duration::from_secs(self.base_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            initial_worker_cap: self.max_parallel.max(1),
            min_worker_cap: 1,
            restore: self.cap_restore,
            clean_streak: self.clean_streak,
        }
    }

    pub fn executor(&self) -> ExecutorConfig {
        ExecutorConfig {
            attempt_timeout: Duration::from_secs(self.attempt_timeout_minutes * 60),
            check_timeout: Duration::from_secs(self.check_timeout_minutes * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let cfg = HarnessConfig::default();
        assert_eq!(cfg.max_parallel, 3);
        assert_eq!(cfg.max_attempts, 10);
        assert_eq!(cfg.agent.binary, "claude");
        assert_eq!(cfg.cap_restore, CapRestorePolicy::PerLevel);
    }

    #[test]
    fn roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let mut cfg = HarnessConfig::default();
        cfg.max_parallel = 5;
        cfg.agent.model = Some("opus".to_string());
        cfg.save(&path).unwrap();
        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.max_parallel, 5);
        assert_eq!(loaded.agent.model.as_deref(), Some("opus"));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: HarnessConfig = serde_yaml::from_str("max_parallel: 8\n").unwrap();
        assert_eq!(cfg.max_parallel, 8);
        assert_eq!(cfg.max_attempts, 10);
        assert_eq!(cfg.base_backoff_secs, 1);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            HarnessConfig::load(&dir.path().join("config.yaml")),
            Err(ConductorError::NotInitialized)
        ));
    }

    #[test]
    fn conversions() {
        let cfg = HarnessConfig::default();
        let rl = cfg.rate_limit();
        assert_eq!(rl.base_backoff, Duration::from_secs(1));
        assert_eq!(rl.initial_worker_cap, 3);
        let ex = cfg.executor();
        assert_eq!(ex.attempt_timeout, Duration::from_secs(45 * 60));
    }
}
