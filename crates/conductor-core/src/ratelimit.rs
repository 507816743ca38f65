//! Throttling state shared by all workers in a run.
//!
//! Backoff math is deterministic; jitter is applied separately so callers
//! (and tests) can reason about the raw sequence. Worker-cap changes are
//! monotonic downward within a level — restoration only happens through an
//! explicit reset, governed by [`CapRestorePolicy`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

// ---------------------------------------------------------------------------
// CapRestorePolicy
// ---------------------------------------------------------------------------

/// When a previously reduced worker cap is allowed back up to its initial
/// value. Conservative on purpose: the cap never rises mid-level on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapRestorePolicy {
    /// Restore at the start of each level (scheduler calls `reset_for_level`).
    PerLevel,
    /// Restore after `clean_streak` consecutive completions without throttling.
    CleanStreak,
    /// Restore only via an explicit operator `set_cap`.
    Manual,
}

impl Default for CapRestorePolicy {
    fn default() -> Self {
        CapRestorePolicy::PerLevel
    }
}

// ---------------------------------------------------------------------------
// RateLimitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub initial_worker_cap: usize,
    pub min_worker_cap: usize,
    pub restore: CapRestorePolicy,
    /// Consecutive clean completions required by `CleanStreak`.
    pub clean_streak: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            initial_worker_cap: 3,
            min_worker_cap: 1,
            restore: CapRestorePolicy::PerLevel,
            clean_streak: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Inner {
    consecutive_throttles: u32,
    worker_cap: usize,
    last_backoff: Duration,
    clean_completions: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    cfg: RateLimitConfig,
    inner: Mutex<Inner>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        let inner = Inner {
            consecutive_throttles: 0,
            worker_cap: cfg.initial_worker_cap,
            last_backoff: Duration::ZERO,
            clean_completions: 0,
        };
        Self {
            cfg,
            inner: Mutex::new(inner),
        }
    }

    /// Record a throttling signal and return the backoff to wait before
    /// retrying: `min(max_backoff, base_backoff * 2^(n-1))` for the n-th
    /// consecutive throttle. Also reduces the worker cap by one, down to
    /// the configured floor.
    pub fn on_throttled(&self) -> Duration {
        let mut inner = self.inner.lock().expect("rate limiter lock poisoned");
        inner.consecutive_throttles += 1;
        inner.clean_completions = 0;

        let exp = inner.consecutive_throttles.saturating_sub(1).min(32);
        let raw = self
            .cfg
            .base_backoff
            .saturating_mul(1u32 << exp.min(31))
            .min(self.cfg.max_backoff);
        inner.last_backoff = raw;

        if inner.worker_cap > self.cfg.min_worker_cap {
            inner.worker_cap -= 1;
        }
        tracing::warn!(
            consecutive = inner.consecutive_throttles,
            backoff_secs = raw.as_secs(),
            worker_cap = inner.worker_cap,
            "collaborator throttled"
        );
        raw
    }

    /// Record a completion that involved no throttling. Resets the
    /// consecutive-throttle counter; the cap is restored only when the
    /// `CleanStreak` policy's threshold is reached.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().expect("rate limiter lock poisoned");
        inner.consecutive_throttles = 0;
        inner.last_backoff = Duration::ZERO;
        inner.clean_completions += 1;
        if self.cfg.restore == CapRestorePolicy::CleanStreak
            && inner.clean_completions >= self.cfg.clean_streak
        {
            inner.worker_cap = self.cfg.initial_worker_cap;
            inner.clean_completions = 0;
        }
    }

    /// The cap the scheduler must respect when sizing the next dispatch batch.
    pub fn current_worker_cap(&self) -> usize {
        self.inner.lock().expect("rate limiter lock poisoned").worker_cap
    }

    pub fn last_backoff(&self) -> Duration {
        self.inner.lock().expect("rate limiter lock poisoned").last_backoff
    }

    /// Level-boundary reset. Under `PerLevel`, restores the cap; under every
    /// policy, clears the consecutive-throttle counter so a new level starts
    /// from the base backoff.
    pub fn reset_for_level(&self) {
        let mut inner = self.inner.lock().expect("rate limiter lock poisoned");
        inner.consecutive_throttles = 0;
        inner.last_backoff = Duration::ZERO;
        if self.cfg.restore == CapRestorePolicy::PerLevel {
            inner.worker_cap = self.cfg.initial_worker_cap;
        }
    }

    /// Operator override, clamped to at least one worker.
    pub fn set_cap(&self, cap: usize) {
        let mut inner = self.inner.lock().expect("rate limiter lock poisoned");
        inner.worker_cap = cap.max(1);
    }

    /// Add randomized jitter (up to 25%) so concurrent workers backing off
    /// from the same throttle episode don't retry in lockstep.
    pub fn jittered(&self, raw: Duration) -> Duration {
        if raw.is_zero() {
            return raw;
        }
        let spread = (raw.as_millis() as u64 / 4).max(1);
        raw + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
