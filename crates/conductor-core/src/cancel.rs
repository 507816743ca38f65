//! Cooperative cancellation.
//!
//! Cancellation has two sources: in-process (ctrl-c handler) and
//! cross-process (`conductor cancel` touching a flag file under
//! `.conductor/`). Both are polled at attempt boundaries only — a running
//! collaborator invocation is never killed mid-flight.

use crate::error::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CancelToken {
    flag_path: PathBuf,
    local: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new(flag_path: PathBuf) -> Self {
        Self {
            flag_path,
            local: Arc::new(AtomicBool::new(false)),
        }
    }

    /// In-process cancellation request.
    pub fn request(&self) {
        self.local.store(true, Ordering::SeqCst);
    }

    /// Cross-process cancellation request: touch the flag file.
    pub fn request_via_file(&self) -> Result<()> {
        std::fs::write(&self.flag_path, b"")?;
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.local.load(Ordering::SeqCst) || self.flag_path.exists()
    }

    /// Remove a stale flag file left by an earlier run. An in-process
    /// request is never undone: a cancellation that raced the start of a
    /// run must still take effect.
    pub fn clear_stale_flag(&self) -> Result<()> {
        if self.flag_path.exists() {
            std::fs::remove_file(&self.flag_path)?;
        }
        Ok(())
    }
}
