use anyhow::Context;
use conductor_core::{io, paths};
use std::path::Path;

/// Queue a worker-cap override for a running scheduler. Consumed at the next
/// level boundary.
pub fn run(root: &Path, workers: usize) -> anyhow::Result<()> {
    if !paths::conductor_dir(root).exists() {
        anyhow::bail!("not initialized: run 'conductor init'");
    }
    let workers = workers.max(1);
    io::atomic_write(
        &paths::cap_override_path(root),
        format!("{workers}\n").as_bytes(),
    )
    .context("failed to write worker-cap override")?;
    println!("worker cap override of {workers} queued for the next level boundary");
    Ok(())
}
