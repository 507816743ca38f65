use anyhow::Context;
use conductor_core::cancel::CancelToken;
use conductor_core::{io, paths};
use std::path::Path;

/// Signal a running `conductor run` (possibly in another process) to stop at
/// the next attempt boundaries.
pub fn run(root: &Path) -> anyhow::Result<()> {
    if !paths::conductor_dir(root).exists() {
        anyhow::bail!("not initialized: run 'conductor init'");
    }
    io::ensure_dir(&paths::conductor_dir(root))?;
    CancelToken::new(paths::cancel_path(root))
        .request_via_file()
        .context("failed to write cancel flag")?;
    println!("cancellation requested; in-flight attempts will finish first");
    Ok(())
}
