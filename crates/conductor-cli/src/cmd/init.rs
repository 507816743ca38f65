use anyhow::Context;
use conductor_core::config::HarnessConfig;
use conductor_core::{io, paths, plan};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing conductor in: {}", root.display());

    io::ensure_dir(&paths::conductor_dir(root))
        .with_context(|| format!("failed to create {}", paths::CONDUCTOR_DIR))?;

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        HarnessConfig::default()
            .save(&config_path)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let plan_path = paths::plan_path(root);
    if io::write_if_missing(&plan_path, plan::template().as_bytes())
        .context("failed to write plan.yaml")?
    {
        println!("  created: {}", paths::PLAN_FILE);
    } else {
        println!("  exists:  {}", paths::PLAN_FILE);
    }

    // Workspaces and run-scoped control files never belong in history.
    for entry in [
        ".conductor/workspaces/",
        ".conductor/manifest.yaml",
        ".conductor/cancel",
        ".conductor/worker-cap",
    ] {
        io::ensure_gitignore_entry(root, entry).context("failed to update .gitignore")?;
    }
    println!("  updated: .gitignore");

    println!("\nEdit {} to describe your units, then run: conductor run", paths::PLAN_FILE);
    Ok(())
}
