use crate::output;
use anyhow::Context;
use clap::Subcommand;
use conductor_core::workspace::WorkspaceManager;
use conductor_core::paths;
use std::path::Path;

#[derive(Subcommand)]
pub enum WorkspaceSubcommand {
    /// List unit workspaces present on disk
    List,
    /// Remove a preserved workspace (worktree and branch) for a unit
    Cleanup { unit: String },
}

pub fn run(root: &Path, subcommand: WorkspaceSubcommand, json: bool) -> anyhow::Result<()> {
    let wm = WorkspaceManager::new(root);
    match subcommand {
        WorkspaceSubcommand::List => {
            let ids = wm.list().context("failed to list workspaces")?;
            if json {
                output::print_json(&ids)?;
            } else if ids.is_empty() {
                println!("no workspaces");
            } else {
                let rows = ids
                    .iter()
                    .map(|id| {
                        vec![
                            id.clone(),
                            paths::workspace_dir(root, id).display().to_string(),
                        ]
                    })
                    .collect();
                output::print_table(&["UNIT", "PATH"], rows);
            }
        }
        WorkspaceSubcommand::Cleanup { unit } => {
            wm.cleanup_unit(&unit)
                .with_context(|| format!("failed to clean up workspace for '{unit}'"))?;
            println!("removed workspace for '{unit}'");
        }
    }
    Ok(())
}
