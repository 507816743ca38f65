use crate::output;
use anyhow::Context;
use clap::Subcommand;
use conductor_core::graph::DependencyGraph;
use conductor_core::plan::Plan;
use conductor_core::paths;
use std::path::Path;

#[derive(Subcommand)]
pub enum PlanSubcommand {
    /// Validate the plan: ids, dependency references, and cycle-freedom
    Validate,
    /// Show the computed execution levels
    Levels,
    /// List the plan's units
    Show,
}

pub fn run(root: &Path, subcommand: PlanSubcommand, json: bool) -> anyhow::Result<()> {
    let plan = Plan::load(&paths::plan_path(root)).context("failed to load plan")?;
    let graph = DependencyGraph::build(plan.units.clone()).context("invalid plan")?;

    match subcommand {
        PlanSubcommand::Validate => {
            if json {
                output::print_json(&serde_json::json!({
                    "valid": true,
                    "units": graph.len(),
                    "levels": graph.levels().len(),
                }))?;
            } else {
                println!(
                    "plan ok: {} units across {} levels",
                    graph.len(),
                    graph.levels().len()
                );
            }
        }
        PlanSubcommand::Levels => {
            let levels = graph.levels();
            if json {
                output::print_json(&levels)?;
            } else {
                for (k, level) in levels.iter().enumerate() {
                    println!("level {k}: {}", level.join(", "));
                }
            }
        }
        PlanSubcommand::Show => {
            if json {
                output::print_json(&plan)?;
            } else {
                let rows = plan
                    .units
                    .iter()
                    .map(|u| {
                        vec![
                            u.id.clone(),
                            u.dependencies.join(", "),
                            u.checks.len().to_string(),
                            u.description.clone(),
                        ]
                    })
                    .collect();
                output::print_table(&["UNIT", "DEPENDS ON", "CHECKS", "DESCRIPTION"], rows);
            }
        }
    }
    Ok(())
}
