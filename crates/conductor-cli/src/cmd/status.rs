use crate::output;
use anyhow::Context;
use conductor_core::manifest::RunManifest;
use conductor_core::paths;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let manifest =
        RunManifest::load(&paths::manifest_path(root)).context("no run manifest found")?;

    if json {
        return output::print_json(&manifest);
    }

    println!(
        "run {} ({}), started {}, updated {}",
        manifest.run_id,
        manifest.run_status,
        manifest.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        manifest.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    println!();

    let rows = manifest
        .units
        .iter()
        .map(|(id, r)| {
            vec![
                id.clone(),
                r.status.to_string(),
                r.attempts_used.to_string(),
                r.last_error
                    .as_deref()
                    .map(first_line)
                    .unwrap_or_default(),
            ]
        })
        .collect();
    output::print_table(&["UNIT", "STATUS", "ATTEMPTS", "LAST ERROR"], rows);

    let counts = manifest.counts();
    let summary: Vec<String> = counts
        .iter()
        .map(|(status, n)| format!("{n} {status}"))
        .collect();
    println!("\n{}", summary.join(", "));
    Ok(())
}

fn first_line(s: &str) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.chars().count() > 80 {
        let cut: String = line.chars().take(77).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
