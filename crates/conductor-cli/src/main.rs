mod agent;
mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::plan::PlanSubcommand;
use cmd::workspace::WorkspaceSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "conductor",
    about = "Dependency-aware parallel build scheduler for coding agents",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .conductor/ or .git/)
    #[arg(long, global = true, env = "CONDUCTOR_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize conductor in the current project
    Init,

    /// Inspect and validate the unit plan
    Plan {
        #[command(subcommand)]
        subcommand: PlanSubcommand,
    },

    /// Execute the plan
    Run {
        /// Resume an interrupted run, skipping already-succeeded units
        #[arg(long)]
        resume: bool,

        /// Override the configured worker cap for this run
        #[arg(long)]
        max_parallel: Option<usize>,
    },

    /// Show the state of the current or last run
    Status,

    /// Request cancellation of a running `conductor run`
    Cancel,

    /// Queue a worker-cap override for a running scheduler
    Cap { workers: usize },

    /// Manage unit workspaces
    Workspace {
        #[command(subcommand)]
        subcommand: WorkspaceSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Plan { subcommand } => cmd::plan::run(&root, subcommand, cli.json),
        Commands::Run {
            resume,
            max_parallel,
        } => cmd::run::run(&root, resume, max_parallel, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Cancel => cmd::cancel::run(&root),
        Commands::Cap { workers } => cmd::cap::run(&root, workers),
        Commands::Workspace { subcommand } => cmd::workspace::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
