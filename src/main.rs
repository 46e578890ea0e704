use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use specflow::config::SpecflowConfig;
use specflow::paths::resolve_root;

mod cmd;

#[derive(Parser)]
#[command(name = "specflow")]
#[command(
    version,
    about = "Workflow state tracker - keeps orchestration state, roadmap, tasks and branches consistent"
)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Take an exclusive lock on the state file around writes
    #[arg(long, global = true)]
    pub lock: bool,

    /// Project directory (defaults to the nearest ancestor with a project marker)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a project (or fill in missing artifacts)
    Init,
    /// Show the current phase, step and health summary
    Status,
    /// Run the consistency checks
    Check {
        /// Apply automatic repairs for fixable issues
        #[arg(long)]
        fix: bool,
        /// Store the result in the state document
        #[arg(long)]
        record: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recommend the next action
    Next {
        #[arg(long)]
        json: bool,
    },
    /// Upgrade state and manifest to the current format
    Migrate {
        /// Describe the migration without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Detect the project's format generation
    Detect {
        #[arg(long)]
        json: bool,
    },
    /// Read a state field by dot-path (e.g. `step.current`)
    Get {
        /// Dot-path; omit to print the whole document
        path: Option<String>,
    },
    /// Write a state field by dot-path
    Set { path: String, value: String },
    /// Move to a workflow step, keeping the step index aligned
    Step {
        name: String,
        /// Step status (defaults to in_progress)
        #[arg(long)]
        status: Option<String>,
    },
    /// Phase lifecycle
    Phase {
        #[command(subcommand)]
        command: PhaseCommands,
    },
    /// Show the roadmap as parsed
    Roadmap {
        #[arg(long)]
        json: bool,
    },
    /// Show tasks of the active feature
    Tasks {
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum PhaseCommands {
    /// Start a roadmap phase (defaults to the next open one)
    Start { number: Option<String> },
    /// Record the active phase in history and clear it
    Close,
    /// Record the user gate decision for the active phase
    Gate { status: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default config.toml
    Init,
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let start = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    // init always targets the given directory; everything else walks upward
    let root = match cli.command {
        Commands::Init => start,
        _ => resolve_root(&start).unwrap_or(start),
    };
    let config = SpecflowConfig::load(&root)?.with_cli_lock(cli.lock);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Status => cmd::cmd_status(&config)?,
        Commands::Check { fix, record, json } => cmd::cmd_check(&config, *fix, *record, *json)?,
        Commands::Next { json } => cmd::cmd_next(&config, *json)?,
        Commands::Migrate { dry_run } => cmd::cmd_migrate(&config, *dry_run)?,
        Commands::Detect { json } => cmd::cmd_detect(&config, *json)?,
        Commands::Get { path } => cmd::cmd_get(&config, path.as_deref())?,
        Commands::Set { path, value } => cmd::cmd_set(&config, path, value)?,
        Commands::Step { name, status } => cmd::cmd_step(&config, name, status.as_deref())?,
        Commands::Phase { command } => cmd::cmd_phase(&config, command.clone())?,
        Commands::Roadmap { json } => cmd::cmd_roadmap(&config, *json)?,
        Commands::Tasks { json } => cmd::cmd_tasks(&config, *json)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
