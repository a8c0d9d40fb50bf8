//! setuptask
//!
//! Runs the idempotent, ordered setup tasks declared in a TOML file and
//! records a stamp per completed task.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod layout;

use app::App;
use config::Config;

#[derive(Parser)]
#[command(name = "setuptask")]
#[command(about = "Idempotent, ordered setup tasks", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run setup tasks of all owners, or of the named ones
    Run {
        /// Owner to run (repeatable)
        #[arg(long = "owner")]
        owners: Vec<String>,
        /// Only print what would run
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the order and decision of every task
    Plan {
        /// Owner to plan (repeatable)
        #[arg(long = "owner")]
        owners: Vec<String>,
    },
    /// Run a single task
    Task {
        owner: String,
        task: String,
        /// Run even if the task is stamped or its check passes
        #[arg(long)]
        force: bool,
    },
    /// List stamps of an owner
    Stamps { owner: String },
    /// Delete one or all stamps of an owner
    Clear { owner: String, task: Option<String> },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = Config::resolve(cli.config.as_deref())?;
    init_tracing(&config.settings.log_level);
    match &config.source {
        Some(path) => info!(path = %path.display(), owners = config.owners.len(), "loaded config"),
        None => warn!("no config file found, using defaults"),
    }

    let app = App::new(config)?;
    match cli.command {
        Commands::Run { owners, dry_run } => {
            if dry_run {
                app.dry_run(&owners).await?;
            } else {
                app.run(&owners).await?;
            }
        }
        Commands::Plan { owners } => {
            app.plan(&owners).await?;
        }
        Commands::Task { owner, task, force } => {
            app.task(&owner, &task, force).await?;
        }
        Commands::Stamps { owner } => {
            app.stamps(&owner)?;
        }
        Commands::Clear { owner, task } => {
            app.clear(&owner, task.as_deref())?;
        }
    }

    Ok(())
}
