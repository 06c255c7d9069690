mod deploy;
mod status;
mod switch_active;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agent-bootstrap")]
#[command(about = "Deploy a versioned agent bundle into a shared directory", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the agent bundle and mark it active
    Deploy(DeployArgs),

    /// Show the current deployment status
    Status(StatusArgs),

    /// Point the active link at an already-deployed version
    SwitchActive(SwitchActiveArgs),
}

#[derive(Args)]
pub struct DeployArgs {
    /// Base path to copy the agent bundle from
    #[arg(long)]
    pub source: PathBuf,

    /// Base path to copy the agent bundle to
    #[arg(long)]
    pub target: PathBuf,

    /// Staging and lock directory; must be on the same volume as the target
    #[arg(long)]
    pub work: PathBuf,

    /// Comma-separated technology filter ("all" copies everything)
    #[arg(long)]
    pub technology: Option<String>,

    /// Age in seconds after which an abandoned deployment lock is reclaimed
    #[arg(long, default_value_t = 300)]
    pub stale_timeout_secs: u64,

    /// Keep polling until some instance has finished the deployment
    #[arg(long)]
    pub wait: bool,

    /// Poll interval in seconds used with --wait
    #[arg(long, default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Always exit 0, even when the deployment fails
    #[arg(long)]
    pub suppress_error: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Base path of the source agent bundle
    #[arg(long)]
    pub source: PathBuf,

    /// Base path of the deployment target
    #[arg(long)]
    pub target: PathBuf,
}

#[derive(Args)]
pub struct SwitchActiveArgs {
    /// Base path of the deployment target
    #[arg(long)]
    pub target: PathBuf,

    /// Staging directory on the same volume as the target
    #[arg(long)]
    pub work: PathBuf,

    /// Version directory the active link should point at
    #[arg(long)]
    pub version: String,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Deploy(args) => deploy::run(args).await,
            Commands::Status(args) => status::run(args).await,
            Commands::SwitchActive(args) => switch_active::run(args).await,
        }
    }
}
