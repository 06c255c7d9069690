use agent_bootstrap::cli::Cli;
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    cli.run().await?;

    Ok(())
}
