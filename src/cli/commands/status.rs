use crate::cli::commands::StatusArgs;
use crate::cli::Output;
use crate::deploy::{self, DeploymentStatus};
use anyhow::{anyhow, Result};

pub async fn run(args: &StatusArgs) -> Result<()> {
    let info = deploy::probe(&args.source, &args.target);

    match info.status {
        DeploymentStatus::Deployed => {
            Output::success(&format!("Agent {} is deployed", info.agent_version));
        }
        DeploymentStatus::NotDeployed => {
            Output::info(&format!("Agent {} is not deployed", info.agent_version));
        }
        DeploymentStatus::LinkMissing => {
            Output::warning(&format!(
                "Agent {} is copied but the active link is missing or stale",
                info.agent_version
            ));
        }
        DeploymentStatus::Unknown => {
            let err = info
                .error
                .unwrap_or_else(|| anyhow!("deployment status is unknown"));
            Output::error(&format!("Cannot determine the deployment status: {err:#}"));
            return Err(err);
        }
    }

    Ok(())
}
