use crate::cli::commands::DeployArgs;
use crate::cli::Output;
use crate::config::DeployConfig;
use crate::deploy::{self, DeploymentStatus};
use anyhow::Result;
use std::time::Duration;

pub async fn run(args: &DeployArgs) -> Result<()> {
    let config = DeployConfig::new(&args.source, &args.target, &args.work)
        .with_technology(args.technology.clone())
        .with_stale_timeout(Duration::from_secs(args.stale_timeout_secs));

    match execute(&config, args).await {
        Ok(()) => Ok(()),
        Err(err) if args.suppress_error => {
            log::error!("deployment failed, the error was suppressed: {err:#}");
            Output::warning("Deployment failed (errors suppressed)");
            Ok(())
        }
        Err(err) => {
            Output::error(&format!("Deployment failed: {err:#}"));
            Err(err)
        }
    }
}

async fn execute(config: &DeployConfig, args: &DeployArgs) -> Result<()> {
    let performed = deploy::deploy(config)?;

    if performed {
        Output::success(&format!(
            "Agent deployed to {}",
            config.target_base.display()
        ));
    } else {
        Output::info("Deployment skipped, already deployed or handled by another instance");
    }

    if args.wait {
        wait_until_deployed(config, Duration::from_secs(args.poll_interval_secs)).await;
        Output::success("Agent deployment is complete");
    }

    Ok(())
}

/// Polls the status probe until some instance has finished the deployment.
/// Probe errors are logged and retried; bounding the total time is the
/// supervisor's job, not ours.
async fn wait_until_deployed(config: &DeployConfig, interval: Duration) {
    loop {
        let info = deploy::probe(&config.source_base, &config.target_base);
        match info.status {
            DeploymentStatus::Deployed => return,
            DeploymentStatus::Unknown => {
                if let Some(err) = info.error {
                    log::warn!("deployment status check failed, retrying: {err:#}");
                }
            }
            other => {
                log::debug!("waiting for the deployment to finish, status: {other}");
            }
        }

        tokio::time::sleep(interval).await;
    }
}
