pub mod atomic;
pub mod copy;
pub mod link;
pub mod lock;
pub mod manifest;
pub mod status;

pub use lock::FileLock;
pub use status::{probe, DeploymentInfo, DeploymentStatus};

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::config::DeployConfig;

/// Name of the staged payload inside a copy scratch directory.
const STAGED_DIR_NAME: &str = "oneagent";

/// Deploys the agent bundle named by the source's version file into the
/// target and points the active link at it.
///
/// Idempotent and safe for any number of unsynchronized callers sharing the
/// same target and work directories: at most one caller performs the actual
/// copy-and-link-switch for a given version. Returns `Ok(true)` when this
/// call performed the deployment and `Ok(false)` when it was already done or
/// another instance is handling it.
pub fn deploy(config: &DeployConfig) -> Result<bool> {
    // Read-only fast path: most callers find the agent already deployed and
    // return without ever touching the lock.
    let info = probe(&config.source_base, &config.target_base);
    if let Some(err) = info.error {
        return Err(err.context("failed to check the agent deployment status"));
    }
    if info.status == DeploymentStatus::Deployed {
        log::debug!("agent {} is already deployed", info.agent_version);
        return Ok(false);
    }

    fs::create_dir_all(&config.work_base).with_context(|| {
        format!(
            "failed to create the work base directory {}",
            config.work_base.display()
        )
    })?;

    let lock = FileLock::new(config.lock_path()).with_stale_timeout(config.stale_timeout);

    log::debug!(
        "trying to acquire the deployment lock: {}",
        lock.path().display()
    );

    if !lock
        .try_acquire()
        .context("failed to acquire the deployment lock")?
    {
        log::info!("another instance holds the deployment lock, skipping deployment");
        return Ok(false);
    }
    let _lock_guard = lock::Guard::new(&lock);

    // The lock is best-effort only; another instance may have finished and
    // released between the first probe and this acquisition. Re-probing under
    // the lock is what makes the deployment happen at most once.
    let info = probe(&config.source_base, &config.target_base);
    if let Some(err) = info.error {
        return Err(err.context("failed to re-check the agent deployment status under the lock"));
    }

    let versioned_dir = status::agent_dir(&config.target_base, &info.agent_version);

    match info.status {
        DeploymentStatus::Deployed => {
            log::debug!(
                "agent {} was deployed by another instance in the meantime",
                info.agent_version
            );
            return Ok(false);
        }
        DeploymentStatus::NotDeployed => {
            log::info!(
                "deployment lock acquired, deploying agent {}",
                info.agent_version
            );
            copy_agent(config, &versioned_dir)
                .context("failed to deploy the agent into the target directory")?;
        }
        DeploymentStatus::LinkMissing => {
            log::info!(
                "agent {} is present but the active link is missing or stale, relinking",
                info.agent_version
            );
        }
        DeploymentStatus::Unknown => {
            bail!("agent deployment status is unknown");
        }
    }

    link::switch_active(&config.work_base, &versioned_dir)
        .context("failed to create the active link in the target directory")?;

    log::info!("agent {} has been successfully deployed", info.agent_version);

    Ok(true)
}

/// Copies the agent bundle into `versioned_dir` via a staging directory in
/// the work base, so the versioned directory appears fully populated or not
/// at all. The staging directory and the target must share a volume.
fn copy_agent(config: &DeployConfig, versioned_dir: &Path) -> Result<()> {
    if let Some(parent) = versioned_dir.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create the target directory {}", parent.display()))?;
    }

    let selected_paths = match config.technology_filter() {
        Some(technologies) => {
            let manifest = manifest::load(&config.source_base)?;
            let paths = manifest.filter_paths(technologies);
            if paths.is_empty() {
                log::warn!("the technology filter '{technologies}' matched no files");
            }
            Some(paths)
        }
        None => None,
    };

    atomic::stage_then_rename(
        &config.work_base,
        "copy-work-",
        versioned_dir,
        |scratch| {
            let staged = scratch.join(STAGED_DIR_NAME);
            match &selected_paths {
                Some(paths) => copy::copy_filtered(&config.source_base, &staged, paths)?,
                None => copy::copy_tree(&config.source_base, &staged)?,
            }
            link::create_current_symlink(&staged)?;
            Ok(staged)
        },
    )
}
