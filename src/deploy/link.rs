use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::deploy::{atomic, status};

/// Name of the symlink that marks the live versioned agent directory.
pub const ACTIVE_LINK_NAME: &str = "active";

/// Relative path of the legacy `current` symlink inside a deployed tree.
pub const CURRENT_LINK_PATH: &str = "agent/bin/current";

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Points the `active` symlink next to `versioned_dir` at `versioned_dir`,
/// atomically.
///
/// A temporary symlink is staged in a scratch directory under `work_base` and
/// renamed over the active link path, so readers either see the previous link
/// or the new one. The link target is the base name of `versioned_dir`, a
/// relative reference, which keeps the deployed tree relocatable.
pub fn switch_active(work_base: &Path, versioned_dir: &Path) -> Result<()> {
    let version_name = versioned_dir.file_name().ok_or_else(|| {
        anyhow!(
            "versioned agent directory {} has no base name",
            versioned_dir.display()
        )
    })?;
    let active_link = versioned_dir
        .parent()
        .map(|parent| parent.join(ACTIVE_LINK_NAME))
        .ok_or_else(|| {
            anyhow!(
                "versioned agent directory {} has no parent",
                versioned_dir.display()
            )
        })?;

    atomic::stage_then_rename(work_base, "link-work-", &active_link, |scratch| {
        let staged_link = scratch.join(ACTIVE_LINK_NAME);

        log::debug!(
            "creating a temporary symlink {} -> {}",
            staged_link.display(),
            Path::new(version_name).display()
        );

        make_symlink(Path::new(version_name), &staged_link)
            .context("failed to create the temporary active symlink")?;

        Ok(staged_link)
    })
    .with_context(|| {
        format!(
            "failed to switch the active link to {}",
            Path::new(version_name).display()
        )
    })
}

/// Creates the legacy `current` symlink inside a staged agent tree, pointing
/// at the version-named sibling under `agent/bin`. Created once at copy time
/// and skipped when already present; never switched atomically.
pub fn create_current_symlink(staged_root: &Path) -> Result<()> {
    let current_link = staged_root.join(CURRENT_LINK_PATH);

    match fs::symlink_metadata(&current_link) {
        Ok(_) => {
            log::info!(
                "the current version link already exists, skipping: {}",
                current_link.display()
            );
            return Ok(());
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(anyhow::Error::new(err).context(format!(
                "failed to check the current version link {}",
                current_link.display()
            )));
        }
    }

    // Technology-filtered payloads may not ship an agent/bin directory.
    let Some(bin_dir) = current_link.parent() else {
        return Ok(());
    };
    if !bin_dir.is_dir() {
        log::debug!(
            "no {} directory in the payload, skipping the current link",
            bin_dir.display()
        );
        return Ok(());
    }

    let version = status::agent_version(staged_root)?;

    log::debug!(
        "creating the current version link {} -> {version}",
        current_link.display()
    );

    make_symlink(Path::new(&version), &current_link)
        .with_context(|| format!("failed to create {}", current_link.display()))
}
