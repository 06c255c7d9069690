use anyhow::{anyhow, Context, Result};
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::deploy::link::ACTIVE_LINK_NAME;

/// Relative path of the version file inside the source bundle.
pub const INSTALLER_VERSION_FILE: &str = "agent/installer.version";

/// Name of the directory under the target base that holds the versioned
/// agent directories and the active link.
pub const AGENT_BASE_DIR: &str = "oneagent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentStatus {
    /// The versioned agent directory does not exist in the target.
    NotDeployed,
    /// The versioned agent directory exists, but the active link is absent
    /// or points at a different version.
    LinkMissing,
    /// The versioned agent directory exists and the active link points at it.
    Deployed,
    /// The status could not be determined.
    Unknown,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeploymentStatus::NotDeployed => "not deployed",
            DeploymentStatus::LinkMissing => "deployment is not complete",
            DeploymentStatus::Deployed => "deployed",
            DeploymentStatus::Unknown => "unknown",
        };
        write!(f, "{text}")
    }
}

/// Result of a single status probe. The version is filled in whenever it
/// could be determined, even alongside an error.
#[derive(Debug)]
pub struct DeploymentInfo {
    pub status: DeploymentStatus,
    pub agent_version: String,
    pub error: Option<anyhow::Error>,
}

impl DeploymentInfo {
    fn new(status: DeploymentStatus, agent_version: String, error: Option<anyhow::Error>) -> Self {
        Self {
            status,
            agent_version,
            error,
        }
    }
}

/// Absolute path of the versioned agent directory for `version`.
pub fn agent_dir(target_base: &Path, version: &str) -> PathBuf {
    target_base.join(AGENT_BASE_DIR).join(version)
}

/// Absolute path of the active link in the target.
pub fn active_link_path(target_base: &Path) -> PathBuf {
    target_base.join(AGENT_BASE_DIR).join(ACTIVE_LINK_NAME)
}

/// Reads the agent version from the source bundle. The string is used
/// verbatim as the versioned directory name, so it is not trimmed.
pub fn agent_version(source_base: &Path) -> Result<String> {
    let path = source_base.join(INSTALLER_VERSION_FILE);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read the agent version from {}", path.display()))
}

/// Inspects the filesystem and reports how far the deployment of the version
/// named by the source bundle has progressed. Read-only, no side effects,
/// safe to call repeatedly and concurrently.
pub fn probe(source_base: &Path, target_base: &Path) -> DeploymentInfo {
    let version = match agent_version(source_base) {
        Ok(version) => version,
        Err(err) => {
            return DeploymentInfo::new(
                DeploymentStatus::Unknown,
                String::new(),
                Some(err.context("failed to determine the agent version to deploy")),
            )
        }
    };

    let versioned_dir = agent_dir(target_base, &version);
    let dir_meta = match fs::metadata(&versioned_dir) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return DeploymentInfo::new(DeploymentStatus::NotDeployed, version, None);
        }
        Err(err) => {
            return DeploymentInfo::new(
                DeploymentStatus::Unknown,
                version,
                Some(anyhow::Error::new(err).context("cannot obtain agent directory info")),
            );
        }
    };

    if !dir_meta.is_dir() {
        return DeploymentInfo::new(
            DeploymentStatus::Unknown,
            version,
            Some(anyhow!(
                "agent deployment target is not a directory: {}",
                versioned_dir.display()
            )),
        );
    }

    let active_link = active_link_path(target_base);
    let link_meta = match fs::symlink_metadata(&active_link) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return DeploymentInfo::new(DeploymentStatus::LinkMissing, version, None);
        }
        Err(err) => {
            return DeploymentInfo::new(
                DeploymentStatus::Unknown,
                version,
                Some(anyhow::Error::new(err).context("cannot obtain active symlink info")),
            );
        }
    };

    if !link_meta.file_type().is_symlink() {
        return DeploymentInfo::new(
            DeploymentStatus::Unknown,
            version,
            Some(anyhow!(
                "the active link is not a symlink: {}",
                active_link.display()
            )),
        );
    }

    let link_target = match fs::read_link(&active_link) {
        Ok(target) => target,
        Err(err) => {
            return DeploymentInfo::new(
                DeploymentStatus::Unknown,
                version,
                Some(anyhow::Error::new(err).context("cannot read the active symlink")),
            );
        }
    };

    if link_target.as_os_str() != OsStr::new(&version) {
        return DeploymentInfo::new(DeploymentStatus::LinkMissing, version, None);
    }

    DeploymentInfo::new(DeploymentStatus::Deployed, version, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_version(source: &Path, version: &str) {
        let agent = source.join("agent");
        fs::create_dir_all(&agent).unwrap();
        fs::write(agent.join("installer.version"), version).unwrap();
    }

    #[cfg(unix)]
    fn symlink(target: &str, link: &Path) {
        std::os::unix::fs::symlink(target, link).unwrap();
    }

    #[test]
    fn missing_version_file_is_unknown() {
        let temp = TempDir::new().unwrap();

        let info = probe(&temp.path().join("source"), &temp.path().join("target"));
        assert_eq!(info.status, DeploymentStatus::Unknown);
        assert!(info.agent_version.is_empty());

        let err = info.error.expect("probe should carry the cause");
        assert!(format!("{err:#}").contains("agent version"));
    }

    #[test]
    fn missing_versioned_dir_is_not_deployed() {
        let temp = TempDir::new().unwrap();
        write_version(temp.path(), "1.2.3");

        let info = probe(temp.path(), &temp.path().join("target"));
        assert_eq!(info.status, DeploymentStatus::NotDeployed);
        assert_eq!(info.agent_version, "1.2.3");
        assert!(info.error.is_none());
    }

    #[test]
    fn versioned_dir_without_active_link_is_link_missing() {
        let temp = TempDir::new().unwrap();
        write_version(temp.path(), "1.2.3");

        let target = temp.path().join("target");
        fs::create_dir_all(agent_dir(&target, "1.2.3")).unwrap();

        let info = probe(temp.path(), &target);
        assert_eq!(info.status, DeploymentStatus::LinkMissing);
        assert!(info.error.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn active_link_to_another_version_is_link_missing() {
        let temp = TempDir::new().unwrap();
        write_version(temp.path(), "1.2.3");

        let target = temp.path().join("target");
        fs::create_dir_all(agent_dir(&target, "1.2.3")).unwrap();
        fs::create_dir_all(agent_dir(&target, "1.0.0")).unwrap();
        symlink("1.0.0", &active_link_path(&target));

        let info = probe(temp.path(), &target);
        assert_eq!(info.status, DeploymentStatus::LinkMissing);
        assert_eq!(info.agent_version, "1.2.3");
    }

    #[cfg(unix)]
    #[test]
    fn matching_active_link_is_deployed() {
        let temp = TempDir::new().unwrap();
        write_version(temp.path(), "1.2.3");

        let target = temp.path().join("target");
        fs::create_dir_all(agent_dir(&target, "1.2.3")).unwrap();
        symlink("1.2.3", &active_link_path(&target));

        let info = probe(temp.path(), &target);
        assert_eq!(info.status, DeploymentStatus::Deployed);
        assert!(info.error.is_none());
    }

    #[test]
    fn file_at_versioned_dir_path_is_unknown() {
        let temp = TempDir::new().unwrap();
        write_version(temp.path(), "1.2.3");

        let target = temp.path().join("target");
        fs::create_dir_all(target.join(AGENT_BASE_DIR)).unwrap();
        fs::write(agent_dir(&target, "1.2.3"), "not a directory").unwrap();

        let info = probe(temp.path(), &target);
        assert_eq!(info.status, DeploymentStatus::Unknown);

        let err = info.error.expect("probe should carry the cause");
        assert!(format!("{err:#}").contains("not a directory"));
    }

    #[test]
    fn directory_at_active_link_path_is_unknown() {
        let temp = TempDir::new().unwrap();
        write_version(temp.path(), "1.2.3");

        let target = temp.path().join("target");
        fs::create_dir_all(agent_dir(&target, "1.2.3")).unwrap();
        fs::create_dir_all(active_link_path(&target)).unwrap();

        let info = probe(temp.path(), &target);
        assert_eq!(info.status, DeploymentStatus::Unknown);

        let err = info.error.expect("probe should carry the cause");
        assert!(format!("{err:#}").contains("not a symlink"));
    }

    #[cfg(unix)]
    #[test]
    fn probe_is_deterministic_for_a_fixed_filesystem_state() {
        let temp = TempDir::new().unwrap();
        write_version(temp.path(), "1.2.3");

        let target = temp.path().join("target");
        fs::create_dir_all(agent_dir(&target, "1.2.3")).unwrap();
        symlink("1.2.3", &active_link_path(&target));

        for _ in 0..10 {
            let info = probe(temp.path(), &target);
            assert_eq!(info.status, DeploymentStatus::Deployed);
            assert_eq!(info.agent_version, "1.2.3");
        }
    }

    #[test]
    fn version_string_is_used_verbatim() {
        let temp = TempDir::new().unwrap();
        // Trailing newline is part of the version and so part of the dir name.
        write_version(temp.path(), "1.2.3\n");

        let target = temp.path().join("target");
        fs::create_dir_all(agent_dir(&target, "1.2.3")).unwrap();

        let info = probe(temp.path(), &target);
        assert_eq!(info.status, DeploymentStatus::NotDeployed);
        assert_eq!(info.agent_version, "1.2.3\n");
    }
}
