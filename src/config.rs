use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default age after which an abandoned deployment lock is reclaimed.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const DEPLOYMENT_LOCK_FILE: &str = "deployment.lock";

/// Everything one deployment run needs, passed explicitly so that several
/// orchestrations can run in one process without sharing hidden state.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Base path the agent bundle is copied from.
    pub source_base: PathBuf,
    /// Base path the agent bundle is copied to.
    pub target_base: PathBuf,
    /// Staging and lock directory; must be on the same volume as the target.
    pub work_base: PathBuf,
    /// Comma-separated technology filter; `None`, empty or "all" copies everything.
    pub technology: Option<String>,
    /// Age after which an existing deployment lock is considered abandoned.
    pub stale_timeout: Duration,
}

impl DeployConfig {
    pub fn new(
        source_base: impl Into<PathBuf>,
        target_base: impl Into<PathBuf>,
        work_base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_base: source_base.into(),
            target_base: target_base.into(),
            work_base: work_base.into(),
            technology: None,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
        }
    }

    pub fn with_technology(mut self, technology: Option<String>) -> Self {
        self.technology = technology;
        self
    }

    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    /// The effective technology filter, with the "copy everything" spellings
    /// (unset, empty, "all") normalized to `None`.
    pub fn technology_filter(&self) -> Option<&str> {
        match self.technology.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(technologies) => Some(technologies),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.work_base.join(DEPLOYMENT_LOCK_FILE)
    }

    pub fn work_base(&self) -> &Path {
        &self.work_base
    }
}
