use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Runs `produce` against a fresh scratch directory created under
/// `work_base`, then renames the path it returns onto `dest` in a single
/// rename call. External readers observe `dest` either in its prior state or
/// fully populated, never half-written.
///
/// The scratch directory is removed on every exit path, so a failed producer
/// or a failed rename leaves `dest` exactly as it was. `work_base` and `dest`
/// must live on the same volume for the rename to be atomic.
pub fn stage_then_rename<F>(work_base: &Path, prefix: &str, dest: &Path, produce: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<PathBuf>,
{
    fs::create_dir_all(work_base).with_context(|| {
        format!(
            "failed to create the work base directory {}",
            work_base.display()
        )
    })?;

    // TempDir removes the scratch directory and anything left inside it on drop.
    let scratch = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(work_base)
        .with_context(|| {
            format!(
                "failed to create a scratch directory in {}",
                work_base.display()
            )
        })?;

    let staged = produce(scratch.path())?;

    log::debug!(
        "renaming the staged path {} onto {}",
        staged.display(),
        dest.display()
    );

    fs::rename(&staged, dest).with_context(|| {
        format!(
            "failed to rename {} onto {}",
            staged.display(),
            dest.display()
        )
    })?;

    Ok(())
}
