use anyhow::{bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Clears the process umask for the duration of a copy so that source file
/// modes are reproduced verbatim on the destination, and restores the
/// previous umask afterwards.
#[cfg(unix)]
struct UmaskGuard {
    previous: libc::mode_t,
}

#[cfg(unix)]
impl UmaskGuard {
    fn clear() -> Self {
        let previous = unsafe { libc::umask(0) };
        Self { previous }
    }
}

#[cfg(unix)]
impl Drop for UmaskGuard {
    fn drop(&mut self) {
        unsafe {
            libc::umask(self.previous);
        }
    }
}

#[cfg(not(unix))]
struct UmaskGuard;

#[cfg(not(unix))]
impl UmaskGuard {
    fn clear() -> Self {
        Self
    }
}

/// Recursively copies the tree at `from` into `to`, preserving file modes.
/// Every regular file is flushed to disk before its handle is closed.
pub fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    let root_meta = fs::metadata(from)
        .with_context(|| format!("cannot read the copy source {}", from.display()))?;
    if !root_meta.is_dir() {
        bail!("copy source {} is not a directory", from.display());
    }

    log::debug!("copying the tree {} into {}", from.display(), to.display());

    let _umask = UmaskGuard::clear();

    for entry in WalkDir::new(from) {
        let entry = entry.with_context(|| format!("failed to walk {}", from.display()))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .context("walked outside of the copy source")?;
        let dest = to.join(rel);

        if entry.file_type().is_dir() {
            let meta = entry
                .metadata()
                .with_context(|| format!("cannot stat {}", entry.path().display()))?;
            create_dir_with_mode(&dest, &meta)?;
        } else {
            // Symlinked payload files are followed and copied as content.
            let meta = fs::metadata(entry.path())
                .with_context(|| format!("cannot stat {}", entry.path().display()))?;
            copy_file(entry.path(), &dest, &meta)?;
        }
    }

    Ok(())
}

/// Copies only the given source-relative paths from `from` into `to`,
/// mirroring directory structure and modes for every directory it has to
/// create along the way.
pub fn copy_filtered(from: &Path, to: &Path, paths: &[PathBuf]) -> Result<()> {
    let root_meta = fs::metadata(from)
        .with_context(|| format!("cannot read the copy source {}", from.display()))?;
    if !root_meta.is_dir() {
        bail!("copy source {} is not a directory", from.display());
    }

    log::debug!(
        "copying {} selected files from {} into {}",
        paths.len(),
        from.display(),
        to.display()
    );

    let _umask = UmaskGuard::clear();

    create_dir_with_mode(to, &root_meta)?;

    for rel in paths {
        let source = from.join(rel);
        let dest = to.join(rel);

        if let Some(parent_rel) = rel.parent() {
            mirror_dirs(from, to, parent_rel)?;
        }

        let meta = fs::metadata(&source)
            .with_context(|| format!("cannot stat the manifest entry {}", source.display()))?;
        copy_file(&source, &dest, &meta)?;
    }

    Ok(())
}

/// Creates every directory of `rel` under `to`, copying the mode of the
/// matching source directory where it exists.
fn mirror_dirs(from: &Path, to: &Path, rel: &Path) -> Result<()> {
    let mut source = from.to_path_buf();
    let mut dest = to.to_path_buf();

    for component in rel.components() {
        source.push(component);
        dest.push(component);

        if dest.is_dir() {
            continue;
        }

        match fs::metadata(&source) {
            Ok(meta) => create_dir_with_mode(&dest, &meta)?,
            Err(_) => {
                // Manifest path with no matching source directory; the file
                // copy below will surface the real error.
                fs::create_dir_all(&dest)
                    .with_context(|| format!("failed to create {}", dest.display()))?;
            }
        }
    }

    Ok(())
}

fn create_dir_with_mode(dest: &Path, source_meta: &fs::Metadata) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("failed to create the directory {}", dest.display()))?;
    fs::set_permissions(dest, source_meta.permissions())
        .with_context(|| format!("failed to set permissions on {}", dest.display()))?;

    Ok(())
}

fn copy_file(from: &Path, to: &Path, source_meta: &fs::Metadata) -> Result<()> {
    let mut source =
        File::open(from).with_context(|| format!("failed to open {}", from.display()))?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::fs::PermissionsExt;
        options.mode(source_meta.permissions().mode());
    }

    let mut dest = options
        .open(to)
        .with_context(|| format!("failed to create {}", to.display()))?;

    io::copy(&mut source, &mut dest)
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;

    // Make the copy durable before the handle closes; the tree is renamed
    // into place right after and must not contain half-written files.
    dest.sync_all()
        .with_context(|| format!("failed to sync {}", to.display()))?;

    // The open-time mode is subject to races on the process-wide umask, an
    // explicit chmod is not.
    fs::set_permissions(to, source_meta.permissions())
        .with_context(|| format!("failed to set permissions on {}", to.display()))?;

    Ok(())
}
