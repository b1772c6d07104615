//! Mirroring of a working tree into the archive
//!
//! A mirror is a plain copy of a working tree with every `.git` entry left
//! out. It is recreated wholesale on each run so deletions in the source
//! show up in the archive.

use anyhow::{anyhow, Context, Result};
use filetime::FileTime;
use path_clean::PathClean;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::git::GIT_DIR;

/// Counts of what a copy produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub bytes: u64,
}

/// Absolute form of `path`. Symlinks are resolved when the path exists,
/// otherwise the path is cleaned lexically against the current directory.
pub fn resolve(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read current directory")?
            .join(path)
    };

    Ok(absolute.clean())
}

/// `<archive>/<source base name>`, or `None` when the source has no final
/// component (e.g. `/` or `..`)
pub fn destination_for(source: &Path, archive: &Path) -> Option<PathBuf> {
    source.file_name().map(|name| archive.join(name))
}

/// Reason mirroring `source` into `archive` would be self-referential.
/// Both paths must already be resolved.
pub fn nesting_conflict(source: &Path, archive: &Path, destination: &Path) -> Option<String> {
    if archive == source {
        return Some("archive is the same directory as this tree".to_string());
    }
    if archive.starts_with(source) {
        return Some("archive is inside this tree".to_string());
    }
    if source.starts_with(destination) {
        return Some(format!(
            "tree lives at its own mirror location {}",
            destination.display()
        ));
    }
    None
}

/// Remove `destination` if present, then copy `source` into it
pub fn replace_mirror(source: &Path, destination: &Path) -> Result<CopyStats> {
    match fs::symlink_metadata(destination) {
        Ok(meta) if meta.is_dir() => {
            debug!("Removing previous mirror {}", destination.display());
            fs::remove_dir_all(destination).with_context(|| {
                format!("Failed to remove previous mirror {}", destination.display())
            })?;
        }
        Ok(_) => {
            fs::remove_file(destination).with_context(|| {
                format!("Failed to remove {}", destination.display())
            })?;
        }
        Err(_) => {}
    }

    copy_tree(source, destination)
}

/// Recursively copy `source` into `destination`, skipping any entry named
/// `.git`. File contents, permissions and modification times are kept.
pub fn copy_tree(source: &Path, destination: &Path) -> Result<CopyStats> {
    if !source.is_dir() {
        return Err(anyhow!("Not a directory: {}", source.display()));
    }

    let mut stats = CopyStats::default();

    // Contents first so a directory's mtime is set after its children land.
    let walker = WalkDir::new(source)
        .follow_links(false)
        .contents_first(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != GIT_DIR);

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .context("Walked outside of the source tree")?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            copy_mtime(entry.path(), &target)?;
            stats.directories += 1;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            stats.symlinks += 1;
        } else {
            stats.bytes += fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "Failed to copy {} -> {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
            copy_mtime(entry.path(), &target)?;
            stats.files += 1;
        }
    }

    Ok(stats)
}

fn copy_mtime(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::metadata(from)
        .with_context(|| format!("Failed to read metadata for {}", from.display()))?;
    filetime::set_file_mtime(to, FileTime::from_last_modification_time(&meta))
        .with_context(|| format!("Failed to set modification time on {}", to.display()))
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let link = fs::read_link(from)
        .with_context(|| format!("Failed to read symlink {}", from.display()))?;
    std::os::unix::fs::symlink(&link, to)
        .with_context(|| format!("Failed to create symlink {}", to.display()))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        copy_tree(from, to).map(|_| ())
    } else {
        fs::copy(from, to)
            .map(|_| ())
            .with_context(|| format!("Failed to copy {} -> {}", from.display(), to.display()))
    }
}
