//! Staging and atomic installation into a prefix.
//!
//! The archive is extracted into a staging directory next to the prefix, so
//! every move stays on one volume and the final step is a pair of renames.
//! The prefix is only touched once every declared install entry is present.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use pour_schema::InstallPlan;
use thiserror::Error;
use walkdir::WalkDir;

use crate::io::extract::{self, ExtractError};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Archive does not contain '{0}'")]
    MissingComponent(String),

    #[error("Another install holds the lock at {}", .0.display())]
    Locked(PathBuf),

    #[error("Invalid prefix: {}", .0.display())]
    InvalidPrefix(PathBuf),

    #[error("Could not swap staged tree into {}: {source}", prefix.display())]
    Swap { prefix: PathBuf, source: io::Error },
}

/// What an install put into the prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedTree {
    /// Install-plan entries, in order.
    pub entries: Vec<String>,
    /// Every regular file and symlink, relative to the prefix.
    pub files: Vec<PathBuf>,
    pub size_bytes: u64,
}

/// Advisory lock on one prefix.
///
/// Callers hold it from before the swap until the receipt describing the
/// prefix is written or removed, so a prefix and its receipt always change
/// together. The lock is a file created with `create_new` next to the prefix
/// and removed on drop. A crash leaves the file behind; it must then be
/// removed by hand, which the `Locked` error message points at.
#[derive(Debug)]
pub struct PrefixLock {
    path: PathBuf,
    prefix: PathBuf,
}

impl PrefixLock {
    pub fn acquire(prefix: &Path) -> Result<Self, InstallError> {
        let (parent, name) = split_prefix(prefix)?;
        fs::create_dir_all(parent)?;
        let path = parent.join(format!(".{name}.lock"));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Best effort: the pid only helps a human diagnose a stale lock.
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self {
                    path,
                    prefix: prefix.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(InstallError::Locked(path)),
            Err(e) => Err(e.into()),
        }
    }
}

impl PrefixLock {
    /// Fail unless this lock guards `prefix`.
    fn guards(&self, prefix: &Path) -> Result<(), InstallError> {
        if self.prefix == prefix {
            Ok(())
        } else {
            Err(InstallError::InvalidPrefix(prefix.to_path_buf()))
        }
    }
}

impl Drop for PrefixLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "failed to release lock: {e}");
        }
    }
}

fn split_prefix(prefix: &Path) -> Result<(&Path, String), InstallError> {
    let parent = prefix
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| InstallError::InvalidPrefix(prefix.to_path_buf()))?;
    let name = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| InstallError::InvalidPrefix(prefix.to_path_buf()))?;
    Ok((parent, name))
}

/// Remove staging and swap directories left behind by crashed attempts.
fn clean_leftovers(parent: &Path, name: &str) -> io::Result<()> {
    let stage = format!(".{name}.stage-");
    let old = format!(".{name}.old-");
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with(&stage) || file_name.starts_with(&old) {
            tracing::debug!(path = %entry.path().display(), "removing leftover");
            fs::remove_dir_all(entry.path())?;
        }
    }
    Ok(())
}

/// Install `archive` into `prefix` according to `plan`, under `lock`.
///
/// Idempotent: running it twice with the same inputs leaves the same prefix.
/// On any error before the swap the prefix is untouched; if the swap itself
/// fails, the previous prefix is restored.
pub fn install(
    archive: &[u8],
    plan: &InstallPlan,
    prefix: &Path,
    lock: &PrefixLock,
) -> Result<StagedTree, InstallError> {
    lock.guards(prefix)?;
    let (parent, name) = split_prefix(prefix)?;
    clean_leftovers(parent, &name)?;

    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}.stage-"))
        .tempdir_in(parent)?;
    let unpacked = staging.path().join("src");
    extract::extract(archive, &unpacked)?;
    let root = extract::archive_root(&unpacked, plan.entries())?;

    // Every entry must be present before anything moves.
    for entry in plan.entries() {
        if fs::symlink_metadata(root.join(entry)).is_err() {
            return Err(InstallError::MissingComponent(entry.clone()));
        }
    }

    let tree = staging.path().join("tree");
    fs::create_dir_all(&tree)?;
    for entry in plan.entries() {
        let target = tree.join(entry);
        if let Some(p) = target.parent() {
            fs::create_dir_all(p)?;
        }
        fs::rename(root.join(entry), &target)?;
    }
    let staged = describe(&tree, plan)?;

    swap_into(&tree, prefix, parent, &name)?;
    tracing::info!(prefix = %prefix.display(), files = staged.files.len(), "installed");
    Ok(staged)
}

fn describe(tree: &Path, plan: &InstallPlan) -> Result<StagedTree, InstallError> {
    let mut staged = StagedTree {
        entries: plan.entries().to_vec(),
        ..StagedTree::default()
    };
    for entry in WalkDir::new(tree).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_dir() {
            continue;
        }
        staged.size_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        if let Ok(rel) = entry.path().strip_prefix(tree) {
            staged.files.push(rel.to_path_buf());
        }
    }
    Ok(staged)
}

/// Rename the staged tree into place, keeping the old prefix until the new
/// one is in.
fn swap_into(tree: &Path, prefix: &Path, parent: &Path, name: &str) -> Result<(), InstallError> {
    if fs::symlink_metadata(prefix).is_err() {
        return fs::rename(tree, prefix).map_err(|source| InstallError::Swap {
            prefix: prefix.to_path_buf(),
            source,
        });
    }

    let old = tempfile::Builder::new()
        .prefix(&format!(".{name}.old-"))
        .tempdir_in(parent)?;
    let previous = old.path().join("prefix");
    fs::rename(prefix, &previous)?;

    if let Err(source) = fs::rename(tree, prefix) {
        if let Err(e) = fs::rename(&previous, prefix) {
            tracing::error!(prefix = %prefix.display(), "failed to restore previous prefix: {e}");
        }
        return Err(InstallError::Swap {
            prefix: prefix.to_path_buf(),
            source,
        });
    }
    // Dropping `old` deletes the previous tree.
    Ok(())
}

/// Remove an installed prefix, under `lock`.
///
/// Deletes the recorded files first, then whatever remains of the prefix
/// directory. Missing files are not an error.
pub fn uninstall(
    prefix: &Path,
    files: &[PathBuf],
    lock: &PrefixLock,
) -> Result<(), InstallError> {
    lock.guards(prefix)?;
    for rel in files {
        let path = prefix.join(rel);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    match fs::remove_dir_all(prefix) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
