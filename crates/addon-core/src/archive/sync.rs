// # Directory Synchronizer
//
// Moves an extracted release from its cache workspace into the live add-on
// directory.
//
// ## Modes
//
// - Fresh: the release root replaces `<addon_dir>/<name>` outright
// - Preserve: everything in the live directory except the persistent data
//   directory is deleted, then everything in the release root except a
//   directory of that same name is moved in
//
// ## Release Root
//
// The workspace must hold exactly one entry and it must be a directory
// (archives wrap their content in a `<repo>-<commit>/` folder). Anything
// else is `MalformedArchive`, reported before the live directory is touched.
//
// ## Partial Failure
//
// An I/O error stops the loop where it happened. Entries already deleted
// are not restored; the add-on is left incomplete and the error says so, so
// the caller can offer a reinstall.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default name of the per-add-on directory that survives updates
pub const DEFAULT_PERSISTENT_DIR: &str = ".data";

/// How the live directory is replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Replace the whole directory
    Fresh,
    /// Keep the persistent data directory, replace everything else
    Preserve,
}

/// Places extracted releases into the add-on directory
#[derive(Debug, Clone)]
pub struct DirectorySynchronizer {
    addon_dir: PathBuf,
    persistent_dir: String,
}

impl DirectorySynchronizer {
    pub fn new<P: AsRef<Path>>(addon_dir: P, persistent_dir: impl Into<String>) -> Self {
        Self {
            addon_dir: addon_dir.as_ref().to_path_buf(),
            persistent_dir: persistent_dir.into(),
        }
    }

    /// Live directory of `name`
    pub fn live_dir(&self, name: &str) -> PathBuf {
        self.addon_dir.join(name)
    }

    /// Name of the directory preserved across updates
    pub fn persistent_dir(&self) -> &str {
        &self.persistent_dir
    }

    /// Place the release in `workspace` as add-on `name`
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: The live directory
    /// - `Err(Error::MalformedArchive)`: No single root directory; nothing changed
    /// - `Err(Error::Filesystem)`: The live directory may be incomplete
    pub fn synchronize(&self, workspace: &Path, name: &str, mode: SyncMode) -> Result<PathBuf> {
        let root = locate_root(workspace)?;
        let live = self.live_dir(name);

        let placed = match mode {
            SyncMode::Fresh => self.replace(&root, &live),
            SyncMode::Preserve => self.merge_preserving(&root, &live),
        };
        placed.map_err(|e| {
            Error::filesystem(format!(
                "{} may be incomplete after a failed {:?} sync: {}",
                name, mode, e
            ))
        })?;

        tracing::debug!("Synchronized {} ({:?}) into {}", name, mode, live.display());
        Ok(live)
    }

    fn replace(&self, root: &Path, live: &Path) -> io::Result<()> {
        if live.exists() {
            fs::remove_dir_all(live)?;
        }
        move_dir_or_copy(root, live)
    }

    fn merge_preserving(&self, root: &Path, live: &Path) -> io::Result<()> {
        fs::create_dir_all(live)?;

        for entry in fs::read_dir(live)? {
            let entry = entry?;
            if entry.file_name() == self.persistent_dir.as_str() {
                continue;
            }
            remove_entry(&entry.path())?;
        }

        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_name() == self.persistent_dir.as_str() {
                tracing::debug!(
                    "Release ships its own {}, keeping the installed one",
                    self.persistent_dir
                );
                continue;
            }
            let target = live.join(entry.file_name());
            move_entry_or_copy(&entry.path(), &target)?;
        }

        Ok(())
    }
}

/// The single top-level directory of an extracted archive
fn locate_root(workspace: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(workspace)
        .map_err(|e| {
            Error::filesystem(format!("Failed to read {}: {}", workspace.display(), e))
        })?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| {
            Error::filesystem(format!("Failed to read {}: {}", workspace.display(), e))
        })?;

    match entries.as_slice() {
        [entry] => {
            let file_type = entry.file_type().map_err(|e| {
                Error::filesystem(format!("Failed to stat {}: {}", entry.path().display(), e))
            })?;
            if file_type.is_dir() {
                Ok(entry.path())
            } else {
                Err(Error::malformed_archive(format!(
                    "no root directory found in {}",
                    workspace.display()
                )))
            }
        }
        [] => Err(Error::malformed_archive(format!(
            "archive extracted to an empty workspace: {}",
            workspace.display()
        ))),
        _ => Err(Error::malformed_archive(format!(
            "expected a single root directory in {}, found {} entries",
            workspace.display(),
            entries.len()
        ))),
    }
}

fn remove_entry(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Rename `src` to `dst`, falling back to copy-then-delete across devices
fn move_dir_or_copy(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_dir_recursive(src, dst)?;
            fs::remove_dir_all(src)
        }
    }
}

fn move_entry_or_copy(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let metadata = fs::symlink_metadata(src)?;
    if metadata.is_dir() {
        copy_dir_recursive(src, dst)?;
        fs::remove_dir_all(src)
    } else {
        fs::copy(src, dst)?;
        fs::remove_file(src)
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path)?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
            continue;
        }

        #[cfg(unix)]
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(&src_path)?;
            std::os::unix::fs::symlink(&target, &dst_path)?;
            continue;
        }

        fs::copy(&src_path, &dst_path)?;
    }
    Ok(())
}
