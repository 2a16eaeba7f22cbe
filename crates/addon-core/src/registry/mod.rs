//! Installed add-on registry
//!
//! The registry owns `addons.txt`, the game client's list of enabled
//! add-ons: one name per line, in installation order, no duplicates.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use addon_core::registry::InstalledSetRegistry;
//!
//! let registry = InstalledSetRegistry::in_dir(&addon_dir);
//! if !registry.exists().await {
//!     registry.create().await?;
//! }
//! registry.load().await?;
//!
//! registry.add("Raid_Frames").await?;
//! assert!(registry.contains("Raid_Frames").await);
//! ```
//!
//! ## Helper Entry
//!
//! The manager writes its own update-notification add-on
//! ([`UPDATE_HELPER_NAME`]) into the file. It stays in the file and in the
//! cache but is filtered out of everything the registry returns.
//!
//! ## Failed Writes
//!
//! When persisting fails, the cache is rebuilt from the file before the error
//! is returned, so the cache never holds lines the file does not.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// File name of the registry inside the add-on directory
pub const ADDONS_TXT: &str = "addons.txt";

/// Name of the add-on the manager generates to announce updates in game
pub const UPDATE_HELPER_NAME: &str = "AddonUpdateNotification";

/// Ordered set of installed add-on names backed by `addons.txt`
///
/// ## Thread Safety
///
/// All reads and writes go through one reader/writer lock. Mutations hold
/// the write lock across the file write, so concurrent adds and removes are
/// applied to the file in the order they take the lock.
#[derive(Debug)]
pub struct InstalledSetRegistry {
    path: PathBuf,
    lines: RwLock<Vec<String>>,
}

impl InstalledSetRegistry {
    /// Create a registry backed by `path`
    ///
    /// The cache starts empty; call [`InstalledSetRegistry::load`] to read the file.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lines: RwLock::new(Vec::new()),
        }
    }

    /// Create a registry for `addons.txt` inside `addon_dir`
    pub fn in_dir<P: AsRef<Path>>(addon_dir: P) -> Self {
        Self::new(addon_dir.as_ref().join(ADDONS_TXT))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing file exists
    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read the file into the cache
    ///
    /// # Returns
    ///
    /// The installed names in file order, without the helper entry.
    pub async fn load(&self) -> Result<Vec<String>> {
        let mut guard = self.lines.write().await;
        let lines = read_lines(&self.path).await?;
        debug!("Loaded {} lines from {}", lines.len(), self.path.display());
        *guard = lines;
        Ok(visible(&guard))
    }

    /// Installed names from the cache, without the helper entry
    pub async fn names(&self) -> Vec<String> {
        let guard = self.lines.read().await;
        visible(&guard)
    }

    /// Whether `name` is in the cache
    ///
    /// Always false for the helper entry.
    pub async fn contains(&self, name: &str) -> bool {
        if name == UPDATE_HELPER_NAME {
            return false;
        }
        let guard = self.lines.read().await;
        guard.iter().any(|line| line == name)
    }

    /// Append `name` and persist
    ///
    /// A no-op when the name is already present.
    pub async fn add(&self, name: &str) -> Result<()> {
        let mut guard = self.lines.write().await;
        if guard.iter().any(|line| line == name) {
            debug!("{} already registered", name);
            return Ok(());
        }

        guard.push(name.to_string());
        self.persist_or_resync(&mut guard).await
    }

    /// Remove `name` and persist
    ///
    /// A no-op when the name is absent.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let mut guard = self.lines.write().await;
        let before = guard.len();
        guard.retain(|line| line != name);
        if guard.len() == before {
            debug!("{} not registered, nothing to remove", name);
            return Ok(());
        }

        self.persist_or_resync(&mut guard).await
    }

    /// Create or truncate the file and empty the cache
    ///
    /// Without this file installed add-ons cannot be tracked; callers treat a
    /// failure here as fatal to their operation.
    pub async fn create(&self) -> Result<()> {
        let mut guard = self.lines.write().await;
        write_lines(&self.path, &[]).await.inspect_err(|e| {
            error!("fatal: cannot create {}: {}", self.path.display(), e);
        })?;
        guard.clear();
        Ok(())
    }

    async fn persist_or_resync(&self, lines: &mut Vec<String>) -> Result<()> {
        match write_lines(&self.path, lines).await {
            Ok(()) => Ok(()),
            Err(write_err) => {
                warn!(
                    "Failed to write {}, resyncing from disk: {}",
                    self.path.display(),
                    write_err
                );
                match read_lines(&self.path).await {
                    Ok(on_disk) => *lines = on_disk,
                    Err(e) if is_missing(&e) => lines.clear(),
                    Err(e) => {
                        error!("Resync of {} failed: {}", self.path.display(), e);
                        lines.clear();
                    }
                }
                Err(write_err)
            }
        }
    }
}

fn visible(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| line.as_str() != UPDATE_HELPER_NAME)
        .cloned()
        .collect()
}

fn is_missing(err: &Error) -> bool {
    matches!(err, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
}

async fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).await?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Replace the file with `lines` joined by `\n`, without a trailing newline
async fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::filesystem(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }

    let mut temp = path.to_path_buf();
    temp.set_extension("txt.tmp");

    fs::write(&temp, lines.join("\n")).await.map_err(|e| {
        Error::filesystem(format!("Failed to write {}: {}", temp.display(), e))
    })?;
    fs::rename(&temp, path).await.map_err(|e| {
        Error::filesystem(format!(
            "Failed to rename {} to {}: {}",
            temp.display(),
            path.display(),
            e
        ))
    })?;

    Ok(())
}
