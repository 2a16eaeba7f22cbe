// # File Managed Store
//
// File-based implementation of ManagedStore.
//
// ## Purpose
//
// Persists metadata for add-ons the manager installed across restarts. The
// update checker reads the recorded versions from here.
//
// ## Write Strategy
//
// - Full rewrite: every mutation serializes the whole map, never appends
// - Atomic replace: the document goes to a temporary file that is renamed
//   over `managed_addons.json`
// - Commit after write: the in-memory map only changes once the file is
//   replaced, so a failed write leaves memory and disk as they were
//
// ## File Format
//
// ```json
// [
//   {
//     "name": "Raid_Frames",
//     "alias": "Raid Frames",
//     "description": "",
//     "version": "v1.2.0",
//     "commit": "4f1c2e9",
//     "author": "someone",
//     "repo": "someone/raid-frames",
//     "isManaged": true,
//     "updatedAt": "2024-05-01T10:00:00Z"
//   }
// ]
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::traits::ManagedStore;
use crate::types::InstalledAddon;

/// File name of the managed add-on document inside the data directory
pub const MANAGED_ADDONS_FILE: &str = "managed_addons.json";

/// File-based managed add-on store
///
/// # Example
///
/// ```rust,no_run
/// use addon_core::state::FileManagedStore;
/// use addon_core::traits::ManagedStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileManagedStore::new("/home/me/.config/addons/managed_addons.json");
///
///     // First run: nothing persisted yet
///     if let Err(e) = store.load().await {
///         if !e.is_not_found() {
///             return Err(e.into());
///         }
///     }
///
///     for addon in store.list().await? {
///         println!("{} {}", addon.name, addon.version);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileManagedStore {
    path: PathBuf,
    records: RwLock<HashMap<String, InstalledAddon>>,
}

impl FileManagedStore {
    /// Create a store backed by `path`
    ///
    /// Nothing is read until [`ManagedStore::load`] is called.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store for `managed_addons.json` inside `data_dir`
    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::new(data_dir.as_ref().join(MANAGED_ADDONS_FILE))
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the document
    async fn read_records(path: &Path) -> Result<HashMap<String, InstalledAddon>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(format!(
                    "{} not found at {}",
                    MANAGED_ADDONS_FILE,
                    path.display()
                )));
            }
            Err(e) => {
                return Err(Error::filesystem(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let list: Vec<InstalledAddon> = serde_json::from_str(&content)?;

        let mut records = HashMap::with_capacity(list.len());
        for record in list {
            if records.contains_key(&record.name) {
                tracing::warn!(
                    "Duplicate entry for {} in {}, keeping the last one",
                    record.name,
                    path.display()
                );
            }
            records.insert(record.name.clone(), record);
        }

        Ok(records)
    }

    /// Serialize `records` and atomically replace the document
    async fn write_records(&self, records: &HashMap<String, InstalledAddon>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::filesystem(format!(
                        "Failed to create data directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let mut list: Vec<&InstalledAddon> = records.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        let json = serde_json::to_string_pretty(&list)?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::filesystem(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::filesystem(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::filesystem(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::filesystem(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Wrote {} managed add-ons to {}", records.len(), self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("json.tmp");
        temp
    }
}

#[async_trait]
impl ManagedStore for FileManagedStore {
    async fn load(&self) -> Result<()> {
        let mut guard = self.records.write().await;
        match Self::read_records(&self.path).await {
            Ok(records) => {
                tracing::debug!("Loaded {} managed add-ons", records.len());
                *guard = records;
                Ok(())
            }
            Err(e) => {
                guard.clear();
                Err(e)
            }
        }
    }

    async fn get(&self, name: &str) -> Result<Option<InstalledAddon>> {
        let guard = self.records.read().await;
        Ok(guard.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<InstalledAddon>> {
        let guard = self.records.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn put(&self, record: InstalledAddon) -> Result<()> {
        let mut guard = self.records.write().await;

        let mut next = guard.clone();
        next.insert(record.name.clone(), record);
        self.write_records(&next).await?;

        *guard = next;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool> {
        let mut guard = self.records.write().await;

        let mut next = guard.clone();
        if next.remove(name).is_none() {
            tracing::debug!("{} is not a managed add-on", name);
        }
        self.write_records(&next).await?;

        *guard = next;
        Ok(!guard.contains_key(name))
    }
}
