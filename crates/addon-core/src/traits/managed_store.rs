// # Managed Store Trait
//
// Defines the interface for metadata about add-ons the manager installed.
//
// ## Purpose
//
// The store records, per add-on name:
// - The installed version and commit
// - Author, repository and branch from the catalog
// - When the installed release was published
//
// The update checker compares these versions against the remote service.
//
// ## Implementations
//
// - File-based: `managed_addons.json`, rewritten in full on every mutation
// - Memory: for embedding and tests
//
// ## Usage
//
// ```rust,ignore
// use addon_core::ManagedStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* ManagedStore implementation */;
//
//     // After a successful install
//     let record = store.upsert(&manifest, &release).await?;
//
//     // After uninstall
//     assert!(store.remove(&record.name).await?);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AddonManifest, InstalledAddon, Release};

/// Trait for managed add-on metadata stores
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Ordering
///
/// The store is a map. [`ManagedStore::list`] order is not part of the
/// contract and callers must not rely on it.
#[async_trait]
pub trait ManagedStore: Send + Sync {
    /// Replace the in-memory map with the persisted one
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Loaded
    /// - `Err(Error::NotFound)`: Nothing persisted yet (first run); the map is left empty
    /// - `Err(Error)`: Storage or decode error
    async fn load(&self) -> Result<()>;

    /// Get the record for an add-on
    async fn get(&self, name: &str) -> Result<Option<InstalledAddon>>;

    /// All records
    async fn list(&self) -> Result<Vec<InstalledAddon>>;

    /// Insert or replace a record and persist the whole map
    async fn put(&self, record: InstalledAddon) -> Result<()>;

    /// Delete a record and persist the whole map
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The name is confirmed absent afterwards
    /// - `Ok(false)`: The name is still present after the delete
    async fn remove(&self, name: &str) -> Result<bool>;

    /// Build the record for `release` of `manifest` and store it
    async fn upsert(&self, manifest: &AddonManifest, release: &Release) -> Result<InstalledAddon> {
        let record = InstalledAddon::from_release(manifest, release);
        self.put(record.clone()).await?;
        Ok(record)
    }

    /// Whether a record exists
    async fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.get(name).await?.is_some())
    }
}
