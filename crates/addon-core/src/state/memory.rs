// # Memory Managed Store
//
// In-memory implementation of ManagedStore.
//
// ## Purpose
//
// Holds managed add-on metadata without touching disk. Useful for hosts that
// keep metadata elsewhere and for tests.
//
// ## Crash Behavior
//
// - All records are lost on restart
// - The next update check sees no managed add-ons until they are reinstalled

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::traits::ManagedStore;
use crate::types::InstalledAddon;

/// In-memory managed add-on store
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryManagedStore {
    inner: Arc<RwLock<HashMap<String, InstalledAddon>>>,
}

impl MemoryManagedStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `records`
    pub fn with_records(records: impl IntoIterator<Item = InstalledAddon>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl ManagedStore for MemoryManagedStore {
    async fn load(&self) -> Result<()> {
        // Nothing persisted to reload
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<InstalledAddon>> {
        let guard = self.inner.read().await;
        Ok(guard.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<InstalledAddon>> {
        let guard = self.inner.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn put(&self, record: InstalledAddon) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.insert(record.name.clone(), record);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool> {
        let mut guard = self.inner.write().await;
        guard.remove(name);
        Ok(!guard.contains_key(name))
    }
}
