//! Update checker
//!
//! Compares the recorded version of every managed add-on against the remote
//! service and returns the add-ons with a different remote tag.
//!
//! ## Concurrency
//!
//! [`UpdateChecker::check`] spawns one task per add-on on a
//! [`tokio::task::JoinSet`]. Results go into a mutex-guarded map and every
//! task is joined before the map is read, so no task outlives the call and
//! the result does not depend on completion order.
//!
//! ## Failures
//!
//! A failing query is logged and that add-on is left out. One bad add-on
//! never aborts the batch.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::traits::ManifestClient;
use crate::types::{InstalledAddon, Release};

/// Add-ons with a newer (different) remote release, keyed by name
///
/// Each value is the local record with `version` replaced by the remote tag.
pub type PendingUpdates = HashMap<String, InstalledAddon>;

/// Concurrent update checker
#[derive(Clone)]
pub struct UpdateChecker {
    client: Arc<dyn ManifestClient>,
}

impl UpdateChecker {
    pub fn new(client: Arc<dyn ManifestClient>) -> Self {
        Self { client }
    }

    /// One release query per add-on
    ///
    /// # Parameters
    ///
    /// - `addons`: Local records to compare
    ///
    /// # Returns
    ///
    /// The add-ons whose remote tag differs from the recorded version.
    pub async fn check(&self, addons: Vec<InstalledAddon>) -> PendingUpdates {
        let found = Arc::new(Mutex::new(PendingUpdates::new()));
        let mut workers = JoinSet::new();

        for addon in addons {
            let client = Arc::clone(&self.client);
            let found = Arc::clone(&found);

            workers.spawn(async move {
                match client.latest_release(&addon.name).await {
                    Ok(release) => {
                        if let Some(pending) = pending_update(addon, &release) {
                            found.lock().await.insert(pending.name.clone(), pending);
                        }
                    }
                    Err(e) => {
                        warn!("Error checking for update for addon {}: {}", addon.name, e);
                    }
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Update check worker failed: {}", e);
            }
        }

        let found = found.lock().await;
        debug!(
            "Update check via {} finished: {} update(s)",
            self.client.client_name(),
            found.len()
        );
        found.clone()
    }

    /// One bulk request for all add-ons
    ///
    /// Add-ons missing from the response (including entries that failed to
    /// decode) are treated as having no update.
    ///
    /// # Returns
    ///
    /// - `Ok(PendingUpdates)`: Add-ons with a different remote tag
    /// - `Err(Error)`: The bulk request itself failed
    pub async fn check_bulk(&self, addons: Vec<InstalledAddon>) -> Result<PendingUpdates> {
        if addons.is_empty() {
            return Ok(PendingUpdates::new());
        }

        let names: Vec<String> = addons.iter().map(|addon| addon.name.clone()).collect();
        let releases = self.client.latest_releases(&names).await?;

        let mut found = PendingUpdates::new();
        for addon in addons {
            let Some(release) = releases.get(&addon.name) else {
                debug!("No release returned for {}", addon.name);
                continue;
            };
            if let Some(pending) = pending_update(addon, release) {
                found.insert(pending.name.clone(), pending);
            }
        }

        Ok(found)
    }
}

impl std::fmt::Debug for UpdateChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateChecker")
            .field("client", &self.client.client_name())
            .finish()
    }
}

fn pending_update(mut addon: InstalledAddon, release: &Release) -> Option<InstalledAddon> {
    if release.tag_name == addon.version {
        return None;
    }
    debug!(
        "Update available for {}: {:?} -> {}",
        addon.name, addon.version, release.tag_name
    );
    addon.version = release.tag_name.clone();
    Some(addon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReleaseTag;

    fn release(tag: &str) -> Release {
        Release {
            zipball_url: String::new(),
            tag_name: tag.to_string(),
            body: String::new(),
            published_at: chrono::Utc::now(),
            tag: ReleaseTag::default(),
        }
    }

    fn record(name: &str, version: &str) -> InstalledAddon {
        let mut addon = InstalledAddon::detected(name);
        addon.version = version.to_string();
        addon.is_managed = true;
        addon
    }

    #[test]
    fn test_pending_update_requires_different_tag() {
        assert!(pending_update(record("A", "v1"), &release("v1")).is_none());

        let pending = pending_update(record("A", "v1"), &release("v0.9")).unwrap();
        assert_eq!(pending.version, "v0.9", "any difference counts, not only newer");

        let pending = pending_update(record("A", ""), &release("v1")).unwrap();
        assert_eq!(pending.version, "v1");
        assert_eq!(pending.alias, "A");
    }
}
