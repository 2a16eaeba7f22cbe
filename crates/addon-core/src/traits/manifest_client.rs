// # Manifest Client Trait
//
// Defines the interface to the remote add-on service.
//
// ## Implementations
//
// - HTTP: `addon-api-http` crate
//
// ## Usage
//
// ```rust,ignore
// use addon_core::ManifestClient;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let client = /* ManifestClient implementation */;
//
//     let catalog = client.fetch_catalog().await?;
//     let release = client.latest_release(&catalog[0].name).await?;
//     println!("{} -> {}", catalog[0].name, release.tag_name);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::types::{AddonManifest, Release};

/// Trait for remote catalog and release clients
///
/// Implementations hold no local state beyond their transport and
/// credentials. Every call is a single request; retries belong to callers.
///
/// # Thread Safety
///
/// Implementations are shared between concurrent update-check workers and
/// must be safe to call from many tasks at once.
#[async_trait]
pub trait ManifestClient: Send + Sync {
    /// Fetch the full catalog of installable add-ons
    async fn fetch_catalog(&self) -> Result<Vec<AddonManifest>>;

    /// Latest release of one add-on
    ///
    /// # Returns
    ///
    /// - `Ok(Release)`: The newest release
    /// - `Err(Error::NotFound)`: The add-on has no release
    /// - `Err(Error::Network)`: Transport failure or rejected request
    async fn latest_release(&self, name: &str) -> Result<Release>;

    /// A specific release of one add-on
    ///
    /// # Parameters
    ///
    /// - `name`: Add-on name
    /// - `version`: Tag name of the release
    async fn release(&self, name: &str, version: &str) -> Result<Release>;

    /// Latest releases for many add-ons in one request
    ///
    /// Entries that fail to decode are omitted from the map; the call itself
    /// only fails when the request or its envelope fails.
    async fn latest_releases(&self, names: &[String]) -> Result<HashMap<String, Release>>;

    /// Add-ons the authenticated user subscribed to
    async fn subscribed_addons(&self) -> Result<Vec<AddonManifest>>;

    /// Drop the authenticated user's subscription to an add-on
    async fn unsubscribe(&self, name: &str) -> Result<()>;

    /// URL the release archive of `name` is downloaded from
    ///
    /// Defaults to the release's own archive URL.
    fn archive_url(&self, _name: &str, release: &Release) -> String {
        release.zipball_url.clone()
    }

    /// Short client name for logs
    fn client_name(&self) -> &'static str;
}
