//! Add-on manager engine
//!
//! The AddonManager is responsible for:
//! - Installing and updating add-ons from the remote service
//! - Keeping the add-on directories, `addons.txt` and the managed store in step
//! - Checking managed add-ons for updates
//! - Reporting records the three disagree on
//!
//! ## Architecture
//!
//! ```text
//!                      ┌────────────────┐
//!                      │ ManifestClient │
//!                      └────────────────┘
//!                              │ Release
//!                              ▼
//! ┌───────────────┐   ┌──────────────────┐   ┌──────────────────────┐
//! │ ArchiveFetcher│──▶│ ArchiveExtractor │──▶│ DirectorySynchronizer│
//! └───────────────┘   └──────────────────┘   └──────────────────────┘
//!                                                       │
//!                              ┌────────────────────────┤
//!                              ▼                        ▼
//!                   ┌──────────────────────┐   ┌──────────────┐
//!                   │ InstalledSetRegistry │   │ ManagedStore │
//!                   └──────────────────────┘   └──────────────┘
//! ```
//!
//! ## Pipeline
//!
//! `Fetching → Extracting → Syncing → Registering`. The first failing stage
//! returns its error and no later stage runs. The cache workspace is removed
//! after every attempt that reached extraction.

mod events;
mod report;

pub use events::{InstallStage, ManagerEvent};
pub use report::{BatchReport, ConsistencyReport, OrphanedAddon};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::archive::{
    validate_addon_archive, validate_addon_name, ArchiveExtractor, DirectorySynchronizer, SyncMode,
};
use crate::checker::{PendingUpdates, UpdateChecker};
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::notify::UpdateNotifier;
use crate::registry::InstalledSetRegistry;
use crate::traits::{ArchiveFetcher, DirectoryOpener, ManagedStore, ManifestClient, NoopDirectoryOpener};
use crate::types::{AddonManifest, InstalledAddon, Release};

/// File the game keeps per-add-on settings in, inside the add-on directory
pub const ADDON_SETTINGS_FILE: &str = "addon_settings";

/// Core add-on manager
///
/// ## Lifecycle
///
/// 1. Create with [`AddonManager::new()`]
/// 2. Call [`AddonManager::initialize()`] once to load `addons.txt` and the store
/// 3. Run operations; each is awaited to completion by the caller
///
/// ## Threading
///
/// Operations take `&self` and may be called from several tasks. Operations
/// on the same add-on are not serialized against each other; callers run
/// them one at a time.
pub struct AddonManager {
    config: ManagerConfig,

    /// Remote catalog and releases
    client: Arc<dyn ManifestClient>,

    /// Archive downloads
    fetcher: Box<dyn ArchiveFetcher>,

    /// Metadata for managed add-ons
    store: Box<dyn ManagedStore>,

    registry: InstalledSetRegistry,
    extractor: ArchiveExtractor,
    synchronizer: DirectorySynchronizer,
    checker: UpdateChecker,
    notifier: UpdateNotifier,
    opener: Box<dyn DirectoryOpener>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ManagerEvent>,
}

impl AddonManager {
    /// Create a new add-on manager
    ///
    /// # Parameters
    ///
    /// - `config`: Manager configuration
    /// - `client`: Remote service client
    /// - `fetcher`: Archive downloader
    /// - `store`: Managed add-on store
    ///
    /// # Returns
    ///
    /// A tuple of (manager, event_receiver) where event_receiver yields manager events
    pub fn new(
        config: ManagerConfig,
        client: Arc<dyn ManifestClient>,
        fetcher: Box<dyn ArchiveFetcher>,
        store: Box<dyn ManagedStore>,
    ) -> Result<(Self, mpsc::Receiver<ManagerEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let manager = Self {
            registry: InstalledSetRegistry::in_dir(&config.addon_dir),
            extractor: ArchiveExtractor::new(&config.cache_dir),
            synchronizer: DirectorySynchronizer::new(
                &config.addon_dir,
                config.persistent_dir_name.clone(),
            ),
            checker: UpdateChecker::new(Arc::clone(&client)),
            notifier: UpdateNotifier::new(&config.addon_dir),
            opener: Box::new(NoopDirectoryOpener),
            client,
            fetcher,
            store,
            config,
            event_tx: tx,
        };

        Ok((manager, rx))
    }

    /// Use `opener` for the `open_*` operations
    pub fn with_directory_opener(mut self, opener: Box<dyn DirectoryOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &InstalledSetRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn ManagedStore {
        self.store.as_ref()
    }

    /// Load `addons.txt` and the managed store
    ///
    /// Creates `addons.txt` when it does not exist. Failing to create it is
    /// fatal; a missing managed store is not.
    pub async fn initialize(&self) -> Result<()> {
        if let Err(e) = self.ensure_registry().await {
            error!("fatal: cannot create addons.txt: {}", e);
            return Err(e);
        }
        let names = self.registry.load().await?;

        match self.store.load().await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("No managed add-ons recorded yet: {}", e);
            }
            Err(e) => {
                error!("Failed to load managed add-ons: {}", e);
                return Err(e);
            }
        }

        info!(
            "Initialized with {} installed add-on(s), {} managed",
            names.len(),
            self.store.list().await?.len()
        );
        Ok(())
    }

    /// Full catalog of installable add-ons
    pub async fn catalog(&self) -> Result<Vec<AddonManifest>> {
        let catalog = self.client.fetch_catalog().await?;
        info!("Retrieved {} addon manifests from remote source", catalog.len());
        Ok(catalog)
    }

    /// Add-ons the authenticated user subscribed to
    pub async fn subscribed_addons(&self) -> Result<Vec<AddonManifest>> {
        self.client.subscribed_addons().await
    }

    /// Install the latest release of `manifest`, replacing any existing directory
    pub async fn install(&self, manifest: &AddonManifest) -> Result<InstalledAddon> {
        self.install_release(manifest, None).await
    }

    /// Install the release tagged `version` instead of the latest one
    pub async fn install_version(
        &self,
        manifest: &AddonManifest,
        version: &str,
    ) -> Result<InstalledAddon> {
        self.install_release(manifest, Some(version)).await
    }

    async fn install_release(
        &self,
        manifest: &AddonManifest,
        version: Option<&str>,
    ) -> Result<InstalledAddon> {
        info!("Installing addon {} from {}", manifest.name, manifest.repo);

        match self.run_pipeline(manifest, version, SyncMode::Fresh).await {
            Ok(record) => {
                info!("{} {} installed successfully", record.name, record.version);
                self.emit_event(ManagerEvent::Installed {
                    name: record.name.clone(),
                    version: Some(record.version.clone()),
                });
                Ok(record)
            }
            Err(e) => Err(self.fail(&manifest.name, e)),
        }
    }

    /// Update `manifest` to its latest release, keeping its persistent data
    pub async fn update(&self, manifest: &AddonManifest) -> Result<InstalledAddon> {
        let previous_version = self
            .store
            .get(&manifest.name)
            .await?
            .map(|record| record.version);

        info!(
            "Updating addon {} (installed: {})",
            manifest.name,
            previous_version.as_deref().unwrap_or("unknown")
        );

        match self.run_pipeline(manifest, None, SyncMode::Preserve).await {
            Ok(record) => {
                info!("{} updated to {}", record.name, record.version);
                self.emit_event(ManagerEvent::Updated {
                    name: record.name.clone(),
                    previous_version,
                    version: record.version.clone(),
                });
                Ok(record)
            }
            Err(e) => Err(self.fail(&manifest.name, e)),
        }
    }

    /// Update an add-on, resolving its manifest from the catalog
    pub async fn update_by_name(&self, name: &str) -> Result<InstalledAddon> {
        let catalog = self.client.fetch_catalog().await?;
        let manifest = catalog
            .into_iter()
            .find(|manifest| manifest.name == name)
            .ok_or_else(|| Error::not_found(format!("{} is not in the catalog", name)))?;
        self.update(&manifest).await
    }

    /// Check for updates and update every add-on with one pending
    ///
    /// Failures are collected per add-on; one failure does not stop the rest.
    pub async fn update_all(&self) -> Result<BatchReport> {
        let pending = self.check_for_updates().await?;

        let mut names: Vec<&String> = pending.keys().collect();
        names.sort();

        let mut report = BatchReport::default();
        for name in names {
            let Some(record) = self.store.get(name).await? else {
                continue;
            };
            match self.update(&manifest_from_record(&record)).await {
                Ok(updated) => report.updated.push(updated),
                Err(e) => report.failed.push((name.clone(), e)),
            }
        }

        if self.config.notify_updates {
            let remaining: PendingUpdates = pending
                .into_iter()
                .filter(|(name, _)| report.failed.iter().any(|(failed, _)| failed == name))
                .collect();
            if let Err(e) = self.notifier.generate(&self.registry, &remaining).await {
                warn!("Failed to refresh update notification: {}", e);
            }
        }

        info!(
            "Update all finished: {} updated, {} failed",
            report.updated.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Install a local archive
    ///
    /// The add-on name is the archive's file stem. The add-on is registered in
    /// `addons.txt` but not managed. An archive without `main.lua` in its root
    /// directory is rejected with `MalformedArchive` before anything on disk
    /// changes.
    ///
    /// # Returns
    ///
    /// The installed add-on's name.
    pub async fn install_zip(&self, archive: &Path) -> Result<String> {
        let name = archive
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::not_found(format!("no add-on name in {}", archive.display()))
            })?;

        info!("Installing addon {} from {}", name, archive.display());
        match self.install_local(archive, &name).await {
            Ok(()) => {
                self.emit_event(ManagerEvent::Installed {
                    name: name.clone(),
                    version: None,
                });
                Ok(name)
            }
            Err(e) => Err(self.fail(&name, e)),
        }
    }

    /// Remove an add-on's directory, record and registry line
    ///
    /// Managed add-ons are also unsubscribed remotely; a failed unsubscribe is
    /// logged and does not fail the uninstall.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Removed and confirmed absent from store and registry
    /// - `Err(Error::NotFound)`: Neither registered nor on disk
    /// - `Err(Error::Consistency)`: Store or registry still holds the name
    /// - `Err(_)` from the store: the directory and registry line are already
    ///   gone; the managed record remains
    pub async fn uninstall(&self, name: &str) -> Result<()> {
        validate_addon_name(name)?;
        let live = self.synchronizer.live_dir(name);

        let on_disk = fs::try_exists(&live).await.unwrap_or(false);
        if !on_disk && !self.registry.contains(name).await {
            return Err(Error::not_found(format!("{} is not installed", name)));
        }

        if on_disk {
            fs::remove_dir_all(&live).await.map_err(|e| {
                Error::filesystem(format!("Failed to remove {}: {}", live.display(), e))
            })?;
        }

        // The registry line goes even when the record cannot be rewritten
        let was_managed = self.store.contains(name).await?;
        self.registry.remove(name).await?;

        if was_managed {
            let removed = self
                .store
                .remove(name)
                .await
                .map_err(|e| self.fail(name, e))?;

            match self.client.unsubscribe(name).await {
                Ok(()) => debug!("Unsubscribed from {}", name),
                Err(e) => warn!("Failed to unsubscribe from {}: {}", name, e),
            }

            if !removed {
                let err = Error::consistency(format!("{} is still managed after uninstall", name));
                return Err(self.fail(name, err));
            }
        }

        if self.store.contains(name).await? || self.registry.contains(name).await {
            let err = Error::consistency(format!("{} is still recorded after uninstall", name));
            return Err(self.fail(name, err));
        }

        info!("{} uninstalled", name);
        self.emit_event(ManagerEvent::Uninstalled {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Stop managing an add-on without touching its files or registry line
    pub async fn unmanage(&self, name: &str) -> Result<()> {
        if !self.store.remove(name).await? {
            return Err(Error::consistency(format!(
                "{} is still managed after unmanage",
                name
            )));
        }
        info!("{} is no longer managed", name);
        Ok(())
    }

    /// Every registered add-on, managed or not, in registry order
    pub async fn list_addons(&self) -> Result<Vec<InstalledAddon>> {
        let mut addons = Vec::new();
        for name in self.registry.names().await {
            match self.store.get(&name).await? {
                Some(mut record) => {
                    if record.alias.is_empty() {
                        record.alias = crate::types::alias_from_name(&name);
                    }
                    addons.push(record);
                }
                None => addons.push(InstalledAddon::detected(name)),
            }
        }
        Ok(addons)
    }

    /// Check every managed add-on with one request each
    pub async fn check_for_updates(&self) -> Result<PendingUpdates> {
        let managed = self.managed_records().await?;
        let pending = self.checker.check(managed).await;
        self.finish_check(&pending).await;
        Ok(pending)
    }

    /// Check every managed add-on with a single bulk request
    pub async fn check_for_updates_bulk(&self) -> Result<PendingUpdates> {
        let managed = self.managed_records().await?;
        let pending = self.checker.check_bulk(managed).await?;
        self.finish_check(&pending).await;
        Ok(pending)
    }

    /// Find managed records whose directory or registry line is missing
    ///
    /// Nothing is repaired; each finding is also emitted as
    /// [`ManagerEvent::Inconsistency`].
    pub async fn verify_consistency(&self) -> Result<ConsistencyReport> {
        let mut managed = self.managed_records().await?;
        managed.sort_by(|a, b| a.name.cmp(&b.name));

        let mut report = ConsistencyReport::default();
        for record in managed {
            let live = self.synchronizer.live_dir(&record.name);
            let missing_directory = !fs::metadata(&live)
                .await
                .map(|metadata| metadata.is_dir())
                .unwrap_or(false);
            let missing_registry_entry = !self.registry.contains(&record.name).await;

            if missing_directory || missing_registry_entry {
                warn!(
                    "Managed add-on {} is inconsistent (directory missing: {}, registry entry missing: {})",
                    record.name, missing_directory, missing_registry_entry
                );
                self.emit_event(ManagerEvent::Inconsistency {
                    name: record.name.clone(),
                    missing_directory,
                    missing_registry_entry,
                });
                report.orphaned.push(OrphanedAddon {
                    name: record.name,
                    missing_directory,
                    missing_registry_entry,
                });
            }
        }

        Ok(report)
    }

    /// Truncate the game's add-on settings file
    pub async fn reset_addon_settings(&self) -> Result<()> {
        let path = self.config.addon_dir.join(ADDON_SETTINGS_FILE);
        fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::not_found(format!("{} not found", path.display()))
                }
                _ => Error::filesystem(format!("Failed to truncate {}: {}", path.display(), e)),
            })?;
        info!("Add-on settings reset");
        Ok(())
    }

    /// Show an add-on's directory
    pub fn open_addon_dir(&self, name: &str) -> Result<()> {
        validate_addon_name(name)?;
        self.opener.open(&self.synchronizer.live_dir(name))
    }

    /// Show the cache directory
    pub async fn open_cache_dir(&self) -> Result<()> {
        self.open_created(&self.config.cache_dir).await
    }

    /// Show the data directory
    pub async fn open_data_dir(&self) -> Result<()> {
        self.open_created(&self.config.data_dir).await
    }

    async fn open_created(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(|e| {
            Error::filesystem(format!("Failed to create {}: {}", path.display(), e))
        })?;
        self.opener.open(path)
    }

    async fn ensure_registry(&self) -> Result<()> {
        if !self.registry.exists().await {
            info!(
                "addons.txt not found in {}, creating it",
                self.config.addon_dir.display()
            );
            self.registry.create().await?;
        }
        Ok(())
    }

    async fn managed_records(&self) -> Result<Vec<InstalledAddon>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|record| record.is_managed)
            .collect())
    }

    async fn finish_check(&self, pending: &PendingUpdates) {
        if self.config.notify_updates {
            if let Err(e) = self.notifier.generate(&self.registry, pending).await {
                warn!("Failed to write update notification: {}", e);
            }
        }

        if !pending.is_empty() {
            let mut names: Vec<String> = pending.keys().cloned().collect();
            names.sort();
            info!("Updates available: {}", names.join(", "));
            self.emit_event(ManagerEvent::UpdatesFound { names });
        }
    }

    /// Fetch, extract, synchronize and register one add-on
    async fn run_pipeline(
        &self,
        manifest: &AddonManifest,
        version: Option<&str>,
        mode: SyncMode,
    ) -> Result<InstalledAddon> {
        let name = manifest.name.as_str();
        validate_addon_name(name)?;

        self.enter_stage(name, InstallStage::Fetching);
        let release = match version {
            Some(version) => self.client.release(name, version).await?,
            None => self.client.latest_release(name).await?,
        };
        let archive = self.download(name, &release).await?;

        self.place(name, &archive, mode).await?;

        self.enter_stage(name, InstallStage::Registering);
        self.ensure_registry().await?;
        self.registry.add(name).await?;
        self.store.upsert(manifest, &release).await
    }

    async fn download(&self, name: &str, release: &Release) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.cache_dir).await.map_err(|e| {
            Error::filesystem(format!(
                "Failed to create cache directory {}: {}",
                self.config.cache_dir.display(),
                e
            ))
        })?;

        let url = self.client.archive_url(name, release);
        let archive = self.extractor.archive_path(name);
        let bytes = self.fetcher.fetch(&url, &archive).await?;
        debug!("Downloaded {} ({} bytes) to {}", name, bytes, archive.display());
        Ok(archive)
    }

    async fn install_local(&self, source: &Path, name: &str) -> Result<()> {
        validate_addon_name(name)?;

        // Nothing is touched for an archive that is not an add-on
        let source_path = source.to_path_buf();
        tokio::task::spawn_blocking(move || validate_addon_archive(&source_path))
            .await
            .map_err(|e| Error::Other(format!("archive check failed: {}", e)))??;

        self.enter_stage(name, InstallStage::Fetching);
        fs::create_dir_all(&self.config.cache_dir).await.map_err(|e| {
            Error::filesystem(format!(
                "Failed to create cache directory {}: {}",
                self.config.cache_dir.display(),
                e
            ))
        })?;
        let archive = self.extractor.archive_path(name);
        fs::copy(source, &archive).await.map_err(|e| {
            Error::filesystem(format!(
                "failed to copy {} to cache directory: {}",
                source.display(),
                e
            ))
        })?;

        self.place(name, &archive, SyncMode::Fresh).await?;

        self.enter_stage(name, InstallStage::Registering);
        self.ensure_registry().await?;
        self.registry.add(name).await
    }

    /// Extract `archive` and synchronize it into the add-on directory
    ///
    /// The workspace is removed afterwards whether or not either step failed.
    async fn place(&self, name: &str, archive: &Path, mode: SyncMode) -> Result<PathBuf> {
        let workspace = self.extractor.workspace(name);
        remove_workspace(&workspace).await?;

        self.enter_stage(name, InstallStage::Extracting);
        let result = self.extract_and_sync(name, archive, mode).await;

        if let Err(e) = fs::remove_file(archive).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", archive.display(), e);
            }
        }
        if let Err(e) = remove_workspace(&workspace).await {
            warn!("Failed to clean up workspace for {}: {}", name, e);
        }

        result
    }

    async fn extract_and_sync(&self, name: &str, archive: &Path, mode: SyncMode) -> Result<PathBuf> {
        let extractor = self.extractor.clone();
        let archive = archive.to_path_buf();
        let destination = name.to_string();
        let workspace = tokio::task::spawn_blocking(move || extractor.extract(&archive, &destination))
            .await
            .map_err(|e| Error::Other(format!("extract task failed: {}", e)))??;

        self.enter_stage(name, InstallStage::Syncing);
        let synchronizer = self.synchronizer.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || synchronizer.synchronize(&workspace, &name, mode))
            .await
            .map_err(|e| Error::Other(format!("sync task failed: {}", e)))?
    }

    fn enter_stage(&self, name: &str, stage: InstallStage) {
        debug!("{}: {}", name, stage);
        self.emit_event(ManagerEvent::StageEntered {
            name: name.to_string(),
            stage,
        });
    }

    /// Log and report a failed operation, handing the error back
    fn fail(&self, name: &str, error: Error) -> Error {
        error!("{} - {}", name, error);
        self.emit_event(ManagerEvent::OperationFailed {
            name: name.to_string(),
            error: error.to_string(),
        });
        error
    }

    /// Emit a manager event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: ManagerEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

impl std::fmt::Debug for AddonManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonManager")
            .field("config", &self.config)
            .field("client", &self.client.client_name())
            .finish_non_exhaustive()
    }
}

async fn remove_workspace(workspace: &Path) -> Result<()> {
    match fs::remove_dir_all(workspace).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::filesystem(format!(
            "Failed to remove old workspace {}: {}",
            workspace.display(),
            e
        ))),
    }
}

/// Manifest carrying what a record knows, for updates outside the catalog
fn manifest_from_record(record: &InstalledAddon) -> AddonManifest {
    let mut manifest = AddonManifest::new(record.name.clone()).with_alias(record.alias.clone());
    manifest.description = record.description.clone();
    manifest.author = record.author.clone();
    manifest.repo = record.repo.clone();
    manifest.branch = record.branch.clone();
    manifest
}
