//! Test doubles and common utilities for contract tests
//!
//! The doubles serve releases and archives from memory so the engine's
//! filesystem behavior can be checked without a network.

#![allow(dead_code)]

use addon_core::error::{Error, Result};
use addon_core::traits::{ArchiveFetcher, ManifestClient};
use addon_core::types::{AddonManifest, Release, ReleaseTag};
use addon_core::{AddonManager, ManagedStore, ManagerConfig, ManagerEvent};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;

/// Build a release for `name` at `tag`
///
/// The archive URL encodes the name so [`MockArchiveFetcher`] can find the
/// matching archive.
pub fn release(name: &str, tag: &str) -> Release {
    Release {
        zipball_url: format!("mock://{}/{}", name, tag),
        tag_name: tag.to_string(),
        body: format!("Release notes for {}", tag),
        published_at: "2024-05-01T10:00:00Z".parse().unwrap(),
        tag: ReleaseTag {
            reference: format!("refs/tags/{}", tag),
            sha: format!("sha-{}", tag),
            kind: "commit".to_string(),
            url: String::new(),
        },
    }
}

/// A mock ManifestClient serving releases from a map
#[derive(Clone, Default)]
pub struct MockManifestClient {
    /// Latest tag per add-on
    latest: Arc<Mutex<HashMap<String, String>>>,
    /// Catalog entries
    catalog: Arc<Mutex<Vec<AddonManifest>>>,
    /// Artificial latency per add-on
    delays_ms: Arc<Mutex<HashMap<String, u64>>>,
    /// Add-ons whose release query fails
    failing: Arc<Mutex<HashSet<String>>>,
    /// Call counter for latest_release()
    latest_calls: Arc<AtomicUsize>,
    /// Call counter for latest_releases()
    bulk_calls: Arc<AtomicUsize>,
    /// Versions requested through release()
    pinned_requests: Arc<Mutex<Vec<(String, String)>>>,
    /// Names passed to unsubscribe()
    unsubscribed: Arc<Mutex<Vec<String>>>,
}

impl MockManifestClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `tag` as the latest release of `name` and list it in the catalog
    pub fn publish(&self, name: &str, tag: &str) {
        self.latest
            .lock()
            .unwrap()
            .insert(name.to_string(), tag.to_string());

        let mut catalog = self.catalog.lock().unwrap();
        if !catalog.iter().any(|manifest| manifest.name == name) {
            let mut manifest = AddonManifest::new(name);
            manifest.author = "tester".to_string();
            manifest.repo = format!("tester/{}", name.to_lowercase());
            catalog.push(manifest);
        }
    }

    pub fn set_delay(&self, name: &str, millis: u64) {
        self.delays_ms.lock().unwrap().insert(name.to_string(), millis);
    }

    pub fn fail_releases_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn manifest(&self, name: &str) -> AddonManifest {
        self.catalog
            .lock()
            .unwrap()
            .iter()
            .find(|manifest| manifest.name == name)
            .cloned()
            .unwrap_or_else(|| AddonManifest::new(name))
    }

    pub fn latest_call_count(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_call_count(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn pinned_requests(&self) -> Vec<(String, String)> {
        self.pinned_requests.lock().unwrap().clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.unsubscribed.lock().unwrap().clone()
    }

    fn lookup(&self, name: &str) -> Result<Release> {
        if self.failing.lock().unwrap().contains(name) {
            return Err(Error::network(format!("release query for {} failed", name)));
        }
        let tag = self
            .latest
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("no release found"))?;
        Ok(release(name, &tag))
    }
}

#[async_trait::async_trait]
impl ManifestClient for MockManifestClient {
    async fn fetch_catalog(&self) -> Result<Vec<AddonManifest>> {
        Ok(self.catalog.lock().unwrap().clone())
    }

    async fn latest_release(&self, name: &str) -> Result<Release> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays_ms.lock().unwrap().get(name).copied();
        if let Some(millis) = delay {
            tokio::time::sleep(tokio::time::Duration::from_millis(millis)).await;
        }

        self.lookup(name)
    }

    async fn release(&self, name: &str, version: &str) -> Result<Release> {
        self.pinned_requests
            .lock()
            .unwrap()
            .push((name.to_string(), version.to_string()));
        Ok(release(name, version))
    }

    async fn latest_releases(&self, names: &[String]) -> Result<HashMap<String, Release>> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        Ok(names
            .iter()
            .filter_map(|name| self.lookup(name).ok().map(|r| (name.clone(), r)))
            .collect())
    }

    async fn subscribed_addons(&self) -> Result<Vec<AddonManifest>> {
        Ok(Vec::new())
    }

    async fn unsubscribe(&self, name: &str) -> Result<()> {
        self.unsubscribed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn client_name(&self) -> &'static str {
        "mock"
    }
}

/// Archive content: (entry name, bytes); names ending in `/` are directories
pub type ArchiveEntries = Vec<(String, String)>;

/// A mock ArchiveFetcher that writes zip archives built in memory
#[derive(Clone, Default)]
pub struct MockArchiveFetcher {
    /// Archive content per add-on
    archives: Arc<Mutex<HashMap<String, ArchiveEntries>>>,
    /// Call counter for fetch()
    fetch_calls: Arc<AtomicUsize>,
    /// When set, every fetch fails
    offline: Arc<Mutex<bool>>,
}

impl MockArchiveFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `entries` for every release of `name`
    pub fn serve(&self, name: &str, entries: &[(&str, &str)]) {
        let entries = entries
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        self.archives.lock().unwrap().insert(name.to_string(), entries);
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ArchiveFetcher for MockArchiveFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if *self.offline.lock().unwrap() {
            return Err(Error::network(format!("failed to download {}", url)));
        }

        let name = url
            .strip_prefix("mock://")
            .and_then(|rest| rest.split('/').next())
            .ok_or_else(|| Error::network(format!("unexpected url {}", url)))?;
        let entries = self
            .archives
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::network(format!("404 for {}", url)))?;

        let entries: Vec<(&str, &str)> = entries
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_str()))
            .collect();
        write_zip(destination, &entries);

        Ok(std::fs::metadata(destination)?.len())
    }
}

/// Write a zip archive; names ending in `/` become directory entries
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().unix_permissions(0o644);
    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// Temporary game and manager directories
pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub config: ManagerConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let addon_dir = dir.path().join("Documents").join("Addon");
        std::fs::create_dir_all(&addon_dir).unwrap();

        let config = ManagerConfig::new(
            addon_dir,
            dir.path().join("data"),
            dir.path().join("cache"),
        );
        Self { dir, config }
    }

    pub fn addon_dir(&self) -> &Path {
        &self.config.addon_dir
    }

    pub fn live_dir(&self, name: &str) -> PathBuf {
        self.config.addon_dir.join(name)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    pub fn addons_txt(&self) -> String {
        std::fs::read_to_string(self.addon_dir().join("addons.txt")).unwrap_or_default()
    }

    /// Build and initialize a manager over this environment
    pub async fn manager(
        &self,
        client: &MockManifestClient,
        fetcher: &MockArchiveFetcher,
        store: Box<dyn ManagedStore>,
    ) -> (AddonManager, mpsc::Receiver<ManagerEvent>) {
        let (manager, events) = AddonManager::new(
            self.config.clone(),
            Arc::new(client.clone()),
            Box::new(fetcher.clone()),
            store,
        )
        .expect("manager construction succeeds");
        manager.initialize().await.expect("initialize succeeds");
        (manager, events)
    }
}

/// Drain every event currently queued
pub fn drain_events(events: &mut mpsc::Receiver<ManagerEvent>) -> Vec<ManagerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

