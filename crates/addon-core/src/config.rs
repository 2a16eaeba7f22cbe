//! Configuration types for the add-on manager
//!
//! [`ManagerConfig`] carries the directories the engine works in. Hosts
//! that keep settings in a key-value store build it with
//! [`ManagerConfig::from_provider`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::archive::DEFAULT_PERSISTENT_DIR;
use crate::error::{Error, Result};

/// Settings key holding the game's documents directory
pub const GAME_PATH_KEY: &str = "general.aacpath";

/// Name of the add-on directory inside the game's documents directory
pub const ADDON_DIR_NAME: &str = "Addon";

/// Main add-on manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Live add-on directory (`<game path>/Addon`), holds `addons.txt`
    pub addon_dir: PathBuf,

    /// Directory holding `managed_addons.json`
    pub data_dir: PathBuf,

    /// Download and extraction workspace
    pub cache_dir: PathBuf,

    /// Per-add-on directory kept across updates
    #[serde(default = "default_persistent_dir_name")]
    pub persistent_dir_name: String,

    /// Regenerate the in-game update notification after each check
    #[serde(default = "default_notify_updates")]
    pub notify_updates: bool,

    /// Capacity of the event channel
    ///
    /// When full, new events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ManagerConfig {
    /// Create a configuration with default options
    pub fn new(
        addon_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            addon_dir: addon_dir.into(),
            data_dir: data_dir.into(),
            cache_dir: cache_dir.into(),
            persistent_dir_name: default_persistent_dir_name(),
            notify_updates: default_notify_updates(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Build from a settings store
    ///
    /// The add-on directory is `<game path>/Addon`, where the game path is
    /// read from [`GAME_PATH_KEY`].
    pub fn from_provider(
        provider: &dyn ConfigProvider,
        data_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let game_path = provider
            .get_string(GAME_PATH_KEY)?
            .filter(|path| !path.is_empty())
            .ok_or_else(|| Error::config(format!("{} is not set", GAME_PATH_KEY)))?;

        Ok(Self::new(
            Path::new(&game_path).join(ADDON_DIR_NAME),
            data_dir,
            cache_dir,
        ))
    }

    /// Set the persistent data directory name
    pub fn with_persistent_dir_name(mut self, name: impl Into<String>) -> Self {
        self.persistent_dir_name = name.into();
        self
    }

    /// Enable or disable the update notification helper
    pub fn with_notify_updates(mut self, enabled: bool) -> Self {
        self.notify_updates = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.addon_dir.as_os_str().is_empty() {
            return Err(Error::config("Add-on directory cannot be empty"));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::config("Data directory cannot be empty"));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::config("Cache directory cannot be empty"));
        }

        let name = self.persistent_dir_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(Error::config(format!(
                "Persistent directory name must be a single path component, got {:?}",
                name
            )));
        }

        if self.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }

        Ok(())
    }
}

fn default_persistent_dir_name() -> String {
    DEFAULT_PERSISTENT_DIR.to_string()
}

fn default_notify_updates() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    256
}

/// Key-value settings store supplied by the host
pub trait ConfigProvider: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>>;

    fn set_string(&self, key: &str, value: &str) -> Result<()>;

    fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    fn set_bool(&self, key: &str, value: bool) -> Result<()>;
}

/// Validate and store the game's documents directory
///
/// The directory must contain an `Addon` folder.
///
/// # Returns
///
/// - `Ok(PathBuf)`: The add-on directory inside `path`
/// - `Err(Error::Config)`: No `Addon` folder in `path`
pub fn set_game_path(provider: &dyn ConfigProvider, path: &Path) -> Result<PathBuf> {
    let addon_dir = path.join(ADDON_DIR_NAME);
    if !addon_dir.is_dir() {
        return Err(Error::config(format!(
            "invalid game documents path {}, no {} directory",
            path.display(),
            ADDON_DIR_NAME
        )));
    }

    provider.set_string(GAME_PATH_KEY, &path.to_string_lossy())?;
    tracing::info!("Set config option: {} to {}", GAME_PATH_KEY, path.display());
    Ok(addon_dir)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SettingValue {
    String(String),
    Bool(bool),
}

/// In-memory settings store
#[derive(Debug, Default)]
pub struct MemoryConfigProvider {
    values: RwLock<HashMap<String, SettingValue>>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| Error::config("settings lock poisoned"))?;
        match values.get(key) {
            Some(SettingValue::String(value)) => Ok(Some(value.clone())),
            Some(SettingValue::Bool(_)) => Err(Error::config(format!("{} is not a string", key))),
            None => Ok(None),
        }
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::config("settings lock poisoned"))?;
        values.insert(key.to_string(), SettingValue::String(value.to_string()));
        Ok(())
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let values = self
            .values
            .read()
            .map_err(|_| Error::config("settings lock poisoned"))?;
        match values.get(key) {
            Some(SettingValue::Bool(value)) => Ok(Some(*value)),
            Some(SettingValue::String(_)) => Err(Error::config(format!("{} is not a bool", key))),
            None => Ok(None),
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::config("settings lock poisoned"))?;
        values.insert(key.to_string(), SettingValue::Bool(value));
        Ok(())
    }
}
