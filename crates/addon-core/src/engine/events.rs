use std::fmt;

/// Stages of the install and update pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStage {
    /// Release metadata and archive download
    Fetching,
    /// Unpacking into the cache workspace
    Extracting,
    /// Moving the release into the add-on directory
    Syncing,
    /// Registry and metadata store updates
    Registering,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStage::Fetching => "fetching",
            InstallStage::Extracting => "extracting",
            InstallStage::Syncing => "syncing",
            InstallStage::Registering => "registering",
        };
        f.write_str(name)
    }
}

/// Events emitted by the AddonManager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// A pipeline stage started
    StageEntered {
        name: String,
        stage: InstallStage,
    },

    /// Fresh install finished; `version` is `None` for local archives
    Installed {
        name: String,
        version: Option<String>,
    },

    /// Preserving update finished
    Updated {
        name: String,
        previous_version: Option<String>,
        version: String,
    },

    /// Add-on directory, record and registry line removed
    Uninstalled {
        name: String,
    },

    /// An operation on an add-on failed
    OperationFailed {
        name: String,
        error: String,
    },

    /// Update check finished with pending updates
    UpdatesFound {
        names: Vec<String>,
    },

    /// Managed record without its directory or registry line
    Inconsistency {
        name: String,
        missing_directory: bool,
        missing_registry_entry: bool,
    },
}
