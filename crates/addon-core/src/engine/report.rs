// # Operation Reports
//
// A synchronize interrupted by a crash or I/O error can leave a managed
// record whose directory or registry line is gone. The manager reports
// these records and leaves repair to the caller (reinstall or unmanage).

/// A managed record missing its directory, its registry line, or both
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedAddon {
    pub name: String,
    pub missing_directory: bool,
    pub missing_registry_entry: bool,
}

/// Result of [`super::AddonManager::verify_consistency`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Orphaned records, sorted by name
    pub orphaned: Vec<OrphanedAddon>,
}

impl ConsistencyReport {
    /// Whether every managed record has its directory and registry line
    pub fn is_consistent(&self) -> bool {
        self.orphaned.is_empty()
    }
}

/// Outcome of [`super::AddonManager::update_all`]
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Records after a successful update
    pub updated: Vec<crate::types::InstalledAddon>,

    /// Add-ons whose update failed, with the error
    pub failed: Vec<(String, crate::error::Error)>,
}

impl BatchReport {
    /// Whether every update succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
