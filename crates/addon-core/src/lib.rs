// # addon-core
//
// Core library for the game add-on manager.
//
// ## Architecture Overview
//
// This library installs, updates and removes add-ons in the game's add-on
// directory:
// - **ManifestClient**: Trait for the remote catalog and release metadata
// - **ArchiveFetcher**: Trait for downloading release archives
// - **ManagedStore**: Trait for metadata about add-ons the manager installed
// - **InstalledSetRegistry**: Owner of `addons.txt`, the game's list of enabled add-ons
// - **ArchiveExtractor** / **DirectorySynchronizer**: Unpack a release and move it into place
// - **UpdateChecker**: Concurrent comparison of recorded and remote versions
// - **AddonManager**: Engine that runs the install/update pipeline over all of the above
//
// ## Design Principles
//
// 1. **Owned State**: The registry and stores are objects with explicit `load` at startup
// 2. **Library-First**: Transports and hosts plug in through traits
// 3. **No Silent Repair**: Disagreements between directory, registry and store are reported
// 4. **User Data Survives**: Updates never touch an add-on's persistent data directory

pub mod traits;
pub mod types;
pub mod error;
pub mod config;
pub mod registry;
pub mod state;
pub mod archive;
pub mod checker;
pub mod notify;
pub mod engine;

// Re-export core types for convenience
pub use traits::{ArchiveFetcher, DirectoryOpener, ManagedStore, ManifestClient};
pub use types::{AddonManifest, InstalledAddon, Release, ReleaseTag};
pub use error::{Error, Result};
pub use config::{ConfigProvider, ManagerConfig, MemoryConfigProvider};
pub use registry::InstalledSetRegistry;
pub use state::{FileManagedStore, MemoryManagedStore};
pub use archive::{ArchiveExtractor, DirectorySynchronizer, SyncMode};
pub use checker::{PendingUpdates, UpdateChecker};
pub use notify::UpdateNotifier;
pub use engine::{AddonManager, InstallStage, ManagerEvent};
