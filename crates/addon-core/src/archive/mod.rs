// # Release Archives
//
// Turning a downloaded release into a live add-on directory happens in two
// steps:
//
// 1. [`ArchiveExtractor`] unpacks `<cache>/<name>.zip` into the cache
//    workspace `<cache>/<name>/`
// 2. [`DirectorySynchronizer`] moves the workspace's single root directory
//    into `<addon_dir>/<name>/`
//
// Both are synchronous; the engine runs them on the blocking pool.

pub mod extract;
pub mod sync;

pub use extract::{validate_addon_archive, validate_addon_name, ArchiveExtractor, ENTRY_POINT};
pub use sync::{DirectorySynchronizer, SyncMode, DEFAULT_PERSISTENT_DIR};
