// # Archive Fetcher Trait
//
// Downloads a release archive to a path in the cache.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Trait for archive download implementations
///
/// The destination's parent directory exists before `fetch` is called. An
/// existing file at the destination is overwritten.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Download `url` into `destination`
    ///
    /// # Returns
    ///
    /// - `Ok(u64)`: Number of bytes written
    /// - `Err(Error::Network)`: Request failed or returned a non-success status
    /// - `Err(Error::Filesystem)`: The destination could not be written
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}
