use std::path::Path;

use crate::error::Result;

/// Host service that shows a directory to the user (file manager, dialog)
pub trait DirectoryOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<()>;
}

/// Opener for headless hosts; only logs the request
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDirectoryOpener;

impl DirectoryOpener for NoopDirectoryOpener {
    fn open(&self, path: &Path) -> Result<()> {
        tracing::debug!("Open directory requested without an opener: {}", path.display());
        Ok(())
    }
}
