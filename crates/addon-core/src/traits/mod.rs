//! Core traits for the add-on manager
//!
//! This module defines the seams between the engine and its collaborators.
//!
//! - [`ManifestClient`]: Catalog and release metadata from the remote service
//! - [`ArchiveFetcher`]: Release archive downloads into the cache
//! - [`ManagedStore`]: Persistent metadata for managed add-ons
//! - [`DirectoryOpener`]: Host service that reveals a directory to the user

pub mod manifest_client;
pub mod archive_fetcher;
pub mod managed_store;
pub mod directory_opener;

pub use manifest_client::ManifestClient;
pub use archive_fetcher::ArchiveFetcher;
pub use managed_store::ManagedStore;
pub use directory_opener::{DirectoryOpener, NoopDirectoryOpener};
