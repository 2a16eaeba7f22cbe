// # Managed Store Implementations
//
// This module provides implementations of the ManagedStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{FileManagedStore, MANAGED_ADDONS_FILE};
pub use memory::MemoryManagedStore;
