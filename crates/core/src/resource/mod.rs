//! Resource access: document providers and mod discovery.

/// Mod discovery and the cached catalog.
pub mod loader;
mod provider;

pub use loader::{Layout, ModCatalog, ModDiscovery};
pub use provider::{DirectoryProvider, MemoryProvider, ResourceProvider};
