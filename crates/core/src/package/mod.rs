//! Mods: loading root documents and ordering activation.

pub mod dependencies;
mod loader;
mod models;

pub use dependencies::{activation_order, DependencyError};
pub use loader::ModLoader;
pub use models::Mod;
