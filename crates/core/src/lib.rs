#![warn(clippy::all, missing_docs)]

//! Core of the graft configuration engine.
//!
//! Mods ship YAML documents that are resolved against a registry of Rust
//! types: polymorphic fields pick their concrete type by tag, discriminator
//! key or key-set, subjects create or locate domain objects, and extensions
//! registered for a type's lineage attach to them. Configuration is pushed
//! onto the domain objects only once a mod's documents parsed cleanly.

pub mod config;
pub mod document;
pub mod error;
pub mod manifest;
pub mod materialize;
pub mod models;
pub mod package;
pub mod pipeline;
pub mod registry;
pub mod replay;
pub mod resolve;
pub mod resource;
pub mod schema;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, LoadOptions};
pub use document::{Document, EventSource, Span};
pub use error::{DocumentLoadFailure, LoadError, TypeResolutionFailure};
pub use manifest::ModManifest;
pub use materialize::{Materialize, Materializer, Value};
pub use models::{ModId, ModInfo};
pub use package::{activation_order, Mod, ModLoader};
pub use pipeline::{DomainObject, DomainStore, Extension, Root, Subject, SubjectNode};
pub use registry::{module, Registrar, TypeRegistry};
pub use resolve::{Poly, Polymorphic};
pub use resource::{ModCatalog, ResourceProvider};
pub use schema::{Member, NamingConvention, Schema};
