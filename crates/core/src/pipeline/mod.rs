//! The Root / Subject / Extension composition model.
//!
//! Every registered [`Root`] reads the whole top-level document in its own
//! pass, as an open schema, so unrelated roots can share one document without
//! namespacing. Roots hold [`Subject`] nodes; each subject creates or locates
//! a domain object and picks up the [`Extension`]s registered for the
//! object's type lineage. Nothing is pushed onto domain objects until the
//! owning mod applies its configuration, after the whole document parsed.

mod extension;
mod store;
mod subject;

pub use extension::{AttachedExtension, Extension, ExtensionMarker, ExtensionVTable};
pub use store::{lineage, DomainObject, DomainStore, Handle, TypeKey};
pub use subject::{ConfigNode, Subject, SubjectNode, SubjectState};

use std::{any::Any, fmt};

use crate::{
    document::EventSource,
    error::LoadError,
    materialize::{Materialize, Materializer},
    registry::{Marker, Registrar, TypeEntry},
    schema::Schema,
};

/// A top-level schema entry point.
pub trait Root: Materialize + Schema + Any {}

/// A materialized root, with its type erased.
pub trait LoadedRoot: Any {
    /// Root name.
    fn name(&self) -> &'static str;

    /// Downcasting access.
    fn as_any(&self) -> &dyn Any;
}

impl<R: Root> LoadedRoot for R {
    fn name(&self) -> &'static str {
        R::NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for dyn LoadedRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoadedRoot").field(&self.name()).finish()
    }
}

type BuildRoot =
    fn(&mut Materializer<'_>, &mut dyn EventSource) -> Result<Box<dyn LoadedRoot>, LoadError>;

/// Registry payload describing one root type.
pub struct RootVTable {
    pub(crate) name: &'static str,
    pub(crate) build: BuildRoot,
}

impl RootVTable {
    /// Root name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run one root pass over a fresh reader of the top-level document.
    pub fn build(
        &self,
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Box<dyn LoadedRoot>, LoadError> {
        (self.build)(cx, events)
    }
}

/// Marker for root types.
pub struct RootMarker;

impl Marker for RootMarker {
    const NAME: &'static str = "root";

    fn accepts(entry: &TypeEntry) -> Result<(), String> {
        if entry.has_payload::<RootVTable>() {
            Ok(())
        } else {
            Err("not registered through `Registrar::root`, no root vtable".to_string())
        }
    }
}

fn build_root<R: Root>(
    cx: &mut Materializer<'_>,
    events: &mut dyn EventSource,
) -> Result<Box<dyn LoadedRoot>, LoadError> {
    cx.open_next_mapping();
    let root = cx.read::<R>(events);
    cx.clear_pending();
    Ok(Box::new(root?))
}

impl Registrar {
    /// Register root type `R`.
    pub fn root<R: Root>(&mut self) -> &mut Self {
        let vtable = RootVTable {
            name: R::NAME,
            build: build_root::<R>,
        };
        self.tag::<RootMarker>(TypeEntry::new::<R>(R::NAME, vtable))
    }
}
