use std::{
    any::{type_name, Any},
    collections::BTreeSet,
    fmt,
};

use super::store::{DomainObject, TypeKey};
use crate::{
    document::EventSource,
    error::LoadError,
    materialize::{Materialize, Materializer},
    registry::{Marker, Registrar, TypeEntry},
    schema::{self, NamingConvention, Schema},
};

/// Configuration a plugin contributes to a domain type it does not own.
///
/// An extension reads its keys from the subject's own node and is applied
/// after the subject. It applies to subjects whose object is `Target` or any
/// subtype of it.
pub trait Extension: Materialize + Schema + 'static {
    /// Domain type the extension configures.
    type Target: DomainObject;

    /// Push the extension's values onto `target`.
    fn apply(&self, target: &mut Self::Target) -> Result<(), LoadError>;
}

/// An extension materialized for one subject, with its type erased.
pub trait AttachedExtension {
    /// Extension name.
    fn name(&self) -> &'static str;

    /// Domain type the extension targets.
    fn target(&self) -> TypeKey;

    /// Apply to a view of the target type.
    fn apply_to(&self, target: &mut dyn Any) -> Result<(), LoadError>;

    /// Downcasting access to the extension value.
    fn as_any(&self) -> &dyn Any;
}

struct Attached<E>(E);

impl<E: Extension> AttachedExtension for Attached<E> {
    fn name(&self) -> &'static str {
        E::NAME
    }

    fn target(&self) -> TypeKey {
        TypeKey::of::<E::Target>()
    }

    fn apply_to(&self, target: &mut dyn Any) -> Result<(), LoadError> {
        let target = target
            .downcast_mut::<E::Target>()
            .ok_or_else(|| LoadError::Apply {
                subject: E::NAME.to_string(),
                message: format!("target is not a {}", type_name::<E::Target>()),
            })?;
        self.0.apply(target)
    }

    fn as_any(&self) -> &dyn Any {
        &self.0
    }
}

type BuildExtension =
    fn(&mut Materializer<'_>, &mut dyn EventSource) -> Result<Box<dyn AttachedExtension>, LoadError>;

/// Registry payload describing one extension type.
pub struct ExtensionVTable {
    pub(crate) name: &'static str,
    pub(crate) target: TypeKey,
    pub(crate) accepted: fn(NamingConvention) -> BTreeSet<String>,
    pub(crate) build: BuildExtension,
}

impl fmt::Debug for ExtensionVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionVTable")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish()
    }
}

/// Marker for extension types.
pub struct ExtensionMarker;

impl Marker for ExtensionMarker {
    const NAME: &'static str = "extension";

    fn accepts(entry: &TypeEntry) -> Result<(), String> {
        if entry.has_payload::<ExtensionVTable>() {
            Ok(())
        } else {
            Err("not registered through `Registrar::extension`, no extension vtable".to_string())
        }
    }
}

fn build_extension<E: Extension>(
    cx: &mut Materializer<'_>,
    events: &mut dyn EventSource,
) -> Result<Box<dyn AttachedExtension>, LoadError> {
    let extension: E = cx.read(events)?;
    Ok(Box::new(Attached(extension)))
}

impl Registrar {
    /// Register extension `E` for subjects of `E::Target` and its subtypes.
    pub fn extension<E: Extension>(&mut self) -> &mut Self {
        let vtable = ExtensionVTable {
            name: E::NAME,
            target: TypeKey::of::<E::Target>(),
            accepted: schema::accepted_keys::<E>,
            build: build_extension::<E>,
        };
        self.tag::<ExtensionMarker>(TypeEntry::new::<E>(E::NAME, vtable))
    }
}
