//! Marker-tagged type registry.
//!
//! Plugins contribute types through [`Module::register`]. Each registration
//! tags a concrete type with a [`Marker`]; the registry groups them into a
//! lazily built [`RegistryIndex`] (marker → entries, in module then
//! registration order). Adding a module throws the whole index away; the next
//! query rebuilds it from every known module.

use std::{
    any::{type_name, Any, TypeId},
    collections::{HashMap, HashSet},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ExtensionMisconfigured, RegistryError};

/// A tag that can be attached to registered types.
pub trait Marker: 'static {
    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Only registrable markers are indexed and may be queried.
    const REGISTRABLE: bool = true;

    /// Capability check run when the index is built.
    fn accepts(entry: &TypeEntry) -> Result<(), String> {
        let _ = entry;
        Ok(())
    }
}

/// Runtime identity of a [`Marker`].
#[derive(Clone, Copy)]
pub struct MarkerKey {
    id: TypeId,
    name: &'static str,
    registrable: bool,
    accepts: fn(&TypeEntry) -> Result<(), String>,
}

impl MarkerKey {
    /// Key for marker `M`.
    pub fn of<M: Marker>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: M::NAME,
            registrable: M::REGISTRABLE,
            accepts: M::accepts,
        }
    }

    /// Marker name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for MarkerKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MarkerKey {}

impl Hash for MarkerKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MarkerKey").field(&self.name).finish()
    }
}

/// One concrete type registered under a marker.
#[derive(Clone)]
pub struct TypeEntry {
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    module: String,
    discriminator: Option<String>,
    payload: Arc<dyn Any + Send + Sync>,
}

impl TypeEntry {
    /// Entry for type `T`, carrying a marker-specific payload.
    pub fn new<T: ?Sized + 'static>(
        name: &'static str,
        payload: impl Any + Send + Sync,
    ) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            module: String::new(),
            discriminator: None,
            payload: Arc::new(payload),
        }
    }

    /// Attach a discriminator value.
    pub fn with_discriminator(mut self, value: impl Into<String>) -> Self {
        self.discriminator = Some(value.into());
        self
    }

    /// Registered name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type name of the registered type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Identity of the registered type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Module that registered the entry.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Discriminator value, for property-keyed candidates.
    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    /// Marker-specific payload, if it has type `P`.
    pub fn payload<P: 'static>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }

    /// Whether the payload has type `P`.
    pub fn has_payload<P: 'static>(&self) -> bool {
        self.payload.is::<P>()
    }
}

impl fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeEntry")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("module", &self.module)
            .field("discriminator", &self.discriminator)
            .finish()
    }
}

/// Collects one module's registrations.
pub struct Registrar {
    module: String,
    entries: Vec<(MarkerKey, TypeEntry)>,
}

impl Registrar {
    fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            entries: Vec::new(),
        }
    }

    /// Name of the module being registered.
    pub fn module_name(&self) -> &str {
        &self.module
    }

    /// Tag an entry with marker `M`.
    ///
    /// Prefer the typed entry points (`root`, `extension`, `candidate`,
    /// `discriminated`); this is the untyped escape hatch they build on.
    pub fn tag<M: Marker>(&mut self, mut entry: TypeEntry) -> &mut Self {
        entry.module = self.module.clone();
        self.entries.push((MarkerKey::of::<M>(), entry));
        self
    }
}

/// A unit of registrations, typically one plugin.
pub trait Module: Send + Sync {
    /// Module name.
    fn name(&self) -> &str;

    /// Contribute types to the registry.
    fn register(&self, registrar: &mut Registrar);
}

/// [`Module`] backed by a plain function.
pub struct FnModule {
    name: String,
    register: fn(&mut Registrar),
}

impl Module for FnModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, registrar: &mut Registrar) {
        (self.register)(registrar)
    }
}

/// Build a module from a registration function.
pub fn module(name: impl Into<String>, register: fn(&mut Registrar)) -> FnModule {
    FnModule {
        name: name.into(),
        register,
    }
}

/// Immutable marker → entries map produced by one registry scan.
#[derive(Debug, Default)]
pub struct RegistryIndex {
    generation: u64,
    by_marker: HashMap<MarkerKey, Vec<Arc<TypeEntry>>>,
}

impl RegistryIndex {
    /// Entries tagged with marker `M`, in registration order.
    pub fn types_with<M: Marker>(&self) -> Result<&[Arc<TypeEntry>], RegistryError> {
        if !M::REGISTRABLE {
            return Err(RegistryError::Unregistrable { marker: M::NAME });
        }
        Ok(self
            .by_marker
            .get(&MarkerKey::of::<M>())
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    /// Registry generation this index was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Process-wide, cloneable handle on the registered modules and their index.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    modules: Vec<Arc<dyn Module>>,
    index: Option<Arc<RegistryIndex>>,
    generation: u64,
    rejected: HashSet<(TypeId, TypeId)>,
    warnings: Vec<ExtensionMisconfigured>,
}

impl TypeRegistry {
    /// Registry without modules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a module available and invalidate the index.
    pub fn add_module(&self, module: impl Module + 'static) {
        let mut inner = self.inner.write();
        info!(module = module.name(), "module available, invalidating type registry");
        inner.modules.push(Arc::new(module));
        inner.index = None;
        inner.generation += 1;
    }

    /// Names of the known modules, in registration order.
    pub fn modules(&self) -> Vec<String> {
        self.inner
            .read()
            .modules
            .iter()
            .map(|module| module.name().to_string())
            .collect()
    }

    /// Current index, building it on first use after an invalidation.
    pub fn snapshot(&self) -> Arc<RegistryIndex> {
        if let Some(index) = self.inner.read().index.as_ref() {
            return Arc::clone(index);
        }

        let mut inner = self.inner.write();
        if let Some(index) = inner.index.as_ref() {
            return Arc::clone(index);
        }
        let index = Arc::new(build_index(&mut inner));
        inner.index = Some(Arc::clone(&index));
        index
    }

    /// Entries tagged with marker `M`.
    pub fn types_with<M: Marker>(&self) -> Result<Vec<Arc<TypeEntry>>, RegistryError> {
        Ok(self.snapshot().types_with::<M>()?.to_vec())
    }

    /// Every rejected registration seen so far, each reported once.
    pub fn warnings(&self) -> Vec<ExtensionMisconfigured> {
        self.inner.read().warnings.clone()
    }
}

fn build_index(inner: &mut Inner) -> RegistryIndex {
    let mut by_marker: HashMap<MarkerKey, Vec<Arc<TypeEntry>>> = HashMap::new();
    let mut seen = HashSet::new();

    let modules = inner.modules.clone();
    for module in &modules {
        let mut registrar = Registrar::new(module.name());
        module.register(&mut registrar);

        for (marker, entry) in registrar.entries {
            if !marker.registrable {
                debug!(
                    marker = marker.name,
                    ty = entry.type_name,
                    "skipping type tagged with unregistrable marker"
                );
                continue;
            }
            if seen.contains(&(marker.id, entry.type_id)) {
                debug!(marker = marker.name, ty = entry.type_name, "duplicate registration ignored");
                continue;
            }
            if let Err(reason) = (marker.accepts)(&entry) {
                if inner.rejected.insert((marker.id, entry.type_id)) {
                    let warning = ExtensionMisconfigured {
                        marker: marker.name,
                        type_name: entry.type_name.to_string(),
                        module: entry.module.clone(),
                        reason,
                    };
                    warn!("{warning}");
                    inner.warnings.push(warning);
                }
                continue;
            }
            seen.insert((marker.id, entry.type_id));
            by_marker.entry(marker).or_default().push(Arc::new(entry));
        }
    }

    debug!(
        generation = inner.generation,
        markers = by_marker.len(),
        "type registry index built"
    );
    RegistryIndex {
        generation: inner.generation,
        by_marker,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;
    struct Gadget;
    struct Gizmo;

    struct Tool;
    impl Marker for Tool {
        const NAME: &'static str = "tool";
    }

    struct Internal;
    impl Marker for Internal {
        const NAME: &'static str = "internal";
        const REGISTRABLE: bool = false;
    }

    struct Strict;
    impl Marker for Strict {
        const NAME: &'static str = "strict";
        fn accepts(entry: &TypeEntry) -> Result<(), String> {
            if entry.has_payload::<u32>() {
                Ok(())
            } else {
                Err("payload is not a u32".to_string())
            }
        }
    }

    fn first_module(registrar: &mut Registrar) {
        registrar
            .tag::<Tool>(TypeEntry::new::<Widget>("widget", ()))
            .tag::<Tool>(TypeEntry::new::<Gadget>("gadget", ()))
            .tag::<Internal>(TypeEntry::new::<Gadget>("gadget", ()));
    }

    fn second_module(registrar: &mut Registrar) {
        registrar
            .tag::<Tool>(TypeEntry::new::<Gizmo>("gizmo", ()))
            .tag::<Tool>(TypeEntry::new::<Widget>("widget", ()));
    }

    fn names(entries: &[Arc<TypeEntry>]) -> Vec<&'static str> {
        entries.iter().map(|entry| entry.name()).collect()
    }

    #[test]
    fn index_is_built_lazily_and_cached() {
        let registry = TypeRegistry::new();
        registry.add_module(module("first", first_module));
        let a = registry.snapshot();
        let b = registry.snapshot();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(names(a.types_with::<Tool>().expect("tool is registrable")), vec!["widget", "gadget"]);
    }

    #[test]
    fn new_module_invalidates_without_duplicates() -> anyhow::Result<()> {
        let registry = TypeRegistry::new();
        registry.add_module(module("first", first_module));
        let before = registry.snapshot();
        assert_eq!(names(&registry.types_with::<Tool>()?), vec!["widget", "gadget"]);

        registry.add_module(module("second", second_module));
        let after = registry.snapshot();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.generation() > before.generation());
        assert_eq!(
            names(&registry.types_with::<Tool>()?),
            vec!["widget", "gadget", "gizmo"]
        );
        Ok(())
    }

    #[test]
    fn unregistrable_markers_cannot_be_queried() {
        let registry = TypeRegistry::new();
        registry.add_module(module("first", first_module));
        assert_eq!(
            registry.types_with::<Internal>().unwrap_err(),
            RegistryError::Unregistrable { marker: "internal" }
        );
    }

    #[test]
    fn rejected_types_warn_once_across_rebuilds() -> anyhow::Result<()> {
        fn strict_module(registrar: &mut Registrar) {
            registrar
                .tag::<Strict>(TypeEntry::new::<Widget>("widget", 7u32))
                .tag::<Strict>(TypeEntry::new::<Gadget>("gadget", "not a number"));
        }

        let registry = TypeRegistry::new();
        registry.add_module(module("strict", strict_module));
        assert_eq!(names(&registry.types_with::<Strict>()?), vec!["widget"]);

        registry.add_module(module("first", first_module));
        assert_eq!(names(&registry.types_with::<Strict>()?), vec!["widget"]);

        let warnings = registry.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].module, "strict");
        assert!(warnings[0].type_name.ends_with("Gadget"));
        Ok(())
    }

    #[test]
    fn rejected_entry_does_not_shadow_a_later_valid_one() -> anyhow::Result<()> {
        fn broken_module(registrar: &mut Registrar) {
            registrar.tag::<Strict>(TypeEntry::new::<Widget>("widget", "not a number"));
        }
        fn fixed_module(registrar: &mut Registrar) {
            registrar.tag::<Strict>(TypeEntry::new::<Widget>("widget", 7u32));
        }

        let registry = TypeRegistry::new();
        registry.add_module(module("broken", broken_module));
        registry.add_module(module("fixed", fixed_module));

        let entries = registry.types_with::<Strict>()?;
        assert_eq!(names(&entries), vec!["widget"]);
        assert_eq!(entries[0].payload::<u32>(), Some(&7));

        let warnings = registry.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].module, "broken");
        Ok(())
    }
}
