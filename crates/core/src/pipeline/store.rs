//! Domain objects produced by subject nodes.

use std::{
    any::{type_name, Any, TypeId},
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::Rc,
};

/// Shared, mutable handle on a domain object.
pub type Handle<T> = Rc<RefCell<T>>;

/// Runtime identity of a domain type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Rust type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A domain type configured by documents.
///
/// Subtyping is expressed by composition: a subtype embeds its supertype and
/// exposes it through [`supertype_mut`](Self::supertype_mut), so extensions
/// registered for the supertype also apply to the subtype.
pub trait DomainObject: Any {
    /// Every supertype, nearest first.
    fn supertypes() -> Vec<TypeKey>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// View of the embedded supertype identified by `key`.
    fn supertype_mut(&mut self, key: TypeKey) -> Option<&mut dyn Any> {
        let _ = key;
        None
    }
}

/// Own type plus supertypes of `T`.
pub fn lineage<T: DomainObject>() -> Vec<TypeKey> {
    let mut keys = vec![TypeKey::of::<T>()];
    keys.extend(T::supertypes());
    keys
}

#[derive(Default)]
struct Bucket {
    order: Vec<String>,
    objects: HashMap<String, Box<dyn Any>>,
}

/// Domain objects keyed by type and identity.
///
/// The store outlives individual loads, so reloading a document locates the
/// objects created the first time instead of creating them again.
#[derive(Default)]
pub struct DomainStore {
    buckets: HashMap<TypeId, Bucket>,
}

impl DomainStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Object of type `T` named `identity`.
    pub fn get<T: 'static>(&self, identity: &str) -> Option<Handle<T>> {
        self.buckets
            .get(&TypeId::of::<T>())?
            .objects
            .get(identity)?
            .downcast_ref::<Handle<T>>()
            .cloned()
    }

    /// Object of type `T` named `identity`, creating it with `create` on a miss.
    pub fn get_or_insert_with<T: 'static>(
        &mut self,
        identity: &str,
        create: impl FnOnce() -> T,
    ) -> Handle<T> {
        if let Some(existing) = self.get::<T>(identity) {
            return existing;
        }
        let handle = Rc::new(RefCell::new(create()));
        let bucket = self.buckets.entry(TypeId::of::<T>()).or_default();
        bucket.order.push(identity.to_string());
        bucket
            .objects
            .insert(identity.to_string(), Box::new(Rc::clone(&handle)));
        handle
    }

    /// Every object of type `T`, in creation order.
    pub fn objects<T: 'static>(&self) -> Vec<(String, Handle<T>)> {
        let Some(bucket) = self.buckets.get(&TypeId::of::<T>()) else {
            return Vec::new();
        };
        bucket
            .order
            .iter()
            .filter_map(|identity| {
                let handle = bucket.objects.get(identity)?.downcast_ref::<Handle<T>>()?;
                Some((identity.clone(), Rc::clone(handle)))
            })
            .collect()
    }

    /// Number of objects across all types.
    pub fn len(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.order.len()).sum()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DomainStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainStore")
            .field("objects", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_insert_creates_once() {
        let mut store = DomainStore::new();
        let first = store.get_or_insert_with("sword", || 1u32);
        let second = store.get_or_insert_with("sword", || 2u32);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(*second.borrow(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn types_are_kept_apart() {
        let mut store = DomainStore::new();
        store.get_or_insert_with("a", || 1u32);
        store.get_or_insert_with("a", || "text".to_string());
        store.get_or_insert_with("b", || 2u32);

        let numbers: Vec<String> = store
            .objects::<u32>()
            .into_iter()
            .map(|(identity, _)| identity)
            .collect();
        assert_eq!(numbers, vec!["a", "b"]);
        assert!(store.get::<String>("b").is_none());
        assert_eq!(store.len(), 3);
    }
}
