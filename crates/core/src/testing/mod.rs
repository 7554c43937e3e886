//! Helpers shared by the unit tests.

pub(crate) mod fixtures;

use std::{path::Path, rc::Rc};

use crate::{
    config::LoadOptions,
    document::Document,
    error::{DocumentLoadFailure, LoadError},
    materialize::{Materialize, Materializer},
    models::ModId,
    package::{Mod, ModLoader},
    pipeline::DomainStore,
    registry::TypeRegistry,
    resource::{DirectoryProvider, MemoryProvider, ResourceProvider},
};

/// Reads single values out of parsed documents.
pub(crate) struct Harness {
    registry: TypeRegistry,
    options: LoadOptions,
    store: DomainStore,
    provider: Option<Rc<dyn ResourceProvider>>,
}

impl Harness {
    pub(crate) fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            options: LoadOptions::default(),
            store: DomainStore::new(),
            provider: None,
        }
    }

    pub(crate) fn with_directory(self, root: &Path) -> Self {
        self.with_provider(DirectoryProvider::new(root))
    }

    pub(crate) fn with_provider(mut self, provider: impl ResourceProvider + 'static) -> Self {
        self.provider = Some(Rc::new(provider));
        self
    }

    pub(crate) fn read<T: Materialize>(&mut self, document: &Document) -> Result<T, LoadError> {
        let mut cx = Materializer::new(self.registry.snapshot(), &self.options, &mut self.store);
        let result = match self.provider.clone() {
            Some(provider) => cx.with_provider(provider, |cx| read_document(cx, document)),
            None => read_document(&mut cx, document),
        };
        result.map_err(|err| err.in_file(document.path()))
    }
}

fn read_document<T: Materialize>(
    cx: &mut Materializer<'_>,
    document: &Document,
) -> Result<T, LoadError> {
    cx.with_file(document.path().to_path_buf(), |cx| {
        cx.read::<T>(&mut document.cursor())
    })
}

/// Load `source` as the root document of an in-memory mod named `test`.
pub(crate) fn load_memory(
    registry: &TypeRegistry,
    store: &mut DomainStore,
    source: &str,
) -> Result<Mod, DocumentLoadFailure> {
    let provider = MemoryProvider::new("/mods/test").with_file("mod.yaml", source);
    ModLoader::new(registry.clone(), LoadOptions::default()).load_from(
        ModId::new("test"),
        Rc::new(provider),
        Path::new("mod.yaml"),
        store,
    )
}
