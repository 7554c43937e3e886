use std::{path::Path, rc::Rc};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::models::Mod;
use crate::{
    config::LoadOptions,
    document::Document,
    error::{DocumentLoadFailure, LoadError},
    materialize::Materializer,
    models::{ModId, ModInfo},
    pipeline::{DomainStore, RootMarker, RootVTable},
    registry::TypeRegistry,
    resource::{DirectoryProvider, ResourceProvider},
};

/// Loads one mod's root document into a [`Mod`].
#[derive(Clone)]
pub struct ModLoader {
    registry: TypeRegistry,
    options: LoadOptions,
}

impl ModLoader {
    /// Loader resolving types through `registry`.
    pub fn new(registry: TypeRegistry, options: LoadOptions) -> Self {
        Self { registry, options }
    }

    /// Registry used for type resolution.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Load options.
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load a discovered mod from disk.
    pub fn load(&self, info: &ModInfo, store: &mut DomainStore) -> Result<Mod, DocumentLoadFailure> {
        let provider: Rc<dyn ResourceProvider> = Rc::new(DirectoryProvider::new(&info.dir));
        self.load_from(
            ModId::new(info.id()),
            provider,
            Path::new(&info.document),
            store,
        )
    }

    /// Load `document` through `provider`.
    ///
    /// Every registered root runs its own pass over the document. A failing
    /// pass contributes its error and its nodes are discarded; the other
    /// passes still run so the failure reports every broken root at once. On
    /// success, the mod becomes the owner of every node the passes queued.
    pub fn load_from(
        &self,
        id: ModId,
        provider: Rc<dyn ResourceProvider>,
        document: &Path,
        store: &mut DomainStore,
    ) -> Result<Mod, DocumentLoadFailure> {
        let path = provider.resolve(document);
        let mod_path = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let fail = |errors: Vec<LoadError>| DocumentLoadFailure {
            mod_path: mod_path.clone(),
            errors,
        };

        let text = provider.read_text(&path).map_err(|source| {
            fail(vec![LoadError::Io {
                path: path.clone(),
                source,
            }])
        })?;
        let parsed = Document::parse(&path, &text).map_err(|err| fail(vec![err.in_file(&path)]))?;

        let index = self.registry.snapshot();
        let entries = index
            .types_with::<RootMarker>()
            .map_err(|err| fail(vec![err.into()]))?;
        if entries.is_empty() {
            warn!(owner = %id, "no root types registered, nothing will be loaded");
        }

        let mut cx = Materializer::new(index.clone(), &self.options, store);
        let mut roots = Vec::new();
        let mut nodes = Vec::new();
        let mut errors = Vec::new();
        for entry in entries {
            let Some(vtable) = entry.payload::<RootVTable>() else {
                continue;
            };
            debug!(owner = %id, root = vtable.name(), "root pass");
            let pass = cx.with_provider(Rc::clone(&provider), |cx| {
                cx.with_file(path.clone(), |cx| vtable.build(cx, &mut parsed.cursor()))
            });
            let queued = cx.take_loading();
            match pass {
                Ok(root) => {
                    roots.push(root);
                    nodes.extend(queued);
                }
                Err(err) => {
                    warn!(owner = %id, root = vtable.name(), "root pass failed: {err}");
                    errors.push(err.in_file(&path));
                }
            }
        }

        if !errors.is_empty() {
            return Err(fail(errors));
        }

        for node in &nodes {
            node.set_owner(&id);
        }
        info!(
            owner = %id,
            roots = roots.len(),
            nodes = nodes.len(),
            "loaded {}",
            path.display()
        );
        Ok(Mod {
            id,
            path,
            roots,
            nodes,
            loaded_at: Utc::now(),
        })
    }
}
