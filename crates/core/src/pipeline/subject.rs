use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt,
    path::PathBuf,
    rc::Rc,
};

use tracing::{trace, warn};

use super::{
    extension::{AttachedExtension, ExtensionMarker, ExtensionVTable},
    store::{lineage, DomainObject, DomainStore, Handle, TypeKey},
};
use crate::{
    document::{EventSource, Span},
    error::LoadError,
    materialize::{Materialize, Materializer},
    models::ModId,
    replay::{KeyCollector, ReplayBuffer},
    schema::{self, Member, Schema},
};

/// Where a subject node is in the load pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubjectState {
    /// Node captured, nothing built yet.
    Parsed,
    /// Node read and its domain object created or located.
    SubjectMaterialized,
    /// Every applicable extension read from the node.
    ExtensionsAttached,
    /// Values pushed onto the domain object.
    ConfigurationApplied,
}

/// A node that configures a domain object.
pub trait SubjectNode: Materialize + Schema + 'static {
    /// Domain type configured by the node.
    type Object: DomainObject;

    /// Identity used to locate an existing object.
    fn identity(&self) -> String;

    /// Build a fresh object for this node.
    fn create(&self) -> Self::Object;

    /// Locate the object for this node, creating it on first sight.
    ///
    /// Reloading a document must locate the object created by the previous
    /// load, so overrides should look up by identity too.
    fn get_or_create(&self, store: &mut DomainStore) -> Handle<Self::Object> {
        store.get_or_insert_with(&self.identity(), || self.create())
    }

    /// Push the node's values onto `object`.
    fn apply(&self, object: &mut Self::Object) -> Result<(), LoadError>;
}

/// A configuration node waiting to be applied.
pub trait ConfigNode {
    /// Short description for logs and errors.
    fn describe(&self) -> String;

    /// Document the node was read from.
    fn file(&self) -> Option<PathBuf>;

    /// Source span of the node.
    fn span(&self) -> Option<Span>;

    /// Pipeline state.
    fn state(&self) -> SubjectState;

    /// Mod owning the node, once wired.
    fn owner(&self) -> Option<ModId>;

    /// Record the owning mod.
    fn set_owner(&self, owner: &ModId);

    /// Push the node's values, then its extensions' values, onto the object.
    fn apply_configuration(&self) -> Result<(), LoadError>;
}

struct SubjectCell<N: SubjectNode> {
    node: N,
    object: Handle<N::Object>,
    extensions: Vec<Box<dyn AttachedExtension>>,
    state: Cell<SubjectState>,
    span: Cell<Option<Span>>,
    file: RefCell<Option<PathBuf>>,
    owner: RefCell<Option<ModId>>,
}

impl<N: SubjectNode> SubjectCell<N> {
    fn advance(&self, state: SubjectState) {
        trace!(subject = N::NAME, identity = %self.node.identity(), ?state, "subject state");
        self.state.set(state);
    }

    fn extensions(&self) -> &[Box<dyn AttachedExtension>] {
        &self.extensions
    }

    fn apply_failed(&self, err: LoadError) -> LoadError {
        match err {
            err @ LoadError::Apply { .. } => err,
            other => LoadError::Apply {
                subject: self.describe(),
                message: other.to_string(),
            },
        }
    }
}

impl<N: SubjectNode> ConfigNode for SubjectCell<N> {
    fn describe(&self) -> String {
        format!("{} `{}`", N::NAME, self.node.identity())
    }

    fn file(&self) -> Option<PathBuf> {
        self.file.borrow().clone()
    }

    fn span(&self) -> Option<Span> {
        self.span.get()
    }

    fn state(&self) -> SubjectState {
        self.state.get()
    }

    fn owner(&self) -> Option<ModId> {
        self.owner.borrow().clone()
    }

    fn set_owner(&self, owner: &ModId) {
        *self.owner.borrow_mut() = Some(owner.clone());
    }

    fn apply_configuration(&self) -> Result<(), LoadError> {
        let mut object = self.object.borrow_mut();
        self.node
            .apply(&mut object)
            .map_err(|err| self.apply_failed(err))?;

        let own = TypeKey::of::<N::Object>();
        for extension in self.extensions() {
            let target: Option<&mut dyn Any> = if extension.target() == own {
                Some(&mut *object)
            } else {
                object.supertype_mut(extension.target())
            };
            match target {
                Some(target) => extension
                    .apply_to(target)
                    .map_err(|err| self.apply_failed(err))?,
                None => warn!(
                    subject = %self.describe(),
                    extension = extension.name(),
                    target = extension.target().name(),
                    "subject does not expose the extension's target type, skipping"
                ),
            }
        }

        self.advance(SubjectState::ConfigurationApplied);
        Ok(())
    }
}

/// Node wrapper driving a [`SubjectNode`] through the pipeline.
///
/// Materializing it reads the node, creates or locates its domain object,
/// then reads every registered extension whose target is the object's type or
/// one of its supertypes from a fresh replay of the same node. Keys accepted
/// by neither the node nor an attached extension are rejected. Completion
/// queues the node for ownership wiring; values reach the object only when
/// the owning mod applies its configuration.
pub struct Subject<N: SubjectNode> {
    cell: Rc<SubjectCell<N>>,
}

impl<N: SubjectNode> Subject<N> {
    /// The node's own values.
    pub fn node(&self) -> &N {
        &self.cell.node
    }

    /// Shared handle on the domain object.
    pub fn object(&self) -> Handle<N::Object> {
        Rc::clone(&self.cell.object)
    }

    /// Pipeline state.
    pub fn state(&self) -> SubjectState {
        self.cell.state.get()
    }

    /// Names of the attached extensions, in registration order.
    pub fn extension_names(&self) -> Vec<&'static str> {
        self.cell
            .extensions()
            .iter()
            .map(|extension| extension.name())
            .collect()
    }

    /// Attached extension of type `E`.
    pub fn extension<E: Any>(&self) -> Option<&E> {
        self.cell
            .extensions()
            .iter()
            .find_map(|extension| extension.as_any().downcast_ref::<E>())
    }

    /// Type-erased view for the pending-node list.
    pub fn as_config_node(&self) -> Rc<dyn ConfigNode> {
        self.cell.clone()
    }
}

impl<N: SubjectNode> Clone for Subject<N> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<N: SubjectNode + fmt::Debug> fmt::Debug for Subject<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("node", &self.cell.node)
            .field("state", &self.cell.state.get())
            .field("extensions", &self.extension_names())
            .finish()
    }
}

impl<N: SubjectNode> Schema for Subject<N> {
    const NAME: &'static str = N::NAME;
    const MEMBERS: &'static [Member] = N::MEMBERS;
    const ACCEPTED_KEYS: Option<&'static [&'static str]> = N::ACCEPTED_KEYS;
    const OPEN: bool = N::OPEN;
}

impl<N: SubjectNode> Materialize for Subject<N> {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let reserved = cx.reserved_key().map(str::to_string);
        let mut collector = KeyCollector::default();
        let mut observed = Vec::new();
        let buffer = ReplayBuffer::capture(events, |event| {
            if let Some(key) = collector.observe(event) {
                observed.push(key);
            }
        })?;
        trace!(subject = N::NAME, keys = observed.len(), state = ?SubjectState::Parsed, "subject captured");

        cx.open_next_mapping();
        let node: N = cx.read(&mut buffer.cursor())?;
        cx.clear_pending();
        let object = node.get_or_create(cx.store());

        trace!(
            subject = N::NAME,
            identity = %node.identity(),
            state = ?SubjectState::SubjectMaterialized,
            "subject state"
        );

        let convention = cx.convention();
        let lineage = lineage::<N::Object>();
        let mut accepted = schema::accepted_keys::<N>(convention);
        let mut extensions = Vec::new();
        let registry = cx.registry();
        for entry in registry.types_with::<ExtensionMarker>()? {
            let Some(vtable) = entry.payload::<ExtensionVTable>() else {
                continue;
            };
            if !lineage.contains(&vtable.target) {
                continue;
            }
            cx.open_next_mapping();
            let extension = (vtable.build)(cx, &mut buffer.cursor());
            cx.clear_pending();
            extensions.push(extension?);
            accepted.extend((vtable.accepted)(convention));
        }

        if !N::OPEN {
            let unknown = observed
                .into_iter()
                .find(|(key, _)| !accepted.contains(key) && reserved.as_deref() != Some(key));
            if let Some((key, span)) = unknown {
                return Err(LoadError::UnknownKey {
                    key,
                    owner: N::NAME.to_string(),
                    span,
                });
            }
        }

        let cell = Rc::new(SubjectCell {
            node,
            object,
            extensions,
            state: Cell::new(SubjectState::SubjectMaterialized),
            span: Cell::new(None),
            file: RefCell::new(cx.current_file().map(PathBuf::from)),
            owner: RefCell::new(None),
        });
        cell.advance(SubjectState::ExtensionsAttached);
        Ok(Subject { cell })
    }

    fn on_complete(&mut self, cx: &mut Materializer<'_>, span: Span) -> Result<(), LoadError> {
        self.cell.span.set(Some(span));
        cx.register_loading(self.as_config_node());
        Ok(())
    }
}
