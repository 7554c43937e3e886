use std::{path::PathBuf, rc::Rc};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    error::LoadError,
    models::ModId,
    pipeline::{ConfigNode, LoadedRoot, Root},
};

/// One loaded root document and everything parsed from it.
pub struct Mod {
    pub(crate) id: ModId,
    pub(crate) path: PathBuf,
    pub(crate) roots: Vec<Box<dyn LoadedRoot>>,
    pub(crate) nodes: Vec<Rc<dyn ConfigNode>>,
    pub(crate) loaded_at: DateTime<Utc>,
}

impl Mod {
    /// Mod id.
    pub fn id(&self) -> &ModId {
        &self.id
    }

    /// Root document the mod was loaded from.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// When the document finished parsing.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Materialized root of type `R`.
    pub fn root<R: Root>(&self) -> Option<&R> {
        self.roots
            .iter()
            .find_map(|root| root.as_any().downcast_ref::<R>())
    }

    /// Names of the materialized roots, in pass order.
    pub fn root_names(&self) -> Vec<&'static str> {
        self.roots.iter().map(|root| root.name()).collect()
    }

    /// Configuration nodes owned by the mod, in completion order.
    pub fn nodes(&self) -> &[Rc<dyn ConfigNode>] {
        &self.nodes
    }

    /// Push every node's configuration onto its domain object.
    ///
    /// Stops at the first failing node. Returns how many nodes were applied.
    pub fn apply_configuration(&self) -> Result<usize, LoadError> {
        for node in &self.nodes {
            debug!(owner = %self.id, node = %node.describe(), "applying configuration");
            node.apply_configuration().map_err(|err| match node.file() {
                Some(file) => LoadError::InFile {
                    path: file,
                    span: node.span(),
                    source: Box::new(err),
                },
                None => err,
            })?;
        }
        info!(owner = %self.id, nodes = self.nodes.len(), "configuration applied");
        Ok(self.nodes.len())
    }
}

impl std::fmt::Debug for Mod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mod")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("roots", &self.root_names())
            .field("nodes", &self.nodes.len())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}
