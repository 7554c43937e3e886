//! Shared domain models.

use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::ModManifest;

/// Identifier of a loaded mod, used to wire node ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModId(String);

impl ModId {
    /// Wrap an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mod found on disk by discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModInfo {
    /// Parsed manifest.
    pub manifest: ModManifest,
    /// Directory holding the mod.
    pub dir: PathBuf,
    /// Root document name inside `dir`.
    pub document: String,
    /// Last modification time of the root document, if known.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ModInfo {
    /// Mod id.
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// Path of the root document.
    pub fn document_path(&self) -> PathBuf {
        self.dir.join(&self.document)
    }

    /// Returns a user-facing label combining name and version.
    pub fn display_name(&self) -> String {
        format!("{} · {}", self.manifest.display_name(), self.manifest.version)
    }
}
