//! Mod manifest stored next to each mod's root document.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static MOD_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("invalid mod id regex"));

/// Identity, version and dependencies of a mod.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModManifest {
    /// Unique lowercase identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Free-form version string.
    #[serde(default = "default_version")]
    pub version: String,
    /// Ids of mods that must be active first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Root document name, overriding the configured default.
    #[serde(default)]
    pub document: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl ModManifest {
    /// Manifest with an id and defaults for everything else.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            version: default_version(),
            dependencies: Vec::new(),
            document: None,
        }
    }

    /// Load a manifest, returning `None` if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let manifest: ModManifest = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        manifest
            .validate()
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Persist the manifest, creating parent directories if needed.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create manifest directory {}", parent.display())
            })?;
        }

        let serialized =
            serde_json::to_string_pretty(self).context("failed to serialize mod manifest")?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write manifest {}", path.display()))
    }

    /// Check the id and dependency ids.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_id(&self.id) {
            bail!("`{}` is not a valid mod id", self.id);
        }
        if let Some(bad) = self.dependencies.iter().find(|dep| !is_valid_id(dep)) {
            bail!("dependency `{}` is not a valid mod id", bad);
        }
        if self.dependencies.contains(&self.id) {
            bail!("mod `{}` depends on itself", self.id);
        }
        Ok(())
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Whether `id` is usable as a mod id.
pub fn is_valid_id(id: &str) -> bool {
    MOD_ID_RE.is_match(id)
}

/// Manifest path inside a mod directory.
pub fn manifest_path(mod_dir: impl AsRef<Path>, manifest_name: &str) -> PathBuf {
    mod_dir.as_ref().join(manifest_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_manifest_is_none() -> Result<()> {
        let temp = tempdir()?;
        assert!(ModManifest::load(temp.path().join("manifest.json"))?.is_none());
        Ok(())
    }

    #[test]
    fn persist_then_load() -> Result<()> {
        let temp = tempdir()?;
        let path = manifest_path(temp.path().join("armory"), "manifest.json");
        let mut manifest = ModManifest::new("armory");
        manifest.dependencies.push("base".to_string());
        manifest.persist(&path)?;

        let loaded = ModManifest::load(&path)?.expect("manifest was written");
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.display_name(), "armory");
        Ok(())
    }

    #[test]
    fn defaults_fill_optional_fields() -> Result<()> {
        let temp = tempdir()?;
        let path = temp.path().join("manifest.json");
        fs::write(&path, r#"{"id": "base"}"#)?;
        let manifest = ModManifest::load(&path)?.expect("manifest exists");
        assert_eq!(manifest.version, "0.1.0");
        assert!(manifest.dependencies.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_ids_are_rejected() -> Result<()> {
        let temp = tempdir()?;
        let path = temp.path().join("manifest.json");
        fs::write(&path, r#"{"id": "Bad Id"}"#)?;
        assert!(ModManifest::load(&path).is_err());

        let mut manifest = ModManifest::new("loop");
        manifest.dependencies.push("loop".to_string());
        assert!(manifest.validate().is_err());
        Ok(())
    }
}
