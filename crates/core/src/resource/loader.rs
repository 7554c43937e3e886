use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    manifest::{manifest_path, ModManifest},
    models::ModInfo,
};

/// Thread-safe catalog of the mods installed in a directory.
#[derive(Clone)]
pub struct ModCatalog {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    mods_dir: PathBuf,
    layout: Layout,
    cache: Option<Vec<ModInfo>>,
}

/// File names looked up inside each mod directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Manifest file name.
    pub manifest_name: String,
    /// Default root document name.
    pub root_document: String,
}

impl From<&AppConfig> for Layout {
    fn from(config: &AppConfig) -> Self {
        Self {
            manifest_name: config.manifest_name.clone(),
            root_document: config.root_document.clone(),
        }
    }
}

impl ModCatalog {
    /// Build a catalog rooted at `mods_dir`.
    pub fn new(mods_dir: impl Into<PathBuf>, layout: Layout) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                mods_dir: mods_dir.into(),
                layout,
                cache: None,
            })),
        }
    }

    /// Directory scanned for mods.
    pub fn mods_dir(&self) -> PathBuf {
        self.inner.read().mods_dir.clone()
    }

    /// Drop the cache so the next query rescans.
    pub fn invalidate(&self) {
        self.inner.write().cache = None;
    }

    /// Return all mods, populating the cache on first use.
    pub fn mods(&self) -> Result<Vec<ModInfo>> {
        let mut inner = self.inner.write();
        if let Some(cache) = &inner.cache {
            return Ok(cache.clone());
        }
        let mods = discover_mods(&inner.mods_dir, &inner.layout)?;
        inner.cache = Some(mods.clone());
        Ok(mods)
    }

    /// Filter mods using a case-insensitive substring search.
    pub fn mods_matching(&self, query: &str) -> Result<Vec<ModInfo>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.mods();
        }

        Ok(self
            .mods()?
            .into_iter()
            .filter(|info| {
                info.manifest.id.to_lowercase().contains(&needle)
                    || info
                        .manifest
                        .name
                        .as_ref()
                        .map(|value| value.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .collect())
    }
}

/// Public helper used by tests and the CLI.
pub struct ModDiscovery;

impl ModDiscovery {
    /// Enumerate mods beneath `mods_dir`, sorted by folder name.
    pub fn discover(mods_dir: impl AsRef<Path>, layout: &Layout) -> Result<Vec<ModInfo>> {
        discover_mods(mods_dir.as_ref(), layout)
    }

    /// Read the mod in `dir` without scanning siblings.
    pub fn inspect(dir: impl AsRef<Path>, layout: &Layout) -> Result<ModInfo> {
        let dir = dir.as_ref();
        build_mod(dir, layout)?.ok_or_else(|| anyhow!("{} is not a complete mod", dir.display()))
    }

}

fn discover_mods(root: &Path, layout: &Layout) -> Result<Vec<ModInfo>> {
    if !root.is_dir() {
        debug!("mods directory {} does not exist", root.display());
        return Ok(Vec::new());
    }

    let mut folders: Vec<_> = fs::read_dir(root)
        .with_context(|| format!("failed to list {}", root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect();
    folders.sort_by_key(|entry| entry.file_name());

    let mut mods = Vec::new();
    for entry in folders {
        let folder_name = entry.file_name().to_string_lossy().to_string();
        if folder_name.starts_with('.') {
            continue;
        }
        match build_mod(&entry.path(), layout) {
            Ok(Some(info)) => mods.push(info),
            Ok(None) => continue,
            Err(err) => warn!("Skipping {}: {:#}", folder_name, err),
        }
    }

    Ok(mods)
}

fn build_mod(dir: &Path, layout: &Layout) -> Result<Option<ModInfo>> {
    let folder = dir
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("failed to determine folder name for {:?}", dir))?
        .to_string();

    let Some(manifest) = ModManifest::load(manifest_path(dir, &layout.manifest_name))? else {
        warn!("Skipping {} – missing {}", folder, layout.manifest_name);
        return Ok(None);
    };

    let document = manifest
        .document
        .clone()
        .unwrap_or_else(|| layout.root_document.clone());
    let document_path = dir.join(&document);
    if !document_path.is_file() {
        warn!("Skipping {} – missing {}", folder, document);
        return Ok(None);
    }

    let updated_at = fs::metadata(&document_path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    Ok(Some(ModInfo {
        manifest,
        dir: dir.to_path_buf(),
        document,
        updated_at,
    }))
}
