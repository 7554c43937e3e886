//! Application configuration.
//!
//! Values are layered: built-in defaults, then `config.toml` in the user's
//! configuration directory, then `GRAFT_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::schema::NamingConvention;

/// Directory name under the platform configuration directory.
pub const CONFIG_DIR_NAME: &str = "graft";

/// Default name of a mod's root document.
pub const DEFAULT_ROOT_DOCUMENT: &str = "mod.yaml";

/// Default name of a mod's manifest.
pub const DEFAULT_MANIFEST_NAME: &str = "manifest.json";

/// Default local tag marking an import directive.
pub const DEFAULT_IMPORT_TAG: &str = "import";

/// Settings shared by the CLI and any other front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Directory scanned for mods.
    pub mods_dir: PathBuf,
    /// Root document name inside each mod.
    pub root_document: String,
    /// Manifest file name inside each mod.
    pub manifest_name: String,
    /// Key naming convention for documents.
    pub naming: NamingConvention,
    /// Local tag name of import directives.
    pub import_tag: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mods_dir: default_mods_dir(),
            root_document: DEFAULT_ROOT_DOCUMENT.to_string(),
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            naming: NamingConvention::default(),
            import_tag: DEFAULT_IMPORT_TAG.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from `path`, which may be missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        let defaults = AppConfig::default();
        let settings = Config::builder()
            .set_default("mods_dir", defaults.mods_dir.to_string_lossy().to_string())?
            .set_default("root_document", defaults.root_document)?
            .set_default("manifest_name", defaults.manifest_name)?
            .set_default("naming", "underscored")?
            .set_default("import_tag", defaults.import_tag)?
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("GRAFT"))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        Ok(config)
    }

    /// Engine-facing subset of the configuration.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            root_document: self.root_document.clone(),
            naming: self.naming,
            import_tag: self.import_tag.clone(),
        }
    }
}

/// Options consumed while loading documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Root document name inside each mod.
    pub root_document: String,
    /// Key naming convention.
    pub naming: NamingConvention,
    /// Local tag name of import directives.
    pub import_tag: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        AppConfig::default().load_options()
    }
}

/// Path of the user configuration file.
pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| anyhow!("unable to determine config directory"))?;
    Ok(base.join(CONFIG_DIR_NAME).join("config.toml"))
}

/// Write a default configuration file when none exists yet.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(&config_path()?)
}

/// Write a default configuration file at `path` unless one exists.
pub fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }

    let defaults = AppConfig::default();
    let contents = format!(
        "# graft configuration\n\
         mods_dir = {:?}\n\
         root_document = {:?}\n\
         manifest_name = {:?}\n\
         naming = \"underscored\"\n\
         import_tag = {:?}\n",
        defaults.mods_dir.to_string_lossy(),
        defaults.root_document,
        defaults.manifest_name,
        defaults.import_tag,
    );
    fs::write(path, contents)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    info!("wrote default configuration to {}", path.display());
    Ok(())
}

fn default_mods_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join("mods"))
        .unwrap_or_else(|| PathBuf::from("mods"))
}
