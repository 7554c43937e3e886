mod catalog;

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::mpsc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use graft_core::{
    activation_order,
    config::{self, AppConfig},
    manifest::{is_valid_id, manifest_path, ModManifest},
    module,
    package::ModLoader,
    pipeline::DomainStore,
    resource::{Layout, ModCatalog, ModDiscovery},
    ModInfo, TypeRegistry,
};
use notify::{RecursiveMode, Watcher};
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Resolve mod documents against the item catalog.
#[derive(Parser, Debug)]
#[command(name = "graft", version, about = "Declarative mod configuration loader")]
struct Cli {
    /// Configuration file (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mods directory, overriding the configured one.
    #[arg(long, global = true)]
    mods_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed mods in activation order.
    List,
    /// Load every mod, or only the mod in `dir`, and print the catalog.
    Check {
        /// A single mod directory.
        dir: Option<PathBuf>,
    },
    /// Re-check the mods directory whenever a file in it changes.
    Watch,
    /// Create an empty mod.
    New {
        /// Directory to create.
        dir: PathBuf,
        /// Mod id, defaults to the directory name.
        #[arg(long)]
        id: Option<String>,
    },
}

fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => {
            config::ensure_default_config()?;
            AppConfig::load()?
        }
    };
    if let Some(mods_dir) = &cli.mods_dir {
        config.mods_dir = mods_dir.clone();
    }

    match cli.command {
        Command::List => list(&config),
        Command::Check { dir } => {
            let mods = match dir {
                Some(dir) => vec![ModDiscovery::inspect(dir, &Layout::from(&config))?],
                None => activation_order(&catalog_for(&config).mods()?)?,
            };
            check(&catalog_loader(&config), &mut DomainStore::new(), &mods)
        }
        Command::Watch => watch(&config),
        Command::New { dir, id } => scaffold(&config, &dir, id),
    }
}

fn catalog_for(config: &AppConfig) -> ModCatalog {
    ModCatalog::new(&config.mods_dir, Layout::from(config))
}

fn catalog_loader(config: &AppConfig) -> ModLoader {
    let registry = TypeRegistry::new();
    registry.add_module(module("catalog", catalog::register));
    ModLoader::new(registry, config.load_options())
}

fn list(config: &AppConfig) -> Result<()> {
    let mods = activation_order(&catalog_for(config).mods()?)?;
    if mods.is_empty() {
        println!("no mods in {}", config.mods_dir.display());
    }
    for info in mods {
        let updated = info
            .updated_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<10} {:<16} {}",
            info.id(),
            info.manifest.version,
            updated,
            info.display_name()
        );
    }
    Ok(())
}

/// Load and apply `mods` into `store`, then print the catalog.
fn check(loader: &ModLoader, store: &mut DomainStore, mods: &[ModInfo]) -> Result<()> {
    let mut failed = 0;
    for info in mods {
        let loaded = match loader.load(info, store) {
            Ok(loaded) => loaded,
            Err(failure) => {
                error!("{failure}");
                failed += 1;
                continue;
            }
        };
        if let Err(err) = loaded.apply_configuration() {
            error!(owner = %loaded.id(), "{err}");
            failed += 1;
        }
    }
    for warning in loader.registry().warnings() {
        warn!("{warning}");
    }

    for line in catalog::summarize(store) {
        println!("{line}");
    }
    info!(mods = mods.len(), failed, objects = store.len(), "check finished");
    if failed > 0 {
        bail!("{failed} of {} mods failed to load", mods.len());
    }
    Ok(())
}

/// Whether a change to `paths` can affect what the mods load.
fn touches_mod_files(paths: &[PathBuf], manifest_name: &str) -> bool {
    paths.iter().any(|path| {
        let is_document = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml" | "yml")
        );
        is_document || path.file_name().is_some_and(|name| name == manifest_name)
    })
}

fn watch(config: &AppConfig) -> Result<()> {
    let catalog = catalog_for(config);
    let loader = catalog_loader(config);
    let mut store = DomainStore::new();

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        let _ = tx.send(event);
    })?;
    watcher
        .watch(&config.mods_dir, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", config.mods_dir.display()))?;
    info!("watching {}", config.mods_dir.display());

    loop {
        let result = catalog
            .mods()
            .and_then(|mods| Ok(activation_order(&mods)?))
            .and_then(|mods| check(&loader, &mut store, &mods));
        if let Err(err) = result {
            error!("{err:#}");
        }

        loop {
            match rx.recv()? {
                Ok(event) if touches_mod_files(&event.paths, &config.manifest_name) => break,
                Ok(_) => {}
                Err(err) => warn!("watch error: {err}"),
            }
        }
        // Editors write in bursts.
        while rx.recv_timeout(Duration::from_millis(250)).is_ok() {}
        catalog.invalidate();
    }
}

fn scaffold(config: &AppConfig, dir: &Path, id: Option<String>) -> Result<()> {
    let id = match id {
        Some(id) => id,
        None => dir
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .context("cannot derive a mod id from the directory name")?,
    };
    if !is_valid_id(&id) {
        bail!("`{id}` is not a valid mod id");
    }

    let manifest = manifest_path(dir, &config.manifest_name);
    if manifest.exists() {
        bail!("{} already exists", manifest.display());
    }
    fs::create_dir_all(dir)?;
    ModManifest::new(&id).persist(&manifest)?;

    let document = dir.join(&config.root_document);
    if !document.exists() {
        fs::write(&document, "items: []\nweapons: []\nrecipes: []\n")
            .with_context(|| format!("failed to write {}", document.display()))?;
    }
    info!("created mod `{id}` in {}", dir.display());
    Ok(())
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("graft.log");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}
