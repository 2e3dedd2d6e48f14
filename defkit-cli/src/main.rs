use anyhow::{Context, Result};
use clap::Parser;
use defkit_core::package::format_list;
use defkit_core::{LoadListener, Package, PackageStore, Registry, Severity};
use tracing::{debug, info, warn};

mod config;
mod store;

use crate::config::{Command, Config};
use crate::store::DirectoryStore;

/// Reports load progress through tracing
struct LogListener;

impl LoadListener for LogListener {
    fn loading(&self, name: &str) {
        debug!(definition = name, "loading definition");
    }

    fn progress(&self, loaded: usize, total: usize) {
        if loaded == total || loaded % 100 == 0 {
            debug!(loaded, total, "load progress");
        }
    }

    fn complete(&self) {
        debug!("load pass complete");
    }
}

/// Registry with every requested package loaded, plus the packages left out
fn load(config: &Config) -> Result<(Registry, Vec<Package>)> {
    let store: Box<dyn PackageStore> = match (&config.mods_dir, config.demo) {
        (_, true) => Box::new(defkit_demo::sample_store()),
        (Some(dir), false) => Box::new(DirectoryStore::new(dir)),
        (None, false) => anyhow::bail!("mods_dir is required unless --demo is set"),
    };

    let mut registry = Registry::new(config.host_version()?);
    defkit_demo::install(&mut registry);

    let ids = config.package_ids()?;
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    let report = registry
        .load(store.as_ref(), &ids, &[config.folder()], &LogListener)
        .context("failed to load packages")?;

    info!(
        packages = report.packages.len(),
        definitions = report.committed.len(),
        pruned = report.pruned.len(),
        "packages loaded"
    );
    for failure in &report.extension_failures {
        warn!(
            package = %failure.package,
            module = failure.module.as_deref().unwrap_or("-"),
            "extension failed: {}",
            failure.message
        );
    }

    let mut disabled = Vec::new();
    for id in store.available() {
        if registry.is_loaded(&id) {
            continue;
        }
        match store.metadata(&id) {
            Ok(package) => disabled.push(package),
            Err(err) => warn!(package = %id, error = %err, "cannot read package metadata"),
        }
    }

    Ok((registry, disabled))
}

fn print_catalog(registry: &Registry) {
    for package in registry.packages() {
        println!("{} ({}) v{}", package.name, package.id, package.own_version);
    }
    for kind in registry.catalog().kinds() {
        println!("\n[{kind}]");
        for definition in registry.get_all(kind) {
            let owner = definition.owner().unwrap_or("-");
            match definition.base() {
                Some(base) => println!("  {} : {} ({owner})", definition.name(), base),
                None => println!("  {} ({owner})", definition.name()),
            }
        }
    }
}

fn print_compatibility(registry: &Registry, disabled: &[Package]) -> bool {
    let mut clean = true;
    for report in registry.check_compatibility(disabled) {
        if report.severity == Severity::Error {
            clean = false;
        }
        println!("{}: {:?}", report.package_id, report.severity);
        for (severity, message) in &report.messages {
            println!("  {severity:?}: {message}");
        }
    }
    clean
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let mut config = Config::parse();
    config.load_file()?;

    // Validate configuration
    config.validate()?;

    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(config.log_level()?).init();

    info!(demo = config.demo, folder = config.folder(), "loading packages");

    // Load off the async runtime; reading packages is blocking file work
    let load_config = config.clone();
    let (registry, disabled) = tokio::task::spawn_blocking(move || load(&load_config))
        .await
        .context("load task panicked")??;

    match config.command() {
        Command::Load => print_catalog(&registry),
        Command::Check => {
            if !print_compatibility(&registry, &disabled) {
                anyhow::bail!("package set has compatibility errors");
            }
        }
        Command::Create { name } => {
            let object = registry
                .instantiate(&name, &[])
                .with_context(|| format!("cannot create \"{name}\""))?;
            let doc = registry.save_object(object.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Command::Scene { seed } => {
            let scene = defkit_demo::spawn_scene(&registry, seed)?;
            match &scene.background {
                Some(background) => println!("background: {}", background.name),
                None => println!("background: none"),
            }
            for character in &scene.characters {
                println!(
                    "{} at ({}) scale ({}) rotation {:.2} health {}",
                    character.name, character.position, character.scale, character.rotation, character.health
                );
            }
        }
        Command::ExportList { path } => {
            std::fs::write(&path, format_list(registry.packages()))
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), packages = registry.packages().len(), "mod list written");
        }
    }

    Ok(())
}
