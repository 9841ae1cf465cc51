//! Kiln entry point.
//!
//! Loads the input configuration, activates the built-in and user plugins,
//! resolves configuration and paths, then dispatches the requested command.

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use kiln_builtin::{Builtins, ManifestBundler, module_catalog};
use kiln_core::{AppResult, InputConfig, PathTable};
use kiln_plugin::{DirectoryResolver, PluginLoader, PluginManager, PluginSpec};

use cli::Cli;

/// Project-local plugin directory, searched before `plugin_dirs`.
const LOCAL_PLUGIN_DIR: &str = ".kiln/plugins";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let input = match InputConfig::load(&cli.root, cli.config.as_deref()) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&input, cli.verbose);

    if let Err(e) = run(cli, input).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(input: &InputConfig, verbose: bool) {
    let level = if verbose { "debug" } else { input.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match input.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Directories searched for plugin manifests, relative entries anchored at `root`.
fn plugin_dirs(input: &InputConfig, root: &Path) -> Vec<PathBuf> {
    std::iter::once(root.join(LOCAL_PLUGIN_DIR))
        .chain(input.plugin_dirs.iter().map(|dir| root.join(dir)))
        .collect()
}

fn build_loader(dirs: Vec<PathBuf>) -> PluginLoader {
    let catalog = Arc::new(module_catalog());
    let loader = PluginLoader::new().with_resolver(catalog.clone());

    #[cfg(feature = "dynamic")]
    let loader = loader.with_resolver(Arc::new(kiln_plugin::DynamicResolver::new(dirs.clone())));

    loader.with_resolver(Arc::new(DirectoryResolver::new(dirs, catalog)))
}

async fn run(cli: Cli, input: InputConfig) -> AppResult<()> {
    let paths = PathTable::resolve_from(&cli.root);
    let manager = PluginManager::new(build_loader(plugin_dirs(&input, &paths.app_root)));

    let user_plugins: Vec<PluginSpec> = input
        .plugins
        .iter()
        .cloned()
        .map(PluginSpec::from)
        .collect();
    let builtins = Builtins::new(input, paths, Arc::new(ManifestBundler::new()));

    // One call, so user plugins can ignore built-ins before the tap sweep.
    let mut specs = builtins.specs();
    specs.extend(user_plugins);
    manager.load_plugins(specs).await?;

    builtins.resolve().await?;

    let args = cli::parse_command_args(&cli.args);
    let result = manager.receive_command(&cli.command, args).await?;
    debug!(command = %cli.command, result = %result, "Command finished");
    Ok(())
}
