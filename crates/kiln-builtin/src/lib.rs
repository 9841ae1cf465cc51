//! Built-in Kiln plugins.
//!
//! Everything a build needs beyond the kernel is an ordinary plugin: the
//! configuration and path stages, HTML assembly, bundler glue, static-site
//! generation, and the `dev`, `build`, `plugins` and `config` commands.
//! [`Builtins`] wires them up in load order and keeps the stage handles the
//! entry point needs to resolve configuration and paths.

pub mod auto_start;
pub mod bundler;
pub mod command;
pub mod config;
pub mod html;
pub mod inspect;
pub mod methods;
pub mod output;
pub mod paths;
pub mod ssg;

use std::sync::Arc;

use kiln_core::{AppResult, InputConfig, PathTable};
use kiln_plugin::{ModuleCatalog, PluginSpec};

pub use bundler::{Bundler, CompileOutput, EmittedFile, ManifestBundler};
pub use command::build::BuildReport;
pub use config::{BuildConfig, ConfigStage};
pub use html::HtmlDocument;
pub use paths::PathsStage;

/// The built-in plugin set plus the stage handles driven by the entry point.
pub struct Builtins {
    pub config: ConfigStage,
    pub paths: PathsStage,
    specs: Vec<PluginSpec>,
}

impl Builtins {
    /// Builds the set for `input`, seeding the paths stage with `defaults`.
    pub fn new(input: InputConfig, defaults: PathTable, bundler: Arc<dyn Bundler>) -> Self {
        let config = ConfigStage::new(input);
        let paths = PathsStage::new(defaults);

        let specs = vec![
            PluginSpec::from(config.factory()),
            PluginSpec::from(paths.factory()),
            PluginSpec::from(html::factory()),
            PluginSpec::from(bundler::factory(bundler)),
            PluginSpec::from(ssg::factory()),
            PluginSpec::from(command::dev::factory()),
            PluginSpec::from(command::build::factory()),
            PluginSpec::from(inspect::factory()),
        ];

        Self {
            config,
            paths,
            specs,
        }
    }

    /// Plugin specs in load order.
    pub fn specs(&self) -> Vec<PluginSpec> {
        self.specs.clone()
    }

    /// Resolves the configuration, then the paths against it.
    pub async fn resolve(&self) -> AppResult<(BuildConfig, PathTable)> {
        let config = self.config.resolve().await?;
        let paths = self.paths.resolve(&config).await?;
        Ok((config, paths))
    }
}

/// Optional plugins compiled into the binary, resolvable by name.
pub fn module_catalog() -> ModuleCatalog {
    ModuleCatalog::new().with(auto_start::MODULE_NAME, auto_start::module())
}
