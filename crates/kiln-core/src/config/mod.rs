//! Input configuration schema.
//!
//! The input configuration is what the user wrote (`kiln.toml` plus
//! `KILN_*` environment overrides) merged over the built-in defaults. It is
//! the seed of the `config` hook; plugins never see it mutably.

pub mod logging;
pub mod plugin;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use self::logging::LoggingConfig;
pub use self::plugin::PluginEntry;

use crate::error::AppError;

/// File name looked up in the project root when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Root input configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Dev server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Dev server bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Assets below this size (bytes) are inlined by the bundler.
    #[serde(default = "default_image_inline_size_limit")]
    pub image_inline_size_limit: u64,
    /// Emit bundler profiling information.
    #[serde(default)]
    pub profile: bool,
    /// Emit source maps.
    #[serde(default)]
    pub source_map: bool,
    /// Enable fast refresh in development.
    #[serde(default = "default_true")]
    pub fast_refresh: bool,
    /// Use the automatic JSX runtime.
    #[serde(default = "default_true")]
    pub jsx_runtime: bool,
    /// Public URL prefix for emitted assets.
    #[serde(default = "default_public_path")]
    pub public_path: String,
    /// Static-site generation.
    #[serde(default)]
    pub ssg: bool,
    /// User plugins, loaded after the built-in plugins in declaration order.
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
    /// Extra directories searched for plugin manifests and libraries.
    #[serde(default)]
    pub plugin_dirs: Vec<PathBuf>,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Any other key, kept for plugins that define their own settings.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            image_inline_size_limit: default_image_inline_size_limit(),
            profile: false,
            source_map: false,
            fast_refresh: true,
            jsx_runtime: true,
            public_path: default_public_path(),
            ssg: false,
            plugins: Vec::new(),
            plugin_dirs: Vec::new(),
            logging: LoggingConfig::default(),
            extra: Map::new(),
        }
    }
}

impl InputConfig {
    /// Load the input configuration.
    ///
    /// Merges, in order: built-in defaults, the configuration file (the
    /// explicit `path` if given, otherwise an optional `kiln.toml` under
    /// `root`), and environment variables prefixed with `KILN_`.
    pub fn load(root: &Path, path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(explicit) => config::File::from(explicit.to_path_buf()).required(true),
            None => config::File::from(root.join(CONFIG_FILE_NAME)).required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("KILN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let input: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        tracing::debug!(
            plugins = input.plugins.len(),
            ssg = input.ssg,
            "Input configuration loaded"
        );

        Ok(input)
    }

    /// Serialize into the generic record form handed to plugins.
    pub fn to_value(&self) -> Result<Value, AppError> {
        Ok(serde_json::to_value(self)?)
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_image_inline_size_limit() -> u64 {
    10_000
}

fn default_public_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}
