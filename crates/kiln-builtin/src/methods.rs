//! Names of the methods the built-in plugins register, and typed lookups.

use serde_json::{Value, json};

use kiln_core::{AppResult, PathTable};
use kiln_plugin::MethodTable;

use crate::config::BuildConfig;

pub const GET_RESOLVED_CONFIG: &str = "getResolvedConfig";
pub const GET_INPUT_CONFIG: &str = "getInputConfig";
pub const GET_PATHS: &str = "getPaths";
pub const GET_HTML: &str = "getHtml";
pub const CREATE_BUNDLER_CONFIG: &str = "createBundlerConfig";
pub const GET_BUNDLER_CONFIGS: &str = "getBundlerConfigs";
pub const CREATE_TRANSPILER_CONFIG: &str = "createTranspilerConfig";
pub const COMPILE: &str = "compile";
pub const SERVE: &str = "serve";

/// Build environments passed as `env` in bundler arguments.
pub const PRODUCTION: &str = "production";
pub const DEVELOPMENT: &str = "development";

/// The resolved configuration.
pub async fn resolved_config(methods: &MethodTable) -> AppResult<BuildConfig> {
    methods.call_as(GET_RESOLVED_CONFIG, Value::Null).await
}

/// The resolved path table.
pub async fn paths(methods: &MethodTable) -> AppResult<PathTable> {
    methods.call_as(GET_PATHS, Value::Null).await
}

/// Arguments of `createBundlerConfig` / `createTranspilerConfig` and of the
/// hooks they fire.
pub fn build_args(env: &str, is_server: bool) -> Value {
    json!({ "env": env, "is_server": is_server })
}
